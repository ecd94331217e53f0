//! Plugin identities, installed-plugin discovery and the atomic install protocol.
//!
//! A plugin is identified by its kind, name and exact version. Installed plugins
//! live in one directory per identity below the plugin root:
//!
//! ```text
//! ~/.iacpm/plugins/
//! ├── resource-aws-v6.0.0/          # published plugin
//! │   └── iacpm-resource-aws
//! ├── resource-aws-v6.1.0.partial   # install in progress or interrupted
//! ├── resource-aws-v6.1.0.lock      # advisory install lock
//! └── resource-aws-v6.1.0.tmp3fa9…  # staging directory
//! ```
//!
//! The directory name encodes the identity so the [`index`] can rebuild it
//! without reading any metadata. A directory is only visible while no sibling
//! `.partial` sentinel exists.
//!
//! # Modules
//!
//! - [`index`] - enumerating and querying installed plugins
//! - [`lock`] - cross-process advisory install lock
//! - [`install`] - the lock, stage, publish state machine
//! - [`cache`] - in-process memoisation of directory listings
//! - [`manager`] - the end-to-end "make sure this plugin is installed" flow

pub mod cache;
pub mod index;
pub mod install;
pub mod lock;
pub mod manager;

use crate::constants::PLUGIN_BINARY_PREFIX;
use crate::core::IacpmError;
use crate::utils::platform::executable_suffix;
use anyhow::Result;
use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use cache::PluginLookupCache;
pub use index::{find_plugin, has_plugin, has_plugin_gte, list_plugins, select_compatible};
pub use install::{InstallRequest, delete_plugin, install_plugin};
pub use lock::InstallLock;
pub use manager::PluginManager;

/// What a plugin provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// Cloud or service resource provider
    Resource,
    /// Language host that runs user programs
    Language,
    /// Policy analyzer
    Analyzer,
    /// Auxiliary tool invoked by the CLI
    Tool,
}

impl PluginKind {
    /// Every kind, in display order.
    pub const ALL: [Self; 4] = [Self::Resource, Self::Language, Self::Analyzer, Self::Tool];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Language => "language",
            Self::Analyzer => "analyzer",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginKind {
    type Err = IacpmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resource" => Ok(Self::Resource),
            "language" => Ok(Self::Language),
            "analyzer" => Ok(Self::Analyzer),
            "tool" => Ok(Self::Tool),
            other => Err(IacpmError::InvalidPluginSpec {
                reason: format!(
                    "unrecognized plugin kind '{other}' (expected resource, language, analyzer or tool)"
                ),
            }),
        }
    }
}

/// A plugin the caller wants, plus hints on where to get it.
///
/// `version: None` means "latest": the manager asks the source for the newest
/// version before installing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSpec {
    pub kind: PluginKind,
    pub name: String,
    pub version: Option<Version>,
    /// Server URL selecting the download backend (`registry://`, `github://`,
    /// `gitlab://`, `https://`). `None` uses the default release hosts.
    pub download_url: Option<String>,
    /// Expected sha256 of the archive, keyed by `<os>-<arch>`.
    pub checksums: BTreeMap<String, String>,
}

impl PluginSpec {
    pub fn new(kind: PluginKind, name: impl Into<String>, version: Option<Version>) -> Self {
        Self {
            kind,
            name: name.into(),
            version,
            download_url: None,
            checksums: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_checksum(mut self, platform: impl Into<String>, sha256: impl Into<String>) -> Self {
        self.checksums.insert(platform.into(), sha256.into());
        self
    }

    /// Rejects names that cannot round-trip through a directory name.
    pub fn validate(&self) -> Result<()> {
        let bare = self.bare_name();
        let valid = !bare.is_empty()
            && !bare.ends_with('-')
            && bare.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(IacpmError::InvalidPluginSpec {
                reason: format!(
                    "plugin name '{}' must contain only letters, digits and dashes and must not end with a dash",
                    self.name
                ),
            }
            .into());
        }
        Ok(())
    }

    /// The name without any registry namespace (`acme/aws` → `aws`).
    #[must_use]
    pub fn bare_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// The exact version, or an error when the spec still means "latest".
    pub fn exact_version(&self) -> Result<&Version> {
        self.version.as_ref().ok_or_else(|| {
            IacpmError::InvalidPluginSpec {
                reason: format!("{} plugin '{}' has no resolved version", self.kind, self.name),
            }
            .into()
        })
    }

    /// Directory name for this identity at `version`.
    #[must_use]
    pub fn dir_name(&self, version: &Version) -> String {
        plugin_dir_name(self.kind, self.bare_name(), version)
    }
}

impl fmt::Display for PluginSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}-{} v{}", self.kind, self.name, v),
            None => write!(f, "{}-{}", self.kind, self.name),
        }
    }
}

/// `<kind>-<name>-v<version>`
#[must_use]
pub fn plugin_dir_name(kind: PluginKind, name: &str, version: &Version) -> String {
    format!("{kind}-{name}-v{version}")
}

/// `iacpm-<kind>-<name>`, with `.exe` on Windows.
#[must_use]
pub fn plugin_binary_name(kind: PluginKind, name: &str) -> String {
    format!("{PLUGIN_BINARY_PREFIX}-{kind}-{name}{}", executable_suffix())
}

/// Parses a version the way release tags are written in practice.
///
/// A leading `v` is dropped and missing minor/patch components are filled in
/// with zero, so `v1.23` becomes `1.23.0`.
pub fn parse_version_tolerant(value: &str) -> Result<Version> {
    let trimmed = value.trim();
    let stripped = trimmed.strip_prefix('v').unwrap_or(trimmed);

    // Split off pre-release/build metadata before padding
    let split_at = stripped.find(['-', '+']).unwrap_or(stripped.len());
    let (core, rest) = stripped.split_at(split_at);
    let padded = match core.matches('.').count() {
        0 => format!("{core}.0.0{rest}"),
        1 => format!("{core}.0{rest}"),
        _ => stripped.to_string(),
    };

    Version::parse(&padded).map_err(|e| {
        IacpmError::VersionParse {
            value: value.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// On-disk facts about an installed plugin, gathered only when asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginMetadata {
    pub size_bytes: u64,
    pub install_time: Option<DateTime<Utc>>,
    pub last_used_time: Option<DateTime<Utc>>,
}

/// A published plugin directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPlugin {
    pub kind: PluginKind,
    pub name: String,
    pub version: Version,
    pub install_root: PathBuf,
    pub dir_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PluginMetadata>,
}

impl InstalledPlugin {
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.install_root.join(&self.dir_name)
    }

    #[must_use]
    pub fn binary_path(&self) -> PathBuf {
        self.dir().join(plugin_binary_name(self.kind, &self.name))
    }

    /// Rebuilds a spec naming this exact installation.
    #[must_use]
    pub fn spec(&self) -> PluginSpec {
        PluginSpec::new(self.kind, self.name.clone(), Some(self.version.clone()))
    }

    /// Parses `dir_name` below `install_root`; `None` for anything that is not a
    /// plugin directory name.
    #[must_use]
    pub fn from_dir_name(install_root: &Path, dir_name: &str) -> Option<Self> {
        let (kind, name, version) = index::parse_dir_name(dir_name)?;
        Some(Self {
            kind,
            name,
            version,
            install_root: install_root.to_path_buf(),
            dir_name: dir_name.to_string(),
            metadata: None,
        })
    }
}
