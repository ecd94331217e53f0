//! Plugin download backends.
//!
//! Every backend implements [`PluginSource`]: fetch the archive for a version
//! and platform, and report the newest published version. The backend is picked
//! once, from the scheme of the plugin's server URL:
//!
//! | URL                                   | Backend               |
//! |---------------------------------------|-----------------------|
//! | `registry://host/namespace`           | [`RegistrySource`]    |
//! | `github://host/org[/repo]`            | [`GitHubSource`]      |
//! | `gitlab://host/project-id`            | [`GitLabSource`]      |
//! | `http(s)://...`                       | [`HttpSource`]        |
//! | none                                  | [`FallbackSource`]: GitHub, then the legacy bucket |
//!
//! URL overrides ([`UrlOverrides`]) are applied to the server URL before the
//! scheme is inspected, so a rule can redirect a plugin to a different backend.
//! When the plugin carries checksums the chosen backend is wrapped in a
//! [`ChecksumSource`].
//!
//! Backends distinguish three "not found" situations: the plugin does not exist
//! ([`IacpmError::PluginNotFound`]), it exists but has no build for the platform
//! ([`IacpmError::ArtifactNotFound`]), and the latest reference carries no usable
//! version ([`IacpmError::VersionAnnotationMissing`] / [`IacpmError::VersionParse`]).

pub mod checksum;
pub mod fallback;
pub mod github;
pub mod gitlab;
pub mod http;
pub mod overrides;
pub mod registry;
pub mod transport;

use crate::archive::ArchiveFormat;
use crate::constants::{
    DEFAULT_GITHUB_API_HOST, DEFAULT_GITHUB_ORG, DEFAULT_PLUGIN_RELEASES_URL, PLUGIN_BINARY_PREFIX,
};
use crate::core::IacpmError;
use crate::plugin::{PluginKind, PluginSpec};
use crate::utils::platform::Platform;
use anyhow::Result;
use async_trait::async_trait;
use semver::Version;
use std::sync::Arc;

pub use checksum::ChecksumSource;
pub use fallback::FallbackSource;
pub use github::GitHubSource;
pub use gitlab::GitLabSource;
pub use http::{HttpSource, LegacyHttpSource};
pub use overrides::UrlOverrides;
pub use registry::RegistrySource;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RequestHook};

/// A downloaded plugin archive.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    /// Size announced by the server, when it announced one
    pub size: Option<u64>,
    pub format: ArchiveFormat,
}

impl Download {
    #[must_use]
    pub fn tar_gz(bytes: Vec<u8>, size: Option<u64>) -> Self {
        Self {
            bytes,
            size,
            format: ArchiveFormat::TarGz,
        }
    }
}

#[async_trait]
pub trait PluginSource: Send + Sync {
    /// Canonical URL of this source, for logs and error messages.
    fn url(&self) -> String;

    /// Fetches the archive of `version` built for `platform`.
    async fn download(&self, version: &Version, platform: &Platform) -> Result<Download>;

    /// Newest published version.
    async fn latest_version(&self) -> Result<Version>;
}

/// `iacpm-<kind>-<name>-v<version>-<os>-<arch>.tar.gz`
#[must_use]
pub fn asset_name(kind: PluginKind, name: &str, version: &Version, platform: &Platform) -> String {
    format!(
        "{PLUGIN_BINARY_PREFIX}-{kind}-{name}-v{version}-{}-{}.tar.gz",
        platform.os, platform.arch
    )
}

/// Credentials and rewrite rules shared by all backends.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub overrides: UrlOverrides,
    pub github_token: Option<String>,
    pub gitlab_token: Option<String>,
    /// Base URL of the legacy release bucket
    pub legacy_base_url: String,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            overrides: UrlOverrides::default(),
            github_token: None,
            gitlab_token: None,
            legacy_base_url: DEFAULT_PLUGIN_RELEASES_URL.to_string(),
        }
    }
}

/// Chooses the backend for `spec`.
pub fn source_for(
    spec: &PluginSpec,
    transport: Arc<dyn HttpTransport>,
    options: &SourceOptions,
) -> Result<Box<dyn PluginSource>> {
    spec.validate()?;

    let source: Box<dyn PluginSource> = match &spec.download_url {
        Some(url) => {
            let url = options.overrides.apply(url);
            source_from_url(&url, spec, transport, options)?
        }
        None => {
            let canonical = format!("github://{DEFAULT_GITHUB_API_HOST}/{DEFAULT_GITHUB_ORG}");
            let rewritten = options.overrides.apply(&canonical);
            if rewritten == canonical {
                let github =
                    GitHubSource::new(&canonical, spec, transport.clone(), options.github_token.clone())?;
                let legacy = LegacyHttpSource::new(
                    &options.overrides.apply(&options.legacy_base_url),
                    spec,
                    transport,
                );
                Box::new(FallbackSource::new(Box::new(github), Box::new(legacy)))
            } else {
                source_from_url(&rewritten, spec, transport, options)?
            }
        }
    };

    if spec.checksums.is_empty() {
        Ok(source)
    } else {
        Ok(Box::new(ChecksumSource::new(source, spec.name.clone(), spec.checksums.clone())))
    }
}

fn source_from_url(
    url: &str,
    spec: &PluginSpec,
    transport: Arc<dyn HttpTransport>,
    options: &SourceOptions,
) -> Result<Box<dyn PluginSource>> {
    let scheme = url.split_once("://").map_or("", |(scheme, _)| scheme);
    tracing::debug!(plugin = %spec, url, scheme, "Selecting plugin source");

    match scheme {
        "registry" => Ok(Box::new(RegistrySource::new(url, spec, transport)?)),
        "github" => {
            Ok(Box::new(GitHubSource::new(url, spec, transport, options.github_token.clone())?))
        }
        "gitlab" => {
            Ok(Box::new(GitLabSource::new(url, spec, transport, options.gitlab_token.clone())?))
        }
        "http" | "https" => Ok(Box::new(HttpSource::new(url, spec, transport))),
        other => Err(IacpmError::UnknownSourceScheme {
            scheme: other.to_string(),
        }
        .into()),
    }
}

/// Splits `scheme://host/rest` into `(host, rest segments)`.
pub(crate) fn split_source_url<'a>(url: &'a str, scheme: &str) -> Result<(&'a str, Vec<&'a str>)> {
    let rest = url.strip_prefix(scheme).and_then(|r| r.strip_prefix("://")).ok_or_else(|| {
        IacpmError::InvalidPluginSpec {
            reason: format!("expected a {scheme}:// URL, got '{url}'"),
        }
    })?;
    let mut parts = rest.split('/').filter(|p| !p.is_empty());
    let host = parts.next().ok_or_else(|| IacpmError::InvalidPluginSpec {
        reason: format!("missing host in '{url}'"),
    })?;
    Ok((host, parts.collect()))
}
