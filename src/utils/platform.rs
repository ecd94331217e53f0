//! Platform-specific utilities and cross-platform compatibility helpers
//!
//! This module maps the running machine onto the OS/architecture names used in
//! plugin release assets, resolves the home directory, and expands user-supplied
//! paths from configuration and environment variables.
//!
//! # Examples
//!
//! ```rust,no_run
//! use iacpm_cli::utils::platform::{Platform, resolve_path};
//!
//! # fn example() -> anyhow::Result<()> {
//! let platform = Platform::current()?;
//! println!("downloading for {}-{}", platform.os, platform.arch);
//!
//! let templates = resolve_path("~/.iacpm/templates")?;
//! # Ok(())
//! # }
//! ```

use crate::core::IacpmError;
use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;

/// OS/architecture pair in the vocabulary of plugin release assets.
///
/// Release assets use Go-style names (`darwin`, `amd64`), so Rust's
/// `macos`/`x86_64` are translated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    /// `darwin`, `linux` or `windows`
    pub os: String,
    /// `amd64` or `arm64`
    pub arch: String,
}

impl Platform {
    /// The platform this binary is running on.
    pub fn current() -> Result<Self> {
        Self::from_rust(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Translate Rust's `std::env::consts` names into asset names.
    ///
    /// Anything without published plugin builds is rejected with
    /// [`IacpmError::UnsupportedPlatform`].
    pub fn from_rust(os: &str, arch: &str) -> Result<Self> {
        let mapped_os = match os {
            "macos" | "darwin" => Some("darwin"),
            "linux" => Some("linux"),
            "windows" => Some("windows"),
            _ => None,
        };
        let mapped_arch = match arch {
            "x86_64" | "amd64" => Some("amd64"),
            "aarch64" | "arm64" => Some("arm64"),
            _ => None,
        };

        match (mapped_os, mapped_arch) {
            (Some(os), Some(arch)) => Ok(Self {
                os: os.to_string(),
                arch: arch.to_string(),
            }),
            _ => Err(IacpmError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            }
            .into()),
        }
    }

    /// Key used for per-platform checksums, e.g. `linux-amd64`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Suffix appended to executables on this platform.
#[must_use]
pub const fn executable_suffix() -> &'static str {
    if is_windows() {
        ".exe"
    } else {
        ""
    }
}

/// Gets the home directory path for the current user.
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        let platform_help = if is_windows() {
            "On Windows: Check that the USERPROFILE environment variable is set"
        } else {
            "On Unix/Linux: Check that the HOME environment variable is set"
        };
        anyhow::anyhow!("Could not determine home directory.\n\n{platform_help}")
    })
}

#[must_use]
pub const fn get_git_command() -> &'static str {
    if is_windows() {
        "git.exe"
    } else {
        "git"
    }
}

#[must_use]
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Resolves a user-supplied path, expanding `~/` and environment variables.
///
/// Used for every directory that can come from configuration or the
/// environment (`IACPM_TEMPLATE_PATH`, `plugin_dir`, ...).
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| {
        format!(
            "Failed to expand path: {path}\n\n\
            Common issues:\n\
            - Undefined environment variable (e.g., $UNDEFINED_VAR)\n\
            - Invalid variable syntax (use $VAR or ${{VAR}})"
        )
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}
