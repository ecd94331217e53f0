//! Crash-safe installation of one plugin identity.
//!
//! An install walks through four states, each consuming the previous one:
//!
//! ```text
//! InstallRequest ──lock()──▶ LockedInstall ──stage()──▶ StagedInstall ──publish()──▶ InstalledPlugin
//!     (idle)                  holds <dir>.lock          <dir>.tmp<id> + <dir>.partial
//! ```
//!
//! - **lock** takes the per-identity [`InstallLock`], then removes leftovers of
//!   earlier attempts (`<dir>.tmp*` directories and a stale `<dir>.partial`).
//! - **stage** writes the `.partial` sentinel and extracts the archive into a
//!   fresh staging directory. If the final directory already exists and
//!   overwrite was not requested, this fails with [`IacpmError::Conflict`]
//!   before anything is written.
//! - **publish** renames the staging directory onto the final name, removes the
//!   sentinel and releases the lock.
//!
//! Readers never see a half-written plugin: the final directory only ever
//! appears through a rename of a fully extracted tree. A crash or a dropped
//! future leaves at most a staging directory and a sentinel, both cleaned up
//! by the next install of the same identity.

use super::index::{is_staging_name, partial_path};
use super::lock::InstallLock;
use super::{InstalledPlugin, PluginKind, PluginSpec};
use crate::archive::{self, ArchiveFormat};
use crate::core::IacpmError;
use crate::utils::fs::{remove_dir_all, remove_file_if_exists};
use anyhow::{Context, Result};
use semver::Version;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An install that has not started yet.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    root: PathBuf,
    kind: PluginKind,
    name: String,
    version: Version,
    overwrite: bool,
    lock_timeout: Option<Duration>,
}

impl InstallRequest {
    /// Prepares an install of `spec` below `root`.
    ///
    /// The spec must carry an exact version.
    pub fn new(root: impl Into<PathBuf>, spec: &PluginSpec) -> Result<Self> {
        spec.validate()?;
        let version = spec.exact_version()?.clone();
        Ok(Self {
            root: root.into(),
            kind: spec.kind,
            name: spec.bare_name().to_string(),
            version,
            overwrite: false,
            lock_timeout: None,
        })
    }

    /// Replace an existing installation instead of failing with a conflict.
    #[must_use]
    pub const fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Bound the wait for the install lock. `None` waits indefinitely.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[must_use]
    pub fn dir_name(&self) -> String {
        super::plugin_dir_name(self.kind, &self.name, &self.version)
    }

    /// Takes the install lock and clears leftovers of interrupted installs.
    pub async fn lock(self) -> Result<LockedInstall> {
        let dir_name = self.dir_name();
        let lock = InstallLock::acquire_maybe_timeout(&self.root, &dir_name, self.lock_timeout)
            .await?;

        cleanup_leftovers(&self.root, &dir_name)?;

        Ok(LockedInstall {
            request: self,
            dir_name,
            lock,
        })
    }
}

/// An install holding the per-identity lock.
#[derive(Debug)]
pub struct LockedInstall {
    request: InstallRequest,
    dir_name: String,
    lock: InstallLock,
}

impl LockedInstall {
    #[must_use]
    pub fn final_dir(&self) -> PathBuf {
        self.request.root.join(&self.dir_name)
    }

    /// Extracts `archive` into a private staging directory.
    ///
    /// On failure the staging directory and sentinel are removed on a
    /// best-effort basis and the final directory is left untouched.
    pub async fn stage<R>(self, archive: R, format: ArchiveFormat) -> Result<StagedInstall>
    where
        R: Read + Send + 'static,
    {
        let final_dir = self.final_dir();
        if final_dir.exists() && !self.request.overwrite {
            return Err(IacpmError::Conflict {
                path: final_dir.display().to_string(),
            }
            .into());
        }

        let root = &self.request.root;
        let staging = root.join(format!("{}.tmp{}", self.dir_name, uuid::Uuid::new_v4().simple()));
        let partial = partial_path(root, &self.dir_name);

        std::fs::write(&partial, b"")
            .with_context(|| format!("Failed to write install sentinel: {}", partial.display()))?;
        tracing::debug!(plugin = %self.dir_name, staging = %staging.display(), "Staging plugin");

        let extract_dir = staging.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&extract_dir).with_context(|| {
                format!("Failed to create staging directory: {}", extract_dir.display())
            })?;
            archive::extract(archive, &extract_dir, format)
        })
        .await
        .context("Failed to spawn blocking task for archive extraction")
        .and_then(|result| result);

        if let Err(e) = extracted {
            discard_staging(&staging, &partial);
            return Err(e.context(format!("Failed to extract plugin {}", self.dir_name)));
        }

        Ok(StagedInstall {
            locked: self,
            staging,
            partial,
        })
    }
}

/// A fully extracted plugin waiting to be published.
#[derive(Debug)]
pub struct StagedInstall {
    locked: LockedInstall,
    staging: PathBuf,
    partial: PathBuf,
}

impl StagedInstall {
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Moves the staged tree into place and releases the lock.
    pub fn publish(self) -> Result<InstalledPlugin> {
        let Self {
            locked,
            staging,
            partial,
        } = self;
        let LockedInstall {
            request,
            dir_name,
            lock,
        } = locked;
        let root = &request.root;
        let final_dir = root.join(&dir_name);

        let mut replaced = None;
        if final_dir.exists() {
            if !request.overwrite {
                discard_staging(&staging, &partial);
                return Err(IacpmError::Conflict {
                    path: final_dir.display().to_string(),
                }
                .into());
            }
            // A directory cannot be renamed over a non-empty one, so move the old
            // tree aside first. It gets a staging name and is swept up if we crash.
            let aside = root.join(format!("{dir_name}.tmp{}", uuid::Uuid::new_v4().simple()));
            std::fs::rename(&final_dir, &aside).with_context(|| {
                format!("Failed to move existing plugin aside: {}", final_dir.display())
            })?;
            replaced = Some(aside);
        }

        if let Err(e) = std::fs::rename(&staging, &final_dir) {
            // Restore the previous version
            if let Some(aside) = &replaced {
                if let Err(restore) = std::fs::rename(aside, &final_dir) {
                    tracing::warn!(path = %aside.display(), error = %restore, "Failed to restore replaced plugin directory");
                }
            }
            discard_staging(&staging, &partial);
            return Err(e).with_context(|| {
                format!("Failed to publish plugin {} to {}", dir_name, final_dir.display())
            });
        }

        if let Some(aside) = replaced {
            if let Err(e) = remove_dir_all(&aside) {
                tracing::warn!(path = %aside.display(), error = %e, "Failed to remove replaced plugin directory");
            }
        }
        remove_file_if_exists(&partial)?;

        tracing::debug!(plugin = %dir_name, "Published plugin");
        drop(lock);

        Ok(InstalledPlugin {
            kind: request.kind,
            name: request.name,
            version: request.version,
            install_root: request.root,
            dir_name,
            metadata: None,
        })
    }
}

/// Runs the whole protocol: lock, stage `archive`, publish.
///
/// The archive is extracted into `<dir>.tmp<uuid>` next to the final directory
/// while `<dir>.partial` marks the install as in flight, then renamed into place
/// in one step. Readers of the install root see either no plugin, the previous
/// version, or the complete new one. Leftovers from an interrupted attempt are
/// swept up by the next install of the same identity.
///
/// # Errors
///
/// - [`IacpmError::Conflict`] if the plugin is already installed and the
///   request does not overwrite
/// - [`IacpmError::LockTimeout`] if a lock timeout is set and another
///   installer holds the lock past it
/// - [`IacpmError::InvalidArchive`] if an entry would land outside the staging
///   directory or is a link; nothing is published
///
/// # Examples
///
/// ```rust,no_run
/// use iacpm_cli::archive::ArchiveFormat;
/// use iacpm_cli::plugin::{InstallRequest, PluginKind, PluginSpec, install_plugin};
/// use semver::Version;
///
/// # async fn example() -> anyhow::Result<()> {
/// let spec = PluginSpec::new(PluginKind::Resource, "aws", Some(Version::new(6, 1, 0)));
/// let archive = std::fs::File::open("iacpm-resource-aws-v6.1.0-linux-amd64.tar.gz")?;
///
/// let request = InstallRequest::new("/home/me/.iacpm/plugins", &spec)?.overwrite(false);
/// let plugin = install_plugin(request, archive, ArchiveFormat::TarGz).await?;
/// println!("Installed into {}", plugin.dir().display());
/// # Ok(())
/// # }
/// ```
pub async fn install_plugin<R>(
    request: InstallRequest,
    archive: R,
    format: ArchiveFormat,
) -> Result<InstalledPlugin>
where
    R: Read + Send + 'static,
{
    request.lock().await?.stage(archive, format).await?.publish()
}

/// Removes an installed plugin together with its sentinel and lock file.
///
/// Succeeds when any subset of those exists, including none.
pub async fn delete_plugin(root: &Path, spec: &PluginSpec, lock_timeout: Option<Duration>) -> Result<()> {
    let version = spec.exact_version()?;
    let dir_name = spec.dir_name(version);
    if !root.exists() {
        return Ok(());
    }

    // Dropping the lock removes <dir>.lock
    let _lock = InstallLock::acquire_maybe_timeout(root, &dir_name, lock_timeout).await?;
    remove_dir_all(&root.join(&dir_name))?;
    remove_file_if_exists(&partial_path(root, &dir_name))?;
    tracing::debug!(plugin = %dir_name, "Deleted plugin");
    Ok(())
}

/// Removes `<dir>.tmp*` directories and a stale `<dir>.partial`.
///
/// Only called while holding the identity's lock, so nothing removed here can
/// belong to a live install.
fn cleanup_leftovers(root: &Path, dir_name: &str) -> Result<()> {
    let prefix = format!("{dir_name}.tmp");
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("Failed to read plugin directory: {}", root.display()))?;

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) && is_staging_name(&name) {
            tracing::debug!(path = %entry.path().display(), "Removing stale staging directory");
            remove_dir_all(&entry.path())?;
        }
    }

    let partial = partial_path(root, dir_name);
    if partial.exists() {
        tracing::debug!(path = %partial.display(), "Removing stale install sentinel");
        remove_file_if_exists(&partial)?;
    }
    Ok(())
}

fn discard_staging(staging: &Path, partial: &Path) {
    if let Err(e) = remove_dir_all(staging) {
        tracing::warn!(path = %staging.display(), error = %e, "Failed to remove staging directory");
    }
    if let Err(e) = remove_file_if_exists(partial) {
        tracing::warn!(path = %partial.display(), error = %e, "Failed to remove install sentinel");
    }
}
