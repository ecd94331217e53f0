//! Cross-process advisory lock serialising installs of one plugin identity.
//!
//! The lock lives next to the plugin directory as `<root>/<dir>.lock`. Installs
//! of different identities use different lock files and never wait on each
//! other.
//!
//! The lock file is removed on release so the plugin root does not accumulate
//! them. Removal opens a gap: a waiter may have opened the old file before it
//! was unlinked and then acquire a lock on an orphaned inode while a newcomer
//! locks a fresh file at the same path. To rule that out, a holder re-checks
//! after locking that the path still names the file it locked, and starts over
//! if it does not.

use crate::constants::{MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS};
use crate::core::IacpmError;
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_retry::strategy::ExponentialBackoff;

/// An exclusive lock held for the duration of one install or delete.
///
/// Dropping the value removes the lock file and releases the lock.
#[derive(Debug)]
pub struct InstallLock {
    file: Option<File>,
    path: PathBuf,
    name: String,
}

impl InstallLock {
    /// `<root>/<name>.lock`
    #[must_use]
    pub fn lock_path(root: &Path, name: &str) -> PathBuf {
        root.join(format!("{name}.lock"))
    }

    /// Blocks until the lock for `name` is held.
    ///
    /// The wait happens on the blocking thread pool. There is no timeout; use
    /// [`InstallLock::acquire_with_timeout`] for a bounded wait.
    pub async fn acquire(root: &Path, name: &str) -> Result<Self> {
        ensure_root(root).await?;
        let path = Self::lock_path(root, name);
        let lock_name = name.to_string();

        let blocking_path = path.clone();
        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            loop {
                let file = open_lock_file(&blocking_path)?;
                file.lock_exclusive().with_context(|| {
                    format!("Failed to acquire install lock: {}", blocking_path.display())
                })?;
                if still_current(&file, &blocking_path) {
                    return Ok(file);
                }
                tracing::debug!(lock = %blocking_path.display(), "Lock file replaced while waiting, retrying");
            }
        })
        .await
        .context("Failed to spawn blocking task for lock acquisition")??;

        tracing::debug!(lock = %lock_name, "Acquired install lock");
        Ok(Self {
            file: Some(file),
            path,
            name: lock_name,
        })
    }

    /// Like [`InstallLock::acquire`], but polls with exponential backoff and
    /// gives up with [`IacpmError::LockTimeout`] after `timeout`.
    pub async fn acquire_with_timeout(root: &Path, name: &str, timeout: Duration) -> Result<Self> {
        ensure_root(root).await?;
        let path = Self::lock_path(root, name);
        let start = Instant::now();
        let mut backoff = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS));

        loop {
            let attempt_path = path.clone();
            let attempt = tokio::task::spawn_blocking(move || -> Result<Option<File>> {
                let file = open_lock_file(&attempt_path)?;
                let locked = file.try_lock_exclusive().with_context(|| {
                    format!("Failed to acquire install lock: {}", attempt_path.display())
                })?;
                Ok((locked && still_current(&file, &attempt_path)).then_some(file))
            })
            .await
            .context("Failed to spawn blocking task for lock acquisition")??;

            if let Some(file) = attempt {
                tracing::debug!(lock = %name, waited_ms = start.elapsed().as_millis() as u64, "Acquired install lock");
                return Ok(Self {
                    file: Some(file),
                    path,
                    name: name.to_string(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(IacpmError::LockTimeout {
                    name: name.to_string(),
                    timeout_secs: timeout.as_secs(),
                }
                .into());
            }

            let delay = backoff.next().unwrap_or(Duration::from_millis(MAX_BACKOFF_DELAY_MS));
            tokio::time::sleep(delay.min(timeout.saturating_sub(start.elapsed()))).await;
        }
    }

    /// Picks blocking or bounded acquisition.
    pub async fn acquire_maybe_timeout(
        root: &Path,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        match timeout {
            Some(timeout) => Self::acquire_with_timeout(root, name, timeout).await,
            None => Self::acquire(root, name).await,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        // Unlink while still holding the lock so waiters detect the replacement
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(lock = %self.path.display(), error = %e, "Failed to remove lock file");
            }
        }
        if let Err(e) = FileExt::unlock(&file) {
            tracing::warn!(lock = %self.path.display(), error = %e, "Failed to release install lock");
        }
        tracing::debug!(lock = %self.name, "Released install lock");
    }
}

async fn ensure_root(root: &Path) -> Result<()> {
    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("Failed to create plugin directory: {}", root.display()))
}

fn open_lock_file(path: &Path) -> Result<File> {
    let mut attempts = 0;
    loop {
        match OpenOptions::new().create(true).truncate(false).write(true).open(path) {
            Ok(file) => return Ok(file),
            // Windows refuses to open a file that is pending deletion
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied && attempts < 50 => {
                attempts += 1;
                std::thread::sleep(Duration::from_millis(STARTING_BACKOFF_DELAY_MS));
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open lock file: {}", path.display()));
            }
        }
    }
}

#[cfg(unix)]
fn still_current(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(held), Ok(on_disk)) => held.ino() == on_disk.ino() && held.dev() == on_disk.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_current(_file: &File, path: &Path) -> bool {
    // An open handle blocks deletion on Windows, so existence is enough
    path.exists()
}
