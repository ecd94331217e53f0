//! Temporary directory management with RAII cleanup.
//!
//! A [`TempDir`] removes itself when dropped unless it is handed off with
//! [`TempDir::keep`]. Template retrieval uses the hand-off: the directory is
//! cleaned up if anything fails while populating it, and becomes the caller's
//! responsibility once retrieval succeeds.

use crate::utils::fs::dirs::{ensure_dir, remove_dir_all};
use anyhow::Result;
use std::path::{Path, PathBuf};

pub struct TempDir {
    path: PathBuf,
    keep: bool,
}

impl TempDir {
    /// Creates `<system temp>/<prefix><uuid>`.
    pub fn new(prefix: &str) -> Result<Self> {
        Self::new_in(&std::env::temp_dir(), prefix)
    }

    /// Creates `<parent>/<prefix><uuid>`.
    pub fn new_in(parent: &Path, prefix: &str) -> Result<Self> {
        let unique_name = format!("{}{}", prefix, uuid::Uuid::new_v4().simple());
        let path = parent.join(unique_name);

        ensure_dir(&path)?;

        Ok(Self {
            path,
            keep: false,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarms cleanup and returns the path.
    #[must_use]
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        if !self.keep {
            let _ = remove_dir_all(&self.path);
        }
    }
}
