//! In-process memoisation of plugin directory listings.
//!
//! Resolving which plugin binary to launch can happen many times per command.
//! [`PluginLookupCache`] keeps the last listing per plugin root behind a single
//! mutex. It is owned by whoever creates it and passed in explicitly; installs
//! and deletes through [`PluginManager`](super::PluginManager) invalidate it.
//!
//! Changes made by other processes are not observed until the entry is
//! invalidated.

use super::index::{list_plugins, select_compatible};
use super::{InstalledPlugin, PluginKind};
use anyhow::Result;
use semver::VersionReq;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct PluginLookupCache {
    listings: Mutex<HashMap<PathBuf, Vec<InstalledPlugin>>>,
}

impl PluginLookupCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached listing of `root`, reading the directory on a miss.
    pub fn list(&self, root: &Path) -> Result<Vec<InstalledPlugin>> {
        let mut listings = self.guard();
        if let Some(plugins) = listings.get(root) {
            return Ok(plugins.clone());
        }
        let plugins = list_plugins(root, true)?;
        listings.insert(root.to_path_buf(), plugins.clone());
        Ok(plugins)
    }

    /// Highest cached version of `kind`/`name` matching `requirement`.
    pub fn find_compatible(
        &self,
        root: &Path,
        kind: PluginKind,
        name: &str,
        requirement: &VersionReq,
    ) -> Result<Option<InstalledPlugin>> {
        let plugins = self.list(root)?;
        Ok(select_compatible(&plugins, kind, name, requirement).cloned())
    }

    /// Drops the cached listing for `root`.
    pub fn invalidate(&self, root: &Path) {
        self.guard().remove(root);
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<PathBuf, Vec<InstalledPlugin>>> {
        // A panic while holding the lock cannot leave a listing half-updated
        self.listings.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
