//! High-level plugin operations used by the CLI.
//!
//! [`PluginManager`] ties the pieces together: it asks the index whether a
//! plugin is present, picks a download source, resolves "latest", downloads
//! for the running platform and hands the archive to the install protocol.
//! Every install or delete invalidates the injected [`PluginLookupCache`].

use super::cache::PluginLookupCache;
use super::index::{has_plugin, list_plugins};
use super::install::{InstallRequest, delete_plugin, install_plugin};
use super::{InstalledPlugin, PluginKind, PluginSpec};
use crate::archive::ArchiveFormat;
use crate::core::IacpmError;
use crate::source::{HttpTransport, SourceOptions, source_for};
use crate::utils::platform::Platform;
use anyhow::{Context, Result};
use semver::VersionReq;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub struct PluginManager {
    root: PathBuf,
    transport: Arc<dyn HttpTransport>,
    options: SourceOptions,
    cache: Arc<PluginLookupCache>,
    platform: Platform,
    lock_timeout: Option<Duration>,
}

impl PluginManager {
    /// Creates a manager for the plugin root `root`, targeting the running platform.
    pub fn new(
        root: impl Into<PathBuf>,
        transport: Arc<dyn HttpTransport>,
        options: SourceOptions,
        cache: Arc<PluginLookupCache>,
    ) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            transport,
            options,
            cache,
            platform: Platform::current()?,
            lock_timeout: None,
        })
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn list(&self, skip_metadata: bool) -> Result<Vec<InstalledPlugin>> {
        list_plugins(&self.root, skip_metadata)
    }

    /// Highest installed version of `kind`/`name` matching `requirement`.
    pub fn find(
        &self,
        kind: PluginKind,
        name: &str,
        requirement: &VersionReq,
    ) -> Result<Option<InstalledPlugin>> {
        self.cache.find_compatible(&self.root, kind, name, requirement)
    }

    /// Makes sure `spec` is installed and returns the installation.
    ///
    /// Without a version the source is asked for the latest one. An existing
    /// installation is reused unless `overwrite` is set. Losing an install race
    /// to another process counts as success.
    ///
    /// The source is picked from the configured server URL (after URL
    /// overrides), defaulting to GitHub releases with the legacy bucket as
    /// fallback. The archive for the current platform is downloaded, checked
    /// against the spec's checksum when one is given, and installed with
    /// [`install_plugin`].
    ///
    /// # Errors
    ///
    /// - [`IacpmError::PluginNotFound`] / [`IacpmError::ArtifactNotFound`] when no
    ///   source has the release or no archive exists for this platform
    /// - [`IacpmError::ChecksumMismatch`] when the download does not match
    /// - transport and authorization failures from the source, unchanged; the
    ///   manager never retries
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use iacpm_cli::plugin::{PluginKind, PluginLookupCache, PluginManager, PluginSpec};
    /// use iacpm_cli::source::{ReqwestTransport, SourceOptions};
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let manager = PluginManager::new(
    ///     "/home/me/.iacpm/plugins",
    ///     Arc::new(ReqwestTransport::new()?),
    ///     SourceOptions::default(),
    ///     Arc::new(PluginLookupCache::new()),
    /// )?;
    ///
    /// let latest = PluginSpec::new(PluginKind::Resource, "aws", None);
    /// let plugin = manager.ensure_installed(&latest, false).await?;
    /// println!("aws {} at {}", plugin.version, plugin.dir().display());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn ensure_installed(&self, spec: &PluginSpec, overwrite: bool) -> Result<InstalledPlugin> {
        spec.validate()?;
        if !overwrite && spec.version.is_some() && has_plugin(&self.root, spec)? {
            tracing::debug!(plugin = %spec, "Plugin already installed");
            return self.installed(spec);
        }

        let source = source_for(spec, self.transport.clone(), &self.options)?;
        let version = match &spec.version {
            Some(version) => version.clone(),
            None => {
                let latest = source
                    .latest_version()
                    .await
                    .with_context(|| format!("Failed to determine latest version of {spec}"))?;
                tracing::debug!(plugin = %spec, version = %latest, source = %source.url(), "Resolved latest version");
                latest
            }
        };

        let mut resolved = spec.clone();
        resolved.version = Some(version.clone());
        if !overwrite && has_plugin(&self.root, &resolved)? {
            return self.installed(&resolved);
        }

        tracing::info!(plugin = %resolved, source = %source.url(), platform = %self.platform, "Downloading plugin");
        let download = source
            .download(&version, &self.platform)
            .await
            .with_context(|| format!("Failed to download {resolved}"))?;
        tracing::debug!(plugin = %resolved, bytes = download.bytes.len(), size = ?download.size, "Downloaded plugin");

        self.install_archive(&resolved, Cursor::new(download.bytes), download.format, overwrite)
            .await
    }

    /// [`ensure_installed`](Self::ensure_installed) for several plugins at once.
    pub async fn ensure_all_installed(
        &self,
        specs: &[PluginSpec],
        overwrite: bool,
    ) -> Result<Vec<InstalledPlugin>> {
        let results =
            futures::future::join_all(specs.iter().map(|spec| self.ensure_installed(spec, overwrite)))
                .await;
        results.into_iter().collect()
    }

    /// Installs a local archive file. The format follows the file extension,
    /// defaulting to tar.gz.
    pub async fn install_from_file(
        &self,
        spec: &PluginSpec,
        path: &Path,
        overwrite: bool,
    ) -> Result<InstalledPlugin> {
        let format = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(ArchiveFormat::from_file_name)
            .unwrap_or(ArchiveFormat::TarGz);
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open plugin archive: {}", path.display()))?;
        self.install_archive(spec, file, format, overwrite).await
    }

    /// Removes one installed version.
    pub async fn remove(&self, spec: &PluginSpec) -> Result<()> {
        let result = delete_plugin(&self.root, spec, self.lock_timeout).await;
        self.cache.invalidate(&self.root);
        result
    }

    async fn install_archive<R>(
        &self,
        spec: &PluginSpec,
        archive: R,
        format: ArchiveFormat,
        overwrite: bool,
    ) -> Result<InstalledPlugin>
    where
        R: std::io::Read + Send + 'static,
    {
        let request = InstallRequest::new(&self.root, spec)?
            .overwrite(overwrite)
            .lock_timeout(self.lock_timeout);
        let result = install_plugin(request, archive, format).await;
        self.cache.invalidate(&self.root);

        match result {
            Ok(plugin) => Ok(plugin),
            // Someone else published it while we were downloading
            Err(e) if !overwrite
                && matches!(e.downcast_ref::<IacpmError>(), Some(IacpmError::Conflict { .. })) =>
            {
                tracing::debug!(plugin = %spec, "Plugin installed concurrently");
                self.installed(spec)
            }
            Err(e) => Err(e),
        }
    }

    /// The published plugin for `spec`; a concurrent remove may have taken it.
    fn installed(&self, spec: &PluginSpec) -> Result<InstalledPlugin> {
        let version = spec.exact_version()?;
        let not_found = || IacpmError::PluginNotFound {
            kind: spec.kind.to_string(),
            name: spec.name.clone(),
            version: Some(version.to_string()),
        };
        if !has_plugin(&self.root, spec)? {
            return Err(not_found().into());
        }
        InstalledPlugin::from_dir_name(&self.root, &spec.dir_name(version))
            .ok_or_else(|| not_found().into())
    }
}
