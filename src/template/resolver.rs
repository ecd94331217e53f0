//! Turning a template reference into a directory on disk.
//!
//! | Reference                         | Materialized as                                 | Deleted by caller |
//! |-----------------------------------|-------------------------------------------------|-------------------|
//! | `aws-go` (bare name)              | `<template cache>/aws-go`                       | no                |
//! | `./my-template` (existing path)   | the path itself                                 | no                |
//! | `https://host/owner/repo/...`     | shallow clone in a fresh temp directory         | yes               |
//! | `https://host/path/template.zip`  | extracted download in a fresh temp directory    | yes               |
//!
//! Remote references fail immediately in offline mode without touching the
//! network. The bare-name cache is a git checkout of a configurable
//! repository, refreshed on every online resolution.

use super::{TemplateKind, TemplateRepository, not_a_directory, suggest_templates};
use crate::archive::{self, ArchiveFormat};
use crate::config::{Settings, TemplateCacheSettings};
use crate::constants::{CLOUD_SIGNATURE_HEADER, MAX_SUGGESTION_DISTANCE};
use crate::core::IacpmError;
use crate::git::{RepoCloner, retrieve_git_folder};
use crate::source::transport::apply_hooks;
use crate::source::{HttpRequest, HttpTransport, RequestHook};
use crate::utils::fs::{TempDir, ensure_dir, remove_dir_all};
use anyhow::{Context, Result};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

const TEMP_PREFIX: &str = "iacpm-template-";

/// A classified template reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateReference {
    /// Name of a template in the template cache
    Name(String),
    /// Existing file or directory
    Path(PathBuf),
    /// Git repository URL with optional `/tree/<ref>` and sub-path
    GitUrl(String),
    /// Zip archive URL
    ZipUrl(String),
}

impl TemplateReference {
    /// URLs are recognised by scheme, then anything that exists on disk is a
    /// path, and everything else is a name.
    #[must_use]
    pub fn classify(reference: &str) -> Self {
        if reference.starts_with("https://") || reference.starts_with("http://") {
            if is_zip_url(reference) {
                Self::ZipUrl(reference.to_string())
            } else {
                Self::GitUrl(reference.to_string())
            }
        } else if !reference.is_empty() && Path::new(reference).exists() {
            Self::Path(PathBuf::from(reference))
        } else {
            Self::Name(reference.to_string())
        }
    }
}

/// Whether the URL path (ignoring query and fragment) names a `.zip` file.
#[must_use]
pub fn is_zip_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.to_ascii_lowercase().ends_with(".zip")
}

/// Resolves template references. Cheap to share; holds no per-call state.
pub struct TemplateResolver {
    transport: Arc<dyn HttpTransport>,
    cloner: Arc<dyn RepoCloner>,
    project_cache: TemplateCacheSettings,
    policy_cache: TemplateCacheSettings,
    hooks: Vec<RequestHook>,
}

impl TemplateResolver {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        cloner: Arc<dyn RepoCloner>,
        project_cache: TemplateCacheSettings,
        policy_cache: TemplateCacheSettings,
    ) -> Self {
        Self {
            transport,
            cloner,
            project_cache,
            policy_cache,
            hooks: Vec::new(),
        }
    }

    pub fn from_settings(
        settings: &Settings,
        transport: Arc<dyn HttpTransport>,
        cloner: Arc<dyn RepoCloner>,
    ) -> Self {
        Self::new(
            transport,
            cloner,
            settings.project_templates.clone(),
            settings.policy_templates.clone(),
        )
    }

    /// Adds a hook applied to zip download requests, e.g. to attach credentials.
    #[must_use]
    pub fn with_request_hook(mut self, hook: RequestHook) -> Self {
        self.hooks.push(hook);
        self
    }

    const fn cache(&self, kind: TemplateKind) -> &TemplateCacheSettings {
        match kind {
            TemplateKind::Project => &self.project_cache,
            TemplateKind::PolicyPack => &self.policy_cache,
        }
    }

    /// Materializes `reference`. The caller owns the result and must call
    /// [`TemplateRepository::delete`] when done.
    ///
    /// `reference` may be:
    ///
    /// - an existing local path, used in place and never deleted
    /// - a bare template name such as `aws-go`, looked up case-insensitively in
    ///   the template cache for `kind`; an empty name lists the whole cache
    /// - a git URL, optionally `https://host/owner/repo/tree/<ref>/<path>`,
    ///   cloned into a fresh temporary directory
    /// - a `.zip` URL, downloaded and extracted into a temporary directory
    ///
    /// With `offline` set no network I/O happens: the cache is used as is and
    /// remote URLs fail at once.
    ///
    /// # Errors
    ///
    /// - [`IacpmError::Offline`] for a remote URL while offline
    /// - [`IacpmError::TemplateNotFound`] with close names as suggestions
    /// - [`IacpmError::NotADirectory`] when a git URL's path is not a directory
    /// - [`IacpmError::Unauthorized`] for a zip URL rejected by the cloud
    /// - [`IacpmError::MissingManifest`] for a zip without a project manifest
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use iacpm_cli::config::{GlobalConfig, Settings};
    /// use iacpm_cli::git::GitCli;
    /// use iacpm_cli::source::ReqwestTransport;
    /// use iacpm_cli::template::{TemplateKind, TemplateResolver};
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let settings = Settings::resolve(&GlobalConfig::default(), &|key| std::env::var(key).ok())?;
    /// let resolver = TemplateResolver::new(
    ///     Arc::new(ReqwestTransport::new()?),
    ///     Arc::new(GitCli::new()),
    ///     settings.project_templates,
    ///     settings.policy_templates,
    /// );
    ///
    /// let repo = resolver.resolve("aws-go", false, TemplateKind::Project).await?;
    /// for template in repo.templates()? {
    ///     println!("{}: {}", template.name, template.description);
    /// }
    /// repo.delete()?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn resolve(
        &self,
        reference: &str,
        offline: bool,
        kind: TemplateKind,
    ) -> Result<TemplateRepository> {
        let classified = TemplateReference::classify(reference);
        tracing::debug!(reference, ?classified, offline, %kind, "Resolving template");

        match classified {
            TemplateReference::ZipUrl(url) | TemplateReference::GitUrl(url) if offline => {
                Err(IacpmError::Offline {
                    url,
                }
                .into())
            }
            TemplateReference::ZipUrl(url) => self.retrieve_zip(&url, kind).await,
            TemplateReference::GitUrl(url) => self.retrieve_git(&url).await,
            TemplateReference::Path(path) => Ok(TemplateRepository {
                root: path.clone(),
                sub_directory: path,
                should_delete: false,
            }),
            TemplateReference::Name(name) => self.retrieve_cached(&name, offline, kind).await,
        }
    }

    async fn retrieve_git(&self, url: &str) -> Result<TemplateRepository> {
        let temp = TempDir::new(TEMP_PREFIX)?;
        let sub_directory = retrieve_git_folder(self.cloner.as_ref(), url, temp.path())
            .await
            .with_context(|| format!("Failed to retrieve template from {url}"))?;
        Ok(TemplateRepository {
            root: temp.keep(),
            sub_directory,
            should_delete: true,
        })
    }

    async fn retrieve_zip(&self, url: &str, kind: TemplateKind) -> Result<TemplateRepository> {
        let mut request = HttpRequest::get(url);
        apply_hooks(&mut request, &self.hooks);
        let response = self.transport.get(request).await?;

        if response.status == 401 && response.header(CLOUD_SIGNATURE_HEADER).is_some() {
            return Err(IacpmError::Unauthorized {
                url: url.to_string(),
            }
            .into());
        }
        let response = response.error_for_status(url)?;
        tracing::debug!(url, bytes = response.body.len(), "Downloaded template archive");

        let temp = TempDir::new(TEMP_PREFIX)?;
        let dest = temp.path().to_path_buf();
        let body = response.body;
        tokio::task::spawn_blocking(move || archive::extract(Cursor::new(body), &dest, ArchiveFormat::Zip))
            .await
            .context("Failed to spawn blocking task for archive extraction")?
            .with_context(|| format!("Failed to extract template archive from {url}"))?;

        let manifest = kind.manifest_file();
        let Some(sub_directory) = shallowest_manifest_dir(temp.path(), manifest) else {
            return Err(IacpmError::MissingManifest {
                location: url.to_string(),
                manifest: manifest.to_string(),
            }
            .into());
        };

        Ok(TemplateRepository {
            root: temp.keep(),
            sub_directory,
            should_delete: true,
        })
    }

    async fn retrieve_cached(
        &self,
        name: &str,
        offline: bool,
        kind: TemplateKind,
    ) -> Result<TemplateRepository> {
        let name = name.to_lowercase();
        let cache = self.cache(kind);

        self.remove_stale_cache(cache).await?;
        ensure_dir(&cache.dir)?;

        if !offline {
            self.cloner
                .clone_or_pull(&cache.repository, &cache.branch, &cache.dir)
                .await
                .with_context(|| format!("Failed to refresh {kind} templates from {}", cache.repository))?;
        }

        let sub_directory = if name.is_empty() {
            cache.dir.clone()
        } else {
            let dir = cache.dir.join(&name);
            if !dir.exists() {
                return Err(IacpmError::TemplateNotFound {
                    suggestions: suggest_templates(&cache.dir, &name, MAX_SUGGESTION_DISTANCE),
                    name,
                }
                .into());
            }
            if !dir.is_dir() {
                return Err(not_a_directory(&dir).into());
            }
            dir
        };

        Ok(TemplateRepository {
            root: cache.dir.clone(),
            sub_directory,
            should_delete: false,
        })
    }

    /// Removes a cache directory that is not a checkout of the configured
    /// repository so that the next clone starts clean.
    async fn remove_stale_cache(&self, cache: &TemplateCacheSettings) -> Result<()> {
        if !cache.dir.exists() {
            return Ok(());
        }
        let stale = match self.cloner.remote_url(&cache.dir).await? {
            None => true,
            Some(origin) => !origin.contains(&cache.repository),
        };
        if stale {
            tracing::debug!(dir = %cache.dir.display(), repository = %cache.repository, "Removing stale template cache");
            remove_dir_all(&cache.dir)?;
        }
        Ok(())
    }
}

/// Directory of the least deeply nested `manifest` file under `root`.
fn shallowest_manifest_dir(root: &Path, manifest: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == manifest)
        .min_by_key(walkdir::DirEntry::depth)
        .and_then(|entry| entry.path().parent().map(Path::to_path_buf))
}
