//! User-wide configuration and the effective settings derived from it.
//!
//! # Location
//!
//! - **Unix/macOS**: `~/.iacpm/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\iacpm\config.toml`
//! - **Override**: `IACPM_CONFIG`, or the `--config` flag
//!
//! A missing file is the same as an empty one.
//!
//! # Format
//!
//! ```toml
//! plugin_dir = "~/.iacpm/plugins"
//!
//! [plugins]
//! download_url_overrides = "^https://get.iacpm.dev=https://mirror.corp/iacpm"
//! lock_timeout_secs = 300
//!
//! [templates]
//! project_dir = "~/.iacpm/templates"
//! project_repository = "https://github.com/acme/templates.git"
//! project_branch = "main"
//! ```
//!
//! # Precedence
//!
//! [`Settings::resolve`] layers environment variables over the file over
//! built-in defaults. The environment lookup is a parameter so resolution can
//! be tested without touching the process environment.

use crate::constants::{
    DEFAULT_POLICY_TEMPLATE_REPOSITORY, DEFAULT_TEMPLATE_BRANCH, DEFAULT_TEMPLATE_REPOSITORY,
};
use crate::core::IacpmError;
use crate::source::{SourceOptions, UrlOverrides};
use crate::template::TemplateKind;
use crate::utils::platform::resolve_path;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Contents of `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Install root for plugins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_dir: Option<String>,

    #[serde(default, skip_serializing_if = "PluginConfig::is_empty")]
    pub plugins: PluginConfig,

    #[serde(default, skip_serializing_if = "TemplateConfig::is_empty")]
    pub templates: TemplateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PluginConfig {
    /// Comma-separated `regex=replacement` list applied to plugin server URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url_overrides: Option<String>,

    /// How long to wait for another process installing the same plugin.
    /// Unset means wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_timeout_secs: Option<u64>,
}

impl PluginConfig {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TemplateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_branch: Option<String>,
}

impl TemplateConfig {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl GlobalConfig {
    /// Loads from `path`, or from [`default_path`](Self::default_path) when
    /// `path` is `None`. A missing file yields the default configuration.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!(path = %path.display(), "No global config, using defaults");
            Ok(Self::default())
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .map_err(|e| IacpmError::ConfigError {
                message: e.to_string(),
            })
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    /// Writes the configuration as TOML, creating parent directories. On unix
    /// the file is made owner-only since it may hold mirror credentials.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write global config to {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await.with_context(
                || format!("Failed to set permissions on {}", path.display()),
            )?;
        }

        Ok(())
    }

    /// `IACPM_CONFIG` if set, else the platform location.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("IACPM_CONFIG") {
            return resolve_path(&path);
        }
        Ok(default_home(&|key| std::env::var(key).ok())?.join("config.toml"))
    }
}

/// Per-user state directory: `IACPM_HOME`, else `~/.iacpm`
/// (`%LOCALAPPDATA%\iacpm` on Windows).
pub fn default_home(env: &dyn Fn(&str) -> Option<String>) -> Result<PathBuf> {
    if let Some(home) = env("IACPM_HOME").filter(|h| !h.is_empty()) {
        return resolve_path(&home);
    }
    if cfg!(target_os = "windows") {
        Ok(dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
            .join("iacpm"))
    } else {
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
            .join(".iacpm"))
    }
}

/// Where a bare-name template cache lives and what it mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateCacheSettings {
    pub dir: PathBuf,
    pub repository: String,
    pub branch: String,
}

/// Effective settings after layering environment, config file and defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub home: PathBuf,
    pub plugin_dir: PathBuf,
    pub url_overrides: Option<String>,
    pub lock_timeout: Option<Duration>,
    pub github_token: Option<String>,
    pub gitlab_token: Option<String>,
    pub project_templates: TemplateCacheSettings,
    pub policy_templates: TemplateCacheSettings,
}

impl Settings {
    /// Resolves settings from `config` and the environment seen through `env`.
    pub fn resolve(config: &GlobalConfig, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| env(key).filter(|v| !v.is_empty());
        let path = |env_key: &str, configured: &Option<String>, default: PathBuf| -> Result<PathBuf> {
            match var(env_key).or_else(|| configured.clone()) {
                Some(raw) => resolve_path(&raw),
                None => Ok(default),
            }
        };

        let home = default_home(env)?;
        let templates = &config.templates;

        Ok(Self {
            plugin_dir: path("IACPM_PLUGIN_DIR", &config.plugin_dir, home.join("plugins"))?,
            url_overrides: var("IACPM_PLUGIN_DOWNLOAD_URL_OVERRIDES")
                .or_else(|| config.plugins.download_url_overrides.clone()),
            lock_timeout: config.plugins.lock_timeout_secs.map(Duration::from_secs),
            github_token: var("GITHUB_TOKEN"),
            gitlab_token: var("GITLAB_TOKEN"),
            project_templates: TemplateCacheSettings {
                dir: path("IACPM_TEMPLATE_PATH", &templates.project_dir, home.join("templates"))?,
                repository: var("IACPM_TEMPLATE_GIT_REPOSITORY")
                    .or_else(|| templates.project_repository.clone())
                    .unwrap_or_else(|| DEFAULT_TEMPLATE_REPOSITORY.to_string()),
                branch: var("IACPM_TEMPLATE_BRANCH")
                    .or_else(|| templates.project_branch.clone())
                    .unwrap_or_else(|| DEFAULT_TEMPLATE_BRANCH.to_string()),
            },
            policy_templates: TemplateCacheSettings {
                dir: path(
                    "IACPM_POLICY_TEMPLATE_PATH",
                    &templates.policy_dir,
                    home.join("templates-policy"),
                )?,
                repository: var("IACPM_POLICY_TEMPLATE_GIT_REPOSITORY")
                    .or_else(|| templates.policy_repository.clone())
                    .unwrap_or_else(|| DEFAULT_POLICY_TEMPLATE_REPOSITORY.to_string()),
                branch: var("IACPM_POLICY_TEMPLATE_BRANCH")
                    .or_else(|| templates.policy_branch.clone())
                    .unwrap_or_else(|| DEFAULT_TEMPLATE_BRANCH.to_string()),
            },
            home,
        })
    }

    /// Resolves against the process environment.
    pub fn from_env(config: &GlobalConfig) -> Result<Self> {
        Self::resolve(config, &|key| std::env::var(key).ok())
    }

    #[must_use]
    pub const fn template_cache(&self, kind: TemplateKind) -> &TemplateCacheSettings {
        match kind {
            TemplateKind::Project => &self.project_templates,
            TemplateKind::PolicyPack => &self.policy_templates,
        }
    }

    /// Download-source options, with the override list parsed.
    pub fn source_options(&self) -> Result<SourceOptions> {
        let overrides = match &self.url_overrides {
            Some(raw) => UrlOverrides::parse(raw)?,
            None => UrlOverrides::default(),
        };
        Ok(SourceOptions {
            overrides,
            github_token: self.github_token.clone(),
            gitlab_token: self.gitlab_token.clone(),
            ..SourceOptions::default()
        })
    }
}

/// Loads the global configuration once and hands out the cached copy.
pub struct GlobalConfigManager {
    config: Option<GlobalConfig>,
    path: Option<PathBuf>,
}

impl GlobalConfigManager {
    /// Uses the default location.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            config: None,
            path: None,
        }
    }

    #[must_use]
    pub const fn with_path(path: PathBuf) -> Self {
        Self {
            config: None,
            path: Some(path),
        }
    }

    pub async fn get(&mut self) -> Result<&GlobalConfig> {
        if self.config.is_none() {
            self.reload().await?;
        }
        match &self.config {
            Some(config) => Ok(config),
            None => Err(anyhow::anyhow!("global config was not loaded")),
        }
    }

    pub async fn reload(&mut self) -> Result<()> {
        self.config = Some(GlobalConfig::load_with_optional(self.path.clone()).await?);
        Ok(())
    }
}

impl Default for GlobalConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
