//! IACPM - Infrastructure plugin manager
//!
//! Library behind the `iacpm` CLI. It covers two jobs an infrastructure-as-code
//! tool needs before any deployment runs:
//!
//! - **Plugin acquisition**: find, download, verify and atomically install
//!   versioned plugins (resource providers, language hosts, analyzers and tools)
//!   into a shared install root that several processes may use at once.
//! - **Templates**: turn a template name, local path, git folder URL or zip URL
//!   into a directory of templates and scaffold a project from one of them.
//!
//! # Core Modules
//!
//! ## Plugins
//! - [`plugin`] - Specs, the install root, per-plugin locks and the staged install protocol
//! - [`source`] - Download sources (registry, GitHub, GitLab, plain HTTP) and the HTTP seam
//! - [`archive`] - Safe `.tar.gz` and zip extraction
//!
//! ## Templates
//! - [`template`] - Template discovery, retrieval and copying
//! - [`git`] - Git operations wrapper using the system `git` command
//!
//! ## Supporting Modules
//! - [`cli`] - Command-line interface
//! - [`config`] - Global configuration (`~/.iacpm/config.toml`) and environment overrides
//! - [`core`] - Error taxonomy and user-facing error formatting
//! - [`constants`] - Timeouts, default URLs and file names
//! - [`utils`] - Filesystem, platform and progress helpers
//!
//! # Install Root Layout
//!
//! ```text
//! ~/.iacpm/plugins/
//! ├── resource-aws-v6.1.0/        # final directory, only ever whole
//! ├── resource-aws-v6.1.0.partial # present while a pending install may be incomplete
//! ├── resource-aws-v6.1.0.lock    # advisory lock serializing installs of this version
//! └── tool-checker-v1.2.0/
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use iacpm_cli::config::{GlobalConfig, Settings};
//! use iacpm_cli::plugin::{PluginKind, PluginLookupCache, PluginManager, PluginSpec};
//! use iacpm_cli::source::ReqwestTransport;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = Settings::from_env(&GlobalConfig::default())?;
//! let manager = PluginManager::new(
//!     &settings.plugin_dir,
//!     Arc::new(ReqwestTransport::new()?),
//!     settings.source_options()?,
//!     Arc::new(PluginLookupCache::new()),
//! )?;
//!
//! let spec = PluginSpec::new(PluginKind::Resource, "aws", Some("6.1.0".parse()?));
//! let installed = manager.ensure_installed(&spec, false).await?;
//! println!("{}", installed.dir().display());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod git;
pub mod plugin;
pub mod source;
pub mod template;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
