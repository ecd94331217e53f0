//! Command-line interface for IACPM.
//!
//! # Commands
//!
//! - `plugin install|ls|rm` - manage the plugin install root
//! - `template ls` - list the templates a reference resolves to
//! - `new` - scaffold a project from a template
//!
//! # Global Options
//!
//! - `--verbose` / `--quiet` - log level (`RUST_LOG` wins over both)
//! - `--config <PATH>` - global config file (also `IACPM_CONFIG`)
//! - `--no-progress` - disable spinners
//!
//! Commands hold no logic of their own: each one builds the library
//! components from the resolved [`Settings`] and calls into them.

mod new;
mod plugin;
mod template;

use crate::config::{GlobalConfigManager, Settings};
use crate::git::{GitCli, RepoCloner};
use crate::source::{HttpTransport, ReqwestTransport};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Options shared by all commands after parsing.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    pub no_progress: bool,
    pub config_path: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "iacpm",
    about = "Infrastructure plugin manager - install provider plugins and scaffold projects",
    version,
    long_about = "iacpm downloads and atomically installs versioned infrastructure plugins, \
                  and creates new projects from template repositories."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the global config file
    #[arg(short, long, global = true, env = "IACPM_CONFIG")]
    config: Option<PathBuf>,

    /// Disable progress spinners
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install, list and remove plugins
    Plugin(plugin::PluginCommand),

    /// Inspect templates
    Template(template::TemplateCommand),

    /// Create a new project from a template
    New(new::NewCommand),
}

/// Everything a command needs, built once per invocation.
pub struct CommandContext {
    pub settings: Settings,
    pub transport: Arc<dyn HttpTransport>,
    pub cloner: Arc<dyn RepoCloner>,
    pub no_progress: bool,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        init_logging(&config.log_level);
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        };

        CliConfig {
            log_level: log_level.to_string(),
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        let mut manager = match config.config_path {
            Some(path) => GlobalConfigManager::with_path(path),
            None => GlobalConfigManager::new(),
        };
        let settings = Settings::from_env(manager.get().await?)?;
        tracing::debug!(plugin_dir = %settings.plugin_dir.display(), "Resolved settings");

        let ctx = CommandContext {
            settings,
            transport: Arc::new(ReqwestTransport::new()?),
            cloner: Arc::new(GitCli::new()),
            no_progress: config.no_progress,
        };

        match self.command {
            Commands::Plugin(cmd) => cmd.execute(&ctx).await,
            Commands::Template(cmd) => cmd.execute(&ctx).await,
            Commands::New(cmd) => cmd.execute(&ctx).await,
        }
    }
}

/// Installs the stderr subscriber. `RUST_LOG` takes precedence over `default_level`.
fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("iacpm_cli={default_level},iacpm={default_level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
