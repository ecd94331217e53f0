//! `iacpm plugin` subcommands.

use super::CommandContext;
use crate::core::IacpmError;
use crate::plugin::{
    InstalledPlugin, PluginKind, PluginLookupCache, PluginManager, PluginSpec, parse_version_tolerant,
};
use crate::utils::progress::ProgressBar;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct PluginCommand {
    #[command(subcommand)]
    command: PluginSubcommand,
}

#[derive(Subcommand)]
enum PluginSubcommand {
    /// Download and install a plugin
    Install(InstallArgs),

    /// List installed plugins
    Ls {
        /// Compute size and install/last-used times
        #[arg(long)]
        metadata: bool,

        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove installed plugins
    Rm {
        kind: Option<PluginKind>,
        name: Option<String>,
        /// Only this version; all versions when omitted
        version: Option<String>,

        /// Remove every plugin matching the given filters
        #[arg(long)]
        all: bool,

        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Args)]
struct InstallArgs {
    /// resource, language, analyzer or tool
    kind: PluginKind,
    name: String,
    /// Exact version; the latest release when omitted
    version: Option<String>,

    /// Plugin server URL (registry://, github://, gitlab:// or http(s)://)
    #[arg(long)]
    server: Option<String>,

    /// Install from a local archive instead of downloading
    #[arg(long, requires = "version", conflicts_with = "server")]
    file: Option<PathBuf>,

    /// Reinstall even if the version is already present
    #[arg(long)]
    reinstall: bool,

    /// Expected sha256 of the archive for this platform
    #[arg(long)]
    checksum: Option<String>,
}

impl PluginCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let manager = PluginManager::new(
            &ctx.settings.plugin_dir,
            ctx.transport.clone(),
            ctx.settings.source_options()?,
            Arc::new(PluginLookupCache::new()),
        )?
        .with_lock_timeout(ctx.settings.lock_timeout);

        match self.command {
            PluginSubcommand::Install(args) => install(&manager, args, ctx.no_progress).await,
            PluginSubcommand::Ls {
                metadata,
                json,
            } => list(&manager, metadata, json),
            PluginSubcommand::Rm {
                kind,
                name,
                version,
                all,
                yes,
            } => remove(&manager, kind, name, version, all, yes).await,
        }
    }
}

async fn install(manager: &PluginManager, args: InstallArgs, no_progress: bool) -> Result<()> {
    let version = args.version.as_deref().map(parse_version_tolerant).transpose()?;
    let mut spec = PluginSpec::new(args.kind, args.name, version);
    if let Some(server) = args.server {
        spec = spec.with_download_url(server);
    }
    if let Some(checksum) = args.checksum {
        spec = spec.with_checksum(manager.platform().key(), checksum);
    }

    let spinner = ProgressBar::new_spinner(!no_progress);
    spinner.set_message(format!("Installing {spec}"));
    let result = match &args.file {
        Some(path) => manager.install_from_file(&spec, path, args.reinstall).await,
        None => manager.ensure_installed(&spec, args.reinstall).await,
    };
    spinner.finish_and_clear();

    let plugin = result?;
    println!(
        "{} {} plugin {} v{} ({})",
        "Installed".green().bold(),
        plugin.kind,
        plugin.name,
        plugin.version,
        plugin.dir().display()
    );
    Ok(())
}

fn list(manager: &PluginManager, metadata: bool, json: bool) -> Result<()> {
    let plugins = manager.list(!metadata)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plugins).context("Failed to serialize plugins")?);
        return Ok(());
    }

    if plugins.is_empty() {
        println!("No plugins installed in {}", manager.root().display());
        return Ok(());
    }

    if metadata {
        println!("{:<24} {:<10} {:<12} {:>10}  {:<20} {:<20}", "NAME", "KIND", "VERSION", "SIZE", "INSTALLED", "LAST USED");
    } else {
        println!("{:<24} {:<10} {:<12}", "NAME", "KIND", "VERSION");
    }
    for plugin in &plugins {
        print_row(plugin, metadata);
    }

    if metadata {
        let total: u64 = plugins.iter().filter_map(|p| p.metadata.as_ref()).map(|m| m.size_bytes).sum();
        println!("\n{} plugins, {} total", plugins.len(), format_size(total));
    }
    Ok(())
}

fn print_row(plugin: &InstalledPlugin, metadata: bool) {
    let name = plugin.name.bold();
    if !metadata {
        println!("{:<24} {:<10} {:<12}", name, plugin.kind.as_str(), plugin.version.to_string());
        return;
    }

    let format_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M").to_string()).unwrap_or_else(|| "n/a".to_string())
    };
    let (size, installed, used) = match &plugin.metadata {
        Some(m) => (format_size(m.size_bytes), format_time(m.install_time), format_time(m.last_used_time)),
        None => ("n/a".to_string(), "n/a".to_string(), "n/a".to_string()),
    };
    println!(
        "{:<24} {:<10} {:<12} {:>10}  {:<20} {:<20}",
        name,
        plugin.kind.as_str(),
        plugin.version.to_string(),
        size,
        installed,
        used
    );
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

async fn remove(
    manager: &PluginManager,
    kind: Option<PluginKind>,
    name: Option<String>,
    version: Option<String>,
    all: bool,
    yes: bool,
) -> Result<()> {
    if !all && (kind.is_none() || name.is_none()) {
        return Err(IacpmError::InvalidPluginSpec {
            reason: "specify a plugin kind and name, or pass --all".to_string(),
        }
        .into());
    }
    let version = version.as_deref().map(parse_version_tolerant).transpose()?;

    let targets: Vec<InstalledPlugin> = manager
        .list(true)?
        .into_iter()
        .filter(|p| kind.is_none_or(|k| p.kind == k))
        .filter(|p| name.as_deref().is_none_or(|n| p.name == n))
        .filter(|p| version.as_ref().is_none_or(|v| &p.version == v))
        .collect();

    if targets.is_empty() {
        if all {
            println!("No matching plugins installed");
            return Ok(());
        }
        return Err(IacpmError::PluginNotFound {
            kind: kind.map(|k| k.to_string()).unwrap_or_default(),
            name: name.unwrap_or_default(),
            version: version.map(|v| v.to_string()),
        }
        .into());
    }

    if !yes && !confirm(&targets)? {
        println!("Removal cancelled");
        return Ok(());
    }

    for plugin in &targets {
        manager.remove(&plugin.spec()).await?;
        println!("{} {}", "Removed".green().bold(), plugin.dir_name);
    }
    Ok(())
}

fn confirm(targets: &[InstalledPlugin]) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Err(IacpmError::Other {
            message: "refusing to remove plugins without confirmation; pass --yes".to_string(),
        }
        .into());
    }

    println!("This will remove:");
    for plugin in targets {
        println!("  {}", plugin.dir_name);
    }
    print!("Continue? [y/N] ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
