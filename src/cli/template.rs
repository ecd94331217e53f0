//! `iacpm template` subcommands.

use super::CommandContext;
use crate::template::{TemplateKind, TemplateResolver};
use crate::utils::progress::ProgressBar;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

#[derive(Args)]
pub struct TemplateCommand {
    #[command(subcommand)]
    command: TemplateSubcommand,
}

#[derive(Subcommand)]
enum TemplateSubcommand {
    /// List the templates a name, path or URL provides
    Ls {
        /// Template name, path or URL; the whole template cache when omitted
        reference: Option<String>,

        /// Use only the local template cache
        #[arg(long)]
        offline: bool,

        /// List policy-pack templates
        #[arg(long)]
        policy: bool,
    },
}

impl TemplateCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        match self.command {
            TemplateSubcommand::Ls {
                reference,
                offline,
                policy,
            } => {
                let kind = if policy {
                    TemplateKind::PolicyPack
                } else {
                    TemplateKind::Project
                };
                list(ctx, reference.as_deref().unwrap_or(""), offline, kind).await
            }
        }
    }
}

async fn list(
    ctx: &CommandContext,
    reference: &str,
    offline: bool,
    kind: TemplateKind,
) -> Result<()> {
    let resolver =
        TemplateResolver::from_settings(&ctx.settings, ctx.transport.clone(), ctx.cloner.clone());

    let spinner = ProgressBar::new_spinner(!ctx.no_progress);
    spinner.set_message("Retrieving templates");
    let resolved = resolver.resolve(reference, offline, kind).await;
    spinner.finish_and_clear();
    let repo = resolved?;

    // Listing errors must not leak the temporary checkout
    let result = (|| -> Result<Vec<(String, String)>> {
        Ok(match kind {
            TemplateKind::Project => repo
                .templates()?
                .into_iter()
                .map(|t| {
                    let marker = if t.important { "*" } else { "" };
                    (format!("{}{marker}", t.name), t.description)
                })
                .collect(),
            TemplateKind::PolicyPack => {
                repo.policy_templates()?.into_iter().map(|t| (t.name, t.description)).collect()
            }
        })
    })();
    repo.delete()?;
    let entries = result?;

    if entries.is_empty() {
        println!("No {kind} templates found");
        return Ok(());
    }
    let width = entries.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, description) in entries {
        println!("{:<width$}  {}", name.bold(), description);
    }
    Ok(())
}
