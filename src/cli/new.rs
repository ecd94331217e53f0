//! Create a new project from a template.
//!
//! ```bash
//! # From the template cache (cloned or refreshed first)
//! iacpm new aws-go --dir ./infra
//!
//! # From a git folder or a zip archive
//! iacpm new https://github.com/acme/templates/tree/main/aws-go
//! iacpm new https://example.com/templates/aws-go.zip --name billing
//! ```
//!
//! Without `--force` nothing is written if any template file would overwrite
//! an existing one; the whole list of collisions is reported at once.

use super::CommandContext;
use crate::core::IacpmError;
use crate::template::{
    TemplateKind, TemplateRepository, TemplateResolver, copy_template_files,
    copy_template_files_dry_run, validate_project_description, validate_project_name,
    value_or_default_project_description, value_or_sanitized_default_project_name,
};
use crate::utils::fs::ensure_dir;
use crate::utils::progress::ProgressBar;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct NewCommand {
    /// Template name, local path, git URL or zip URL
    template: String,

    /// Directory to create the project in; the current directory when omitted
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Project name; derived from the directory name when omitted
    #[arg(long)]
    name: Option<String>,

    /// Project description
    #[arg(long)]
    description: Option<String>,

    /// Overwrite existing files
    #[arg(long)]
    force: bool,

    /// Use only the local template cache
    #[arg(long)]
    offline: bool,

    /// Create a policy pack instead of a project
    #[arg(long)]
    policy: bool,

    /// Check for conflicts without writing anything
    #[arg(long)]
    dry_run: bool,
}

/// The template chosen from a resolved repository.
struct Selected {
    dir: PathBuf,
    project_name: String,
    project_description: String,
    quickstart: String,
}

impl NewCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let kind = if self.policy {
            TemplateKind::PolicyPack
        } else {
            TemplateKind::Project
        };
        let resolver =
            TemplateResolver::from_settings(&ctx.settings, ctx.transport.clone(), ctx.cloner.clone());

        let spinner = ProgressBar::new_spinner(!ctx.no_progress);
        spinner.set_message(format!("Retrieving {kind} template {}", self.template));
        let resolved = resolver.resolve(&self.template, self.offline, kind).await;
        spinner.finish_and_clear();
        let repo = resolved?;

        let result = self.scaffold(&repo, kind);
        repo.delete()?;
        result
    }

    fn scaffold(&self, repo: &TemplateRepository, kind: TemplateKind) -> Result<()> {
        let selected = select_template(repo, kind, &self.template)?;

        let dest = match &self.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to determine the current directory")?,
        };
        let fallback_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let project_name = value_or_sanitized_default_project_name(
            self.name.as_deref().unwrap_or(""),
            &selected.project_name,
            &fallback_name,
        );
        let project_description = value_or_default_project_description(
            self.description.as_deref().unwrap_or(""),
            &selected.project_description,
            "",
        );
        validate_project_name(&project_name)?;
        validate_project_description(&project_description)?;

        if !self.force || self.dry_run {
            check_conflicts(&selected.dir, &dest, &project_name, self.force)?;
        }
        if self.dry_run {
            println!(
                "{} {kind} {} would be created in {}",
                "Dry run:".yellow().bold(),
                project_name,
                dest.display()
            );
            return Ok(());
        }

        ensure_dir(&dest)?;
        copy_template_files(&selected.dir, &dest, self.force, &project_name, &project_description)?;
        tracing::info!(project = %project_name, dest = %dest.display(), "Created {kind}");

        println!("{} {kind} {} in {}", "Created".green().bold(), project_name, dest.display());
        if !selected.quickstart.is_empty() {
            println!("\n{}", selected.quickstart.replace("${PROJECT}", &project_name));
        }
        Ok(())
    }
}

/// With `force` a conflict is only reported, never fatal.
fn check_conflicts(source: &Path, dest: &Path, project_name: &str, force: bool) -> Result<()> {
    if !dest.exists() {
        return Ok(());
    }
    match copy_template_files_dry_run(source, dest, project_name) {
        Err(e) if force => {
            if let Some(IacpmError::ExistingFiles {
                files,
            }) = e.downcast_ref::<IacpmError>()
            {
                println!("{} {} existing file(s) will be overwritten", "Warning:".yellow(), files.len());
            }
            Ok(())
        }
        other => other,
    }
}

/// A repository holding several templates needs `reference` to name one of them.
fn select_template(repo: &TemplateRepository, kind: TemplateKind, reference: &str) -> Result<Selected> {
    let mut candidates: Vec<Selected> = match kind {
        TemplateKind::Project => repo
            .templates()?
            .into_iter()
            .map(|t| Selected {
                dir: t.dir,
                project_name: t.project_name,
                project_description: t.project_description,
                quickstart: t.quickstart,
            })
            .collect(),
        TemplateKind::PolicyPack => repo
            .policy_templates()?
            .into_iter()
            .map(|t| Selected {
                dir: t.dir,
                project_name: String::new(),
                project_description: t.description,
                quickstart: String::new(),
            })
            .collect(),
    };

    if candidates.len() > 1 {
        let wanted = reference.to_lowercase();
        candidates.retain(|c| c.dir.file_name().is_some_and(|n| n.to_string_lossy() == wanted));
    }
    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(IacpmError::TemplateNotFound {
            name: reference.to_string(),
            suggestions: Vec::new(),
        }
        .into()),
        n => Err(IacpmError::Other {
            message: format!("{reference} provides {n} {kind} templates; name one of them"),
        }
        .into()),
    }
}
