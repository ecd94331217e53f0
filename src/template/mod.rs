//! Project and policy-pack templates.
//!
//! A template is a directory holding a manifest (`Iacpm.yaml` for projects,
//! `IacpmPolicy.yaml` for policy packs) plus the files to scaffold. Templates
//! are found through a [`TemplateRepository`], which [`TemplateResolver`]
//! materializes from a bare name, a local path, a git URL or a zip URL, and
//! are written into a project with [`copy_template_files`].
//!
//! ```rust,no_run
//! use iacpm_cli::template::{TemplateKind, TemplateResolver, copy_template_files};
//! # async fn example(resolver: TemplateResolver) -> anyhow::Result<()> {
//! let repo = resolver.resolve("aws-go", false, TemplateKind::Project).await?;
//! let templates = repo.templates()?;
//! copy_template_files(&templates[0].dir, "./my-project".as_ref(), false, "my-project", "")?;
//! repo.delete()?;
//! # Ok(())
//! # }
//! ```

pub mod copy;
pub mod resolver;

pub use copy::{
    copy_template_files, copy_template_files_dry_run, sanitize_project_name,
    validate_project_description, validate_project_name, value_or_default_project_description,
    value_or_sanitized_default_project_name,
};
pub use resolver::{TemplateReference, TemplateResolver};

use crate::constants::{GIT_DIR, POLICY_MANIFEST_FILE, PROJECT_MANIFEST_FILE};
use crate::core::IacpmError;
use crate::utils::fs::remove_dir_all;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which manifest identifies a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Project,
    PolicyPack,
}

impl TemplateKind {
    #[must_use]
    pub const fn manifest_file(self) -> &'static str {
        match self {
            Self::Project => PROJECT_MANIFEST_FILE,
            Self::PolicyPack => POLICY_MANIFEST_FILE,
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::PolicyPack => write!(f, "policy pack"),
        }
    }
}

/// A project template found in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    pub dir: PathBuf,
    pub name: String,
    pub description: String,
    /// Shown to the user after the project is created
    pub quickstart: String,
    /// Listed by default
    pub important: bool,
    pub project_name: String,
    pub project_description: String,
}

/// A policy-pack template found in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyPackTemplate {
    pub dir: PathBuf,
    pub name: String,
    pub description: String,
}

// Only the manifest fields templates need; the rest of the schema is ignored.
#[derive(Debug, Default, Deserialize)]
struct ProjectManifest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    template: Option<TemplateSection>,
}

#[derive(Debug, Default, Deserialize)]
struct TemplateSection {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    quickstart: Option<String>,
    #[serde(default)]
    important: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyManifest {
    #[serde(default)]
    description: Option<String>,
}

fn dir_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn read_manifest<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    // An empty manifest is valid YAML for "no fields"
    if content.trim().is_empty() {
        return Ok(Some(serde_yaml::from_str("{}")?));
    }
    serde_yaml::from_str(&content)
        .map(Some)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Loads the project template in `dir`, or `None` when `dir` has no manifest.
pub fn load_template(dir: &Path) -> Result<Option<Template>> {
    let Some(manifest) = read_manifest::<ProjectManifest>(&dir.join(PROJECT_MANIFEST_FILE))? else {
        return Ok(None);
    };
    let section = manifest.template.unwrap_or_default();
    Ok(Some(Template {
        dir: dir.to_path_buf(),
        name: dir_name(dir),
        description: section.description.unwrap_or_default(),
        quickstart: section.quickstart.unwrap_or_default(),
        important: section.important,
        project_name: manifest.name,
        project_description: manifest.description.unwrap_or_default(),
    }))
}

/// Loads the policy-pack template in `dir`, or `None` when `dir` has no manifest.
pub fn load_policy_template(dir: &Path) -> Result<Option<PolicyPackTemplate>> {
    let Some(manifest) = read_manifest::<PolicyManifest>(&dir.join(POLICY_MANIFEST_FILE))? else {
        return Ok(None);
    };
    Ok(Some(PolicyPackTemplate {
        dir: dir.to_path_buf(),
        name: dir_name(dir),
        description: manifest.description.unwrap_or_default(),
    }))
}

/// A directory of templates, possibly temporary.
///
/// `root` is what was materialized; `sub_directory` is where the templates
/// are. When `should_delete` is set, `root` is a private temporary directory
/// owned by this value and [`delete`](Self::delete) removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRepository {
    pub root: PathBuf,
    pub sub_directory: PathBuf,
    pub should_delete: bool,
}

impl TemplateRepository {
    pub fn delete(&self) -> Result<()> {
        if self.should_delete {
            tracing::debug!(root = %self.root.display(), "Removing retrieved template repository");
            remove_dir_all(&self.root)?;
        }
        Ok(())
    }

    /// The project templates in this repository: the sub-directory itself when
    /// it is a template, otherwise each child directory that is one.
    pub fn templates(&self) -> Result<Vec<Template>> {
        self.collect(load_template)
    }

    /// Policy-pack counterpart of [`templates`](Self::templates).
    pub fn policy_templates(&self) -> Result<Vec<PolicyPackTemplate>> {
        self.collect(load_policy_template)
    }

    fn collect<T>(&self, load: impl Fn(&Path) -> Result<Option<T>>) -> Result<Vec<T>> {
        let mut path = self.sub_directory.clone();
        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read template directory {}", path.display()))?;
        if !metadata.is_dir() {
            if let Some(parent) = path.parent() {
                path = parent.to_path_buf();
            }
        }

        if let Some(template) = load(&path)? {
            return Ok(vec![template]);
        }

        let mut children: Vec<PathBuf> = std::fs::read_dir(&path)
            .with_context(|| format!("Failed to read template directory {}", path.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|entry| entry.file_name() != GIT_DIR)
            .map(|entry| entry.path())
            .collect();
        children.sort();

        let mut result = Vec::new();
        for child in children {
            if let Some(template) = load(&child)? {
                result.push(template);
            }
        }
        Ok(result)
    }
}

/// Names in `dir` within the suggestion distance of `name`, closest first and
/// alphabetical among ties.
pub fn suggest_templates(dir: &Path, name: &str, max_distance: usize) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut scored: Vec<(usize, String)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|candidate| candidate != GIT_DIR)
        .map(|candidate| (strsim::levenshtein(name, &candidate), candidate))
        .filter(|(distance, _)| *distance <= max_distance)
        .collect();
    scored.sort();
    scored.into_iter().map(|(_, candidate)| candidate).collect()
}

pub(crate) fn not_a_directory(path: &Path) -> IacpmError {
    IacpmError::NotADirectory {
        path: path.display().to_string(),
    }
}
