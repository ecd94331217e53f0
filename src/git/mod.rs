//! Source-control access for template retrieval.
//!
//! Templates can live in git repositories: either the bare-name template cache,
//! which is a checkout of a configurable repository kept fresh with
//! clone-or-pull, or a one-off clone of a URL such as
//! `https://github.com/acme/templates/tree/main/aws-go`.
//!
//! Like the rest of the tool this module uses the system `git` binary rather
//! than an embedded implementation, so SSH agents, credential helpers and
//! `~/.gitconfig` behave exactly as they do on the command line. All git
//! invocations go through [`GitCommand`].
//!
//! The [`RepoCloner`] trait is the seam the template resolver depends on.
//! [`GitCli`] is the production implementation; tests substitute a fake that
//! copies fixture directories and counts calls.
//!
//! # URL grammar
//!
//! [`parse_git_repo_url`] splits a template URL into the repository to clone
//! and the path inside it:
//!
//! | Input                                                | Repository                          | Path                   |
//! |------------------------------------------------------|-------------------------------------|------------------------|
//! | `https://github.com/acme/templates/aws-go`           | `https://github.com/acme/templates.git` | `aws-go`           |
//! | `https://gitlab.com/grp/sub/templates.git/aws-go`    | `https://gitlab.com/grp/sub/templates.git` | `aws-go`        |
//! | `https://github.com/acme/templates/tree/main/aws-go` | `https://github.com/acme/templates.git` | `tree/main/aws-go` |
//!
//! [`resolve_git_ref`] then turns the path into a [`GitRef`] to check out and
//! the sub-directory holding the template.

pub mod command_builder;

pub use command_builder::GitCommand;

use crate::constants::GIT_DIR;
use crate::core::IacpmError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static COMMIT_SHA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{40}$").expect("commit regex is valid"));

/// What to check out after cloning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRef {
    /// The remote's default branch
    Head,
    /// A branch or tag, by short name
    Named(String),
    /// A full 40-character commit hash
    Commit(String),
}

/// A template URL split into a cloneable repository URL and a path inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRepoUrl {
    pub url: String,
    /// Slash-separated, without leading or trailing slashes. May be empty.
    pub path: String,
}

/// Clone and refresh operations the template resolver needs.
#[async_trait]
pub trait RepoCloner: Send + Sync {
    /// Shallow-clones `url` at `reference` (a branch or tag) into `dest`, or
    /// at the remote HEAD when `reference` is `None`.
    async fn clone_ref(&self, url: &str, reference: Option<&str>, dest: &Path) -> Result<()>;

    /// Fully clones `url` into `dest` and checks out `commit`.
    async fn clone_commit(&self, url: &str, commit: &str, dest: &Path) -> Result<()>;

    /// Short names of every branch and tag on the remote.
    async fn list_refs(&self, url: &str) -> Result<Vec<String>>;

    /// Clones `branch` of `url` into `dest`, or brings an existing checkout
    /// there up to date with the remote branch, discarding local changes.
    async fn clone_or_pull(&self, url: &str, branch: &str, dest: &Path) -> Result<()>;

    /// The `origin` URL of the checkout at `dir`, or `None` when `dir` is not
    /// a git checkout.
    async fn remote_url(&self, dir: &Path) -> Result<Option<String>>;
}

/// [`RepoCloner`] backed by the system `git` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl GitCli {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RepoCloner for GitCli {
    async fn clone_ref(&self, url: &str, reference: Option<&str>, dest: &Path) -> Result<()> {
        GitCommand::clone(url, dest, reference, true)
            .with_context(format!("Cloning template repository {url}"))
            .execute_success()
            .await
    }

    async fn clone_commit(&self, url: &str, commit: &str, dest: &Path) -> Result<()> {
        GitCommand::clone(url, dest, None, false)
            .with_context(format!("Cloning template repository {url}"))
            .execute_success()
            .await?;
        GitCommand::checkout(commit).current_dir(dest).execute_success().await
    }

    async fn list_refs(&self, url: &str) -> Result<Vec<String>> {
        let output = GitCommand::ls_remote(url).execute_stdout().await?;
        Ok(parse_ls_remote(&output))
    }

    async fn clone_or_pull(&self, url: &str, branch: &str, dest: &Path) -> Result<()> {
        if !dest.join(GIT_DIR).exists() {
            tracing::debug!(target: "git", url, branch, dest = %dest.display(), "Cloning template cache");
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            return GitCommand::clone(url, dest, Some(branch), true)
                .with_context("Populating template cache")
                .execute_success()
                .await;
        }

        tracing::debug!(target: "git", url, branch, dest = %dest.display(), "Refreshing template cache");
        // Files once ignored and later committed can leave a dirty tree, so
        // reset before and after fetching.
        GitCommand::reset_hard("HEAD").current_dir(dest).execute_success().await?;
        GitCommand::fetch_branch(branch).current_dir(dest).execute_success().await?;
        GitCommand::reset_hard("FETCH_HEAD").current_dir(dest).execute_success().await
    }

    async fn remote_url(&self, dir: &Path) -> Result<Option<String>> {
        if !dir.join(GIT_DIR).exists() {
            return Ok(None);
        }
        match GitCommand::remote_url().current_dir(dir).execute_stdout().await {
            Ok(url) => Ok(Some(url)),
            Err(e) => {
                // A checkout without an origin is as good as no checkout
                if matches!(e.downcast_ref::<IacpmError>(), Some(IacpmError::GitCommandError { .. })) {
                    Ok(None)
                } else {
                    Err(e)
                }
            }
        }
    }
}

/// Short branch and tag names from `git ls-remote --heads --tags` output.
/// Peeled tag entries (`^{}`) are dropped.
#[must_use]
pub fn parse_ls_remote(output: &str) -> Vec<String> {
    let mut refs: Vec<String> = output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter(|name| !name.ends_with("^{}"))
        .filter_map(|name| {
            name.strip_prefix("refs/heads/").or_else(|| name.strip_prefix("refs/tags/"))
        })
        .map(str::to_string)
        .collect();
    refs.dedup();
    refs
}

/// Splits a template URL into the repository to clone and the path within it.
///
/// Only `https://` and `ssh://` URLs are accepted. A URL whose path contains
/// `.git` is cut right after the last `.git`; otherwise the first two path
/// components are taken as owner and repository.
pub fn parse_git_repo_url(raw: &str) -> Result<GitRepoUrl> {
    let invalid = |reason: &str| IacpmError::InvalidGitUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let (scheme, rest) = raw.split_once("://").ok_or_else(|| invalid("missing URL scheme"))?;
    if scheme != "https" && scheme != "ssh" {
        return Err(invalid(&format!("unsupported URL scheme: {scheme}")).into());
    }

    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
    if host.is_empty() {
        return Err(invalid("missing host").into());
    }
    let path = path.trim_start_matches('/');

    if let Some(loc) = path.rfind(".git") {
        let end = loc + ".git".len();
        // Only a whole component counts, not e.g. ".github"
        if path[end..].is_empty() || path[end..].starts_with('/') {
            return Ok(GitRepoUrl {
                url: format!("{scheme}://{host}/{}", &path[..end]),
                path: path[end..].trim_matches('/').to_string(),
            });
        }
    }

    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() < 2 {
        return Err(invalid("expected an owner and a repository").into());
    }
    let owner = parts[0];
    if owner.is_empty() {
        return Err(invalid("no owner").into());
    }
    let repo = parts[1];
    if repo.is_empty() {
        return Err(invalid("no repository").into());
    }

    Ok(GitRepoUrl {
        url: format!("{scheme}://{host}/{owner}/{repo}.git"),
        path: parts[2..].join("/").trim_end_matches('/').to_string(),
    })
}

/// Works out which ref to check out and which sub-directory holds the template.
///
/// A path starting with `tree/<sha>` selects that commit. `tree/<name...>`
/// selects the longest remote branch or tag that prefixes the rest of the
/// path, which requires listing the remote refs. Any other path is a
/// sub-directory of the remote HEAD.
pub async fn resolve_git_ref(
    cloner: &dyn RepoCloner,
    repo: &GitRepoUrl,
) -> Result<(GitRef, String)> {
    let invalid = || IacpmError::InvalidGitUrl {
        url: repo.url.clone(),
        reason: format!("cannot resolve path '{}'", repo.path),
    };

    let path = repo.path.trim_matches('/');
    if path.is_empty() {
        return Ok((GitRef::Head, String::new()));
    }

    let parts: Vec<&str> = path.split('/').collect();
    if parts.iter().any(|p| *p == "." || *p == "..") {
        return Err(invalid().into());
    }

    if parts[0] != "tree" {
        return Ok((GitRef::Head, parts.join("/")));
    }
    if parts.len() < 2 {
        return Err(invalid().into());
    }
    if COMMIT_SHA.is_match(parts[1]) {
        return Ok((GitRef::Commit(parts[1].to_string()), parts[2..].join("/")));
    }

    let mut refs = cloner
        .list_refs(&repo.url)
        .await
        .with_context(|| format!("Failed to list branches and tags of {}", repo.url))?;
    refs.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let rest = format!("{}/", parts[1..].join("/"));
    for name in refs {
        if let Some(sub_dir) = rest.strip_prefix(&format!("{name}/")) {
            return Ok((GitRef::Named(name), sub_dir.trim_end_matches('/').to_string()));
        }
    }
    Err(invalid().into())
}

/// Clones the repository a template URL points at into `dest` and returns the
/// template directory inside it, which must exist and be a directory.
pub async fn retrieve_git_folder(
    cloner: &dyn RepoCloner,
    raw_url: &str,
    dest: &Path,
) -> Result<std::path::PathBuf> {
    let repo = parse_git_repo_url(raw_url)?;
    let (reference, sub_dir) = resolve_git_ref(cloner, &repo).await?;
    tracing::debug!(target: "git", url = %repo.url, reference = ?reference, sub_dir = %sub_dir, "Retrieving template folder");

    match &reference {
        GitRef::Head => cloner.clone_ref(&repo.url, None, dest).await?,
        GitRef::Named(name) => cloner.clone_ref(&repo.url, Some(name), dest).await?,
        GitRef::Commit(sha) => cloner.clone_commit(&repo.url, sha, dest).await?,
    }

    let full_path = sub_dir.split('/').filter(|p| !p.is_empty()).fold(dest.to_path_buf(), |acc, p| acc.join(p));
    let metadata = tokio::fs::metadata(&full_path)
        .await
        .with_context(|| format!("Template directory not found: {}", full_path.display()))?;
    if !metadata.is_dir() {
        return Err(IacpmError::NotADirectory {
            path: full_path.display().to_string(),
        }
        .into());
    }
    Ok(full_path)
}
