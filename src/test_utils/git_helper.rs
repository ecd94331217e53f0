//! Builds real git repositories on disk for tests of the `git` integration.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Thin wrapper running `git` in one repository directory.
pub struct TestGit {
    repo_path: PathBuf,
}

impl TestGit {
    fn run(&self, args: &[&str], action: &str) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_AUTHOR_NAME", "Test User")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test User")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .output()
            .with_context(|| action.to_string())?;

        if !output.status.success() {
            bail!("{} failed: {}", action, String::from_utf8_lossy(&output.stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Creates the directory and initializes a repository on `branch` with a
    /// test identity.
    pub fn init(&self, branch: &str) -> Result<()> {
        std::fs::create_dir_all(&self.repo_path)?;
        self.run(&["init"], "Failed to initialize git repository")?;
        self.run(&["symbolic-ref", "HEAD", &format!("refs/heads/{branch}")], "Failed to set HEAD")?;
        self.run(&["config", "user.email", "test@iacpm.example"], "Failed to configure git user email")?;
        self.run(&["config", "user.name", "Test User"], "Failed to configure git user name")?;
        self.run(&["config", "commit.gpgsign", "false"], "Failed to disable signing")?;
        Ok(())
    }

    /// Writes `contents` to `relative` inside the repository.
    pub fn write(&self, relative: &str, contents: &str) -> Result<()> {
        let path = self.repo_path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Stages everything and commits; returns the new HEAD.
    pub fn commit_all(&self, message: &str) -> Result<String> {
        self.run(&["add", "-A"], "Failed to add files to git")?;
        self.run(&["commit", "-m", message], "Failed to create git commit")?;
        self.head()
    }

    pub fn tag(&self, name: &str) -> Result<()> {
        self.run(&["tag", name], &format!("Failed to create tag: {name}"))?;
        Ok(())
    }

    pub fn create_branch(&self, name: &str) -> Result<()> {
        self.run(&["checkout", "-b", name], &format!("Failed to create branch: {name}"))?;
        Ok(())
    }

    pub fn checkout(&self, name: &str) -> Result<()> {
        self.run(&["checkout", name], &format!("Failed to checkout: {name}"))?;
        Ok(())
    }

    pub fn head(&self) -> Result<String> {
        self.run(&["rev-parse", "HEAD"], "Failed to get current commit SHA")
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// `file://` URL for cloning this repository.
    pub fn url(&self) -> String {
        format!("file://{}", self.repo_path.display())
    }
}
