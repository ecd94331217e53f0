//! Fluent builder around the system `git` binary.
//!
//! Template retrieval needs a handful of git operations (clone, fetch, reset,
//! checkout, ls-remote). They all go through [`GitCommand`] so that timeouts,
//! logging and the mapping of failures onto [`IacpmError`] variants happen in
//! one place.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::constants::{GIT_CLONE_TIMEOUT, GIT_FETCH_TIMEOUT};
use crate::core::IacpmError;
use crate::utils::platform::get_git_command;

/// A git invocation under construction.
///
/// ```rust,no_run
/// use iacpm_cli::git::command_builder::GitCommand;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// GitCommand::clone("https://github.com/iacpm/templates.git", Path::new("/tmp/t"), Some("master"), true)
///     .with_context("Refreshing template cache")
///     .execute_success()
///     .await?;
///
/// let origin = GitCommand::remote_url().current_dir("/tmp/t").execute_stdout().await?;
/// # Ok(())
/// # }
/// ```
///
/// Commands run with `GIT_TERMINAL_PROMPT=0` so a missing credential fails
/// instead of hanging on a prompt nobody can answer.
#[derive(Debug, Clone)]
pub struct GitCommand {
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
    timeout_duration: Option<Duration>,
    context: Option<String>,
    /// Kept for clone failures, which are reported by URL
    clone_url: Option<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            env_vars: vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())],
            timeout_duration: Some(GIT_FETCH_TIMEOUT),
            context: None,
            clone_url: None,
        }
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl GitCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs git with `-C <dir>`.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// `None` disables the timeout.
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Label included in log lines for this command.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// The arguments passed to git, including `-C <dir>`.
    #[must_use]
    pub fn full_args(&self) -> Vec<String> {
        let mut full_args = Vec::with_capacity(self.args.len() + 2);
        if let Some(dir) = &self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.iter().cloned());
        full_args
    }

    pub async fn execute(self) -> Result<GitCommandOutput> {
        let start = std::time::Instant::now();
        let git_command = get_git_command();
        let full_args = self.full_args();
        let operation = self.args.first().cloned().unwrap_or_else(|| "unknown".to_string());

        tracing::debug!(
            target: "git",
            context = self.context.as_deref().unwrap_or(""),
            "Executing command: {} {}",
            git_command,
            full_args.join(" ")
        );

        let mut cmd = Command::new(git_command);
        cmd.args(&full_args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        // Dropping the future (cancellation, timeout) must not leave git running
        cmd.kill_on_drop(true);

        let output_future = cmd.output();
        let result = match self.timeout_duration {
            Some(duration) => match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(target: "git", "Command timed out after {}s: git {}", duration.as_secs(), full_args.join(" "));
                    return Err(IacpmError::GitCommandError {
                        operation,
                        stderr: format!(
                            "git command timed out after {} seconds; check network connectivity and credentials",
                            duration.as_secs()
                        ),
                    }
                    .into());
                }
            },
            None => output_future.await,
        };

        let output = match result {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IacpmError::GitNotFound.into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to execute git {}", full_args.join(" ")));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            tracing::debug!(target: "git", code = ?output.status.code(), stderr = %stderr.trim(), "Command failed");
            let reason = if stderr.trim().is_empty() { stdout } else { stderr };
            let error = match operation.as_str() {
                "clone" => IacpmError::GitCloneFailed {
                    url: self.clone_url.unwrap_or_else(|| "unknown".to_string()),
                    reason,
                },
                "checkout" => IacpmError::GitCheckoutFailed {
                    reference: self.args.get(1).cloned().unwrap_or_default(),
                    reason,
                },
                _ => IacpmError::GitCommandError {
                    operation,
                    stderr: reason,
                },
            };
            return Err(error.into());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(target: "git::perf", "Git {} took {:.2}s", operation, elapsed.as_secs_f64());
        } else {
            tracing::trace!(target: "git::perf", "Git {} took {}ms", operation, elapsed.as_millis());
        }

        Ok(GitCommandOutput {
            stdout,
            stderr,
        })
    }

    /// Runs the command and returns trimmed stdout.
    pub async fn execute_stdout(self) -> Result<String> {
        Ok(self.execute().await?.stdout.trim().to_string())
    }

    pub async fn execute_success(self) -> Result<()> {
        self.execute().await.map(|_| ())
    }
}

// Builders for the operations template retrieval needs

impl GitCommand {
    /// `git clone [--depth 1] [--branch <b> --single-branch] <url> <target>`
    pub fn clone(url: &str, target: &Path, branch: Option<&str>, shallow: bool) -> Self {
        let mut cmd = Self::new().arg("clone").with_timeout(Some(GIT_CLONE_TIMEOUT));
        if shallow {
            cmd = cmd.args(["--depth", "1"]);
        }
        if let Some(branch) = branch {
            cmd = cmd.args(["--branch", branch, "--single-branch"]);
        }
        cmd = cmd.arg(url).arg(target.display().to_string());
        cmd.clone_url = Some(url.to_string());
        cmd
    }

    /// `git fetch --depth 1 origin <branch>`
    pub fn fetch_branch(branch: &str) -> Self {
        Self::new().args(["fetch", "--depth", "1", "origin", branch])
    }

    /// `git reset --hard <target>`
    pub fn reset_hard(target: &str) -> Self {
        Self::new().args(["reset", "--hard", target])
    }

    /// `git checkout <reference>`
    pub fn checkout(reference: &str) -> Self {
        Self::new().args(["checkout", reference])
    }

    /// `git ls-remote --heads --tags <url>`
    pub fn ls_remote(url: &str) -> Self {
        Self::new().args(["ls-remote", "--heads", "--tags", url])
    }

    /// `git remote get-url origin`
    pub fn remote_url() -> Self {
        Self::new().args(["remote", "get-url", "origin"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_basic() {
        let cmd = GitCommand::new().arg("status").arg("--short");
        assert_eq!(cmd.full_args(), vec!["status", "--short"]);
    }

    #[test]
    fn test_current_dir_uses_dash_c() {
        let cmd = GitCommand::remote_url().current_dir("/tmp/repo");
        assert_eq!(cmd.full_args(), vec!["-C", "/tmp/repo", "remote", "get-url", "origin"]);
    }

    #[test]
    fn test_clone_builder() {
        let cmd = GitCommand::clone(
            "https://example.com/repo.git",
            Path::new("/tmp/target"),
            Some("main"),
            true,
        );
        assert_eq!(
            cmd.full_args(),
            vec![
                "clone",
                "--depth",
                "1",
                "--branch",
                "main",
                "--single-branch",
                "https://example.com/repo.git",
                "/tmp/target"
            ]
        );
        assert_eq!(cmd.clone_url.as_deref(), Some("https://example.com/repo.git"));
        assert_eq!(cmd.timeout_duration, Some(GIT_CLONE_TIMEOUT));
    }

    #[test]
    fn test_full_clone_builder() {
        let cmd = GitCommand::clone("https://example.com/repo.git", Path::new("/t"), None, false);
        assert_eq!(cmd.full_args(), vec!["clone", "https://example.com/repo.git", "/t"]);
    }

    #[tokio::test]
    async fn test_git_version() {
        if !crate::utils::platform::command_exists(get_git_command()) {
            return;
        }
        let output = GitCommand::new().arg("--version").execute_stdout().await.unwrap();
        assert!(output.starts_with("git version"));
    }

    #[tokio::test]
    async fn test_failed_command_maps_error() {
        if !crate::utils::platform::command_exists(get_git_command()) {
            return;
        }
        let temp = tempfile::TempDir::new().unwrap();
        let err = GitCommand::checkout("no-such-ref")
            .current_dir(temp.path())
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IacpmError>(),
            Some(IacpmError::GitCheckoutFailed { reference, .. }) if reference == "no-such-ref"
        ));
    }
}
