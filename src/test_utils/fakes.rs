//! In-process stand-ins for the network seams.
//!
//! [`FakeTransport`] serves canned HTTP responses and records every request.
//! [`FakeCloner`] "clones" by copying fixture directories. Both count calls
//! so tests can assert that an operation did no network I/O at all.

use crate::core::IacpmError;
use crate::git::RepoCloner;
use crate::source::{HttpRequest, HttpResponse, HttpTransport};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

/// Canned HTTP responses keyed by exact URL. Unknown URLs get an empty 404.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, std::result::Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `response` for `url`, replacing any earlier setting.
    pub fn respond(&self, url: &str, response: HttpResponse) {
        self.responses.lock().unwrap().insert(url.to_string(), Ok(response));
    }

    /// Makes requests to `url` fail before any response, like a reset connection.
    pub fn fail(&self, url: &str, reason: &str) {
        self.responses.lock().unwrap().insert(url.to_string(), Err(reason.to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().get(&url) {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(reason)) => Err(IacpmError::Transport {
                url,
                reason: reason.clone(),
            }
            .into()),
            None => Ok(HttpResponse::new(404, Vec::new())),
        }
    }
}

/// Marker file standing in for `git remote get-url origin`.
const ORIGIN_FILE: &str = "origin";

/// Clones by copying a fixture directory registered for the repository URL.
///
/// Populated destinations get a `.git/origin` file so [`RepoCloner::remote_url`]
/// reports where they came from. Only the network-facing operations are counted.
#[derive(Default)]
pub struct FakeCloner {
    repos: HashMap<String, PathBuf>,
    refs: HashMap<String, Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCloner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `fixture` as the contents of `url`.
    #[must_use]
    pub fn with_repo(mut self, url: &str, fixture: &Path) -> Self {
        self.repos.insert(url.to_string(), fixture.to_path_buf());
        self
    }

    /// Branch and tag names reported for `url`.
    #[must_use]
    pub fn with_refs(mut self, url: &str, refs: &[&str]) -> Self {
        self.refs.insert(url.to_string(), refs.iter().map(|r| (*r).to_string()).collect());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Operations performed, as `"<operation> <url>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &str, url: &str) {
        self.calls.lock().unwrap().push(format!("{operation} {url}"));
    }

    fn populate(&self, url: &str, dest: &Path) -> Result<()> {
        let fixture = self.repos.get(url).ok_or_else(|| IacpmError::GitCloneFailed {
            url: url.to_string(),
            reason: "repository not found".to_string(),
        })?;
        copy_tree(fixture, dest)?;
        let git_dir = dest.join(".git");
        std::fs::create_dir_all(&git_dir)?;
        std::fs::write(git_dir.join(ORIGIN_FILE), url)?;
        Ok(())
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(from)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy fixture file {}", entry.path().display()))?;
        }
    }
    Ok(())
}

#[async_trait]
impl RepoCloner for FakeCloner {
    async fn clone_ref(&self, url: &str, _reference: Option<&str>, dest: &Path) -> Result<()> {
        self.record("clone", url);
        self.populate(url, dest)
    }

    async fn clone_commit(&self, url: &str, _commit: &str, dest: &Path) -> Result<()> {
        self.record("clone-commit", url);
        self.populate(url, dest)
    }

    async fn list_refs(&self, url: &str) -> Result<Vec<String>> {
        self.record("ls-remote", url);
        Ok(self.refs.get(url).cloned().unwrap_or_default())
    }

    async fn clone_or_pull(&self, url: &str, _branch: &str, dest: &Path) -> Result<()> {
        self.record("clone-or-pull", url);
        self.populate(url, dest)
    }

    async fn remote_url(&self, dir: &Path) -> Result<Option<String>> {
        match std::fs::read_to_string(dir.join(".git").join(ORIGIN_FILE)) {
            Ok(url) => Ok(Some(url)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
