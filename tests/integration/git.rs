//! `GitCli` against real repositories served over `file://`.
//!
//! Skipped when no `git` binary is available.

use anyhow::Result;
use iacpm_cli::git::{GitCli, GitRef, RepoCloner, parse_git_repo_url, resolve_git_ref};
use iacpm_cli::test_utils::{TestGit, git_available};
use tempfile::TempDir;

fn upstream(temp: &TempDir) -> Result<TestGit> {
    let repo = TestGit::new(temp.path().join("upstream"));
    repo.init("master")?;
    repo.write("aws-go/Iacpm.yaml", "name: ${PROJECT}\n")?;
    repo.commit_all("Initial templates")?;
    Ok(repo)
}

#[tokio::test]
async fn test_clone_or_pull_tracks_upstream() -> Result<()> {
    if !git_available() {
        return Ok(());
    }
    let temp = TempDir::new()?;
    let repo = upstream(&temp)?;
    let cache = temp.path().join("cache");
    let cli = GitCli::new();

    cli.clone_or_pull(&repo.url(), "master", &cache).await?;
    assert!(cache.join("aws-go/Iacpm.yaml").is_file());
    assert_eq!(cli.remote_url(&cache).await?, Some(repo.url()));

    repo.write("typescript/Iacpm.yaml", "name: ${PROJECT}\n")?;
    repo.commit_all("Add typescript")?;
    // Local edits are discarded by the refresh
    std::fs::write(cache.join("aws-go/Iacpm.yaml"), "local edit")?;

    cli.clone_or_pull(&repo.url(), "master", &cache).await?;
    assert!(cache.join("typescript/Iacpm.yaml").is_file());
    assert_eq!(std::fs::read_to_string(cache.join("aws-go/Iacpm.yaml"))?, "name: ${PROJECT}\n");
    Ok(())
}

#[tokio::test]
async fn test_remote_url_of_plain_directory() -> Result<()> {
    if !git_available() {
        return Ok(());
    }
    let temp = TempDir::new()?;
    assert_eq!(GitCli::new().remote_url(temp.path()).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_list_refs_and_clone_branch() -> Result<()> {
    if !git_available() {
        return Ok(());
    }
    let temp = TempDir::new()?;
    let repo = upstream(&temp)?;
    repo.tag("v1.0.0")?;
    repo.create_branch("feature/x")?;
    repo.write("aws-go/main.go", "package main\n")?;
    repo.commit_all("Feature work")?;
    repo.checkout("master")?;

    let cli = GitCli::new();
    let mut refs = cli.list_refs(&repo.url()).await?;
    refs.sort();
    assert_eq!(refs, vec!["feature/x", "master", "v1.0.0"]);

    let dest = temp.path().join("clone");
    cli.clone_ref(&repo.url(), Some("feature/x"), &dest).await?;
    assert!(dest.join("aws-go/main.go").is_file());
    Ok(())
}

#[tokio::test]
async fn test_clone_commit() -> Result<()> {
    if !git_available() {
        return Ok(());
    }
    let temp = TempDir::new()?;
    let repo = upstream(&temp)?;
    let first = repo.head()?;
    repo.write("later.txt", "later")?;
    repo.commit_all("Later")?;

    let dest = temp.path().join("clone");
    GitCli::new().clone_commit(&repo.url(), &first, &dest).await?;
    assert!(dest.join("aws-go/Iacpm.yaml").is_file());
    assert!(!dest.join("later.txt").exists());
    Ok(())
}

#[tokio::test]
async fn test_resolve_ref_prefers_longest_ref() -> Result<()> {
    if !git_available() {
        return Ok(());
    }
    let temp = TempDir::new()?;
    let repo = upstream(&temp)?;
    // A branch and a tag can nest where two branches could not
    repo.create_branch("release")?;
    repo.tag("release/2024")?;
    repo.checkout("master")?;

    // file:// URLs have no owner/repo shape, so build the split by hand
    let parsed = iacpm_cli::git::GitRepoUrl {
        url: repo.url(),
        path: "tree/release/2024/aws-go".to_string(),
    };
    let (reference, sub_dir) = resolve_git_ref(&GitCli::new(), &parsed).await?;
    assert_eq!(reference, GitRef::Named("release/2024".to_string()));
    assert_eq!(sub_dir, "aws-go");

    assert!(parse_git_repo_url("file:///tmp/repo").is_err());
    Ok(())
}
