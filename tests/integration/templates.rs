//! Template retrieval end to end: the bare-name cache, git folder URLs, zip
//! URLs and offline mode, all against counting fakes.

use crate::common::{entries, write_template};
use anyhow::Result;
use iacpm_cli::config::TemplateCacheSettings;
use iacpm_cli::constants::CLOUD_SIGNATURE_HEADER;
use iacpm_cli::core::{ErrorKind, IacpmError, error_kind, find_iacpm_error};
use iacpm_cli::source::HttpResponse;
use iacpm_cli::template::{
    TemplateKind, TemplateResolver, copy_template_files, copy_template_files_dry_run,
};
use iacpm_cli::test_utils::{FakeCloner, FakeTransport, build_zip};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const REPO: &str = "https://github.com/iacpm/templates.git";

fn cache(dir: &Path) -> TemplateCacheSettings {
    TemplateCacheSettings {
        dir: dir.to_path_buf(),
        repository: REPO.to_string(),
        branch: "master".to_string(),
    }
}

fn resolver(
    cache_dir: &Path,
    transport: Arc<FakeTransport>,
    cloner: Arc<FakeCloner>,
) -> TemplateResolver {
    TemplateResolver::new(transport, cloner, cache(cache_dir), cache(&cache_dir.with_extension("policy")))
}

/// A template repository fixture holding `aws-go`, `aws-python` and `typescript`.
fn fixture_repo(dir: &Path) {
    write_template(&dir.join("aws-go"), "AWS in Go");
    write_template(&dir.join("aws-python"), "AWS in Python");
    write_template(&dir.join("typescript"), "Plain TypeScript");
}

#[tokio::test]
async fn test_named_template_from_cache() -> Result<()> {
    iacpm_cli::test_utils::init_test_logging(None);
    let temp = TempDir::new()?;
    let fixture = temp.path().join("fixture");
    fixture_repo(&fixture);
    let cache_dir = temp.path().join("templates");

    let cloner = Arc::new(FakeCloner::new().with_repo(REPO, &fixture));
    let resolver = resolver(&cache_dir, Arc::new(FakeTransport::new()), cloner.clone());

    let repo = resolver.resolve("TypeScript", false, TemplateKind::Project).await?;
    assert_eq!(repo.root, cache_dir);
    assert_eq!(repo.sub_directory, cache_dir.join("typescript"));
    assert!(!repo.should_delete);
    assert_eq!(cloner.calls(), vec![format!("clone-or-pull {REPO}")]);

    let templates = repo.templates()?;
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].name, "typescript");
    assert_eq!(templates[0].description, "Plain TypeScript");

    // The shared cache survives delete
    repo.delete()?;
    assert!(cache_dir.join("typescript").is_dir());
    Ok(())
}

#[tokio::test]
async fn test_offline_does_no_network_io() -> Result<()> {
    let temp = TempDir::new()?;
    let fixture = temp.path().join("fixture");
    fixture_repo(&fixture);
    let cache_dir = temp.path().join("templates");

    // Populate the cache once while online
    let cloner = Arc::new(FakeCloner::new().with_repo(REPO, &fixture));
    let transport = Arc::new(FakeTransport::new());
    resolver(&cache_dir, transport.clone(), cloner.clone())
        .resolve("", false, TemplateKind::Project)
        .await?;

    let cloner = Arc::new(FakeCloner::new());
    let transport = Arc::new(FakeTransport::new());
    let resolver = resolver(&cache_dir, transport.clone(), cloner.clone());

    let repo = resolver.resolve("aws-go", true, TemplateKind::Project).await?;
    assert_eq!(repo.sub_directory, cache_dir.join("aws-go"));

    let listing = resolver.resolve("", true, TemplateKind::Project).await?;
    let names: Vec<String> = listing.templates()?.into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["aws-go", "aws-python", "typescript"]);

    let err = resolver
        .resolve("https://example.com/t.zip", true, TemplateKind::Project)
        .await
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Unavailable));

    assert_eq!(cloner.call_count(), 0);
    assert_eq!(transport.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_unknown_name_suggests_close_matches() -> Result<()> {
    let temp = TempDir::new()?;
    let fixture = temp.path().join("fixture");
    fixture_repo(&fixture);
    let cloner = Arc::new(FakeCloner::new().with_repo(REPO, &fixture));
    let resolver = resolver(&temp.path().join("templates"), Arc::new(FakeTransport::new()), cloner);

    let err = resolver.resolve("aws-goo", false, TemplateKind::Project).await.unwrap_err();
    match find_iacpm_error(&err) {
        Some(IacpmError::TemplateNotFound {
            name,
            suggestions,
        }) => {
            assert_eq!(name, "aws-goo");
            assert_eq!(suggestions, &vec!["aws-go".to_string()]);
        }
        other => panic!("expected TemplateNotFound, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_stale_cache_is_replaced() -> Result<()> {
    let temp = TempDir::new()?;
    let fixture = temp.path().join("fixture");
    fixture_repo(&fixture);
    let cache_dir = temp.path().join("templates");

    // A leftover from an older layout: no checkout, just files
    std::fs::create_dir_all(cache_dir.join("old-template"))?;
    std::fs::write(cache_dir.join("old-template/Iacpm.yaml"), "name: old\n")?;

    let cloner = Arc::new(FakeCloner::new().with_repo(REPO, &fixture));
    let repo = resolver(&cache_dir, Arc::new(FakeTransport::new()), cloner)
        .resolve("", false, TemplateKind::Project)
        .await?;

    assert!(!cache_dir.join("old-template").exists());
    assert_eq!(repo.templates()?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_git_folder_url() -> Result<()> {
    let temp = TempDir::new()?;
    let fixture = temp.path().join("fixture");
    write_template(&fixture.join("main/examples/minimal"), "Minimal example");

    let cloner = Arc::new(FakeCloner::new().with_repo("https://example.com/archive/tree.git", &fixture));
    let resolver = resolver(&temp.path().join("templates"), Arc::new(FakeTransport::new()), cloner);

    let repo = resolver
        .resolve("https://example.com/archive/tree/main/examples/minimal", false, TemplateKind::Project)
        .await?;
    assert!(repo.should_delete);
    assert!(repo.sub_directory.ends_with("main/examples/minimal"));
    assert_eq!(repo.templates()?[0].description, "Minimal example");

    let root = repo.root.clone();
    repo.delete()?;
    assert!(!root.exists());
    Ok(())
}

#[tokio::test]
async fn test_git_url_to_a_file_is_not_a_directory() -> Result<()> {
    let temp = TempDir::new()?;
    let fixture = temp.path().join("fixture");
    write_template(&fixture, "Root template");

    let url = "https://github.com/acme/templates";
    let cloner = Arc::new(
        FakeCloner::new()
            .with_repo("https://github.com/acme/templates.git", &fixture)
            .with_refs("https://github.com/acme/templates.git", &["main"]),
    );
    let resolver = resolver(&temp.path().join("templates"), Arc::new(FakeTransport::new()), cloner);

    let err = resolver
        .resolve(&format!("{url}/tree/main/main.txt"), false, TemplateKind::Project)
        .await
        .unwrap_err();
    assert!(matches!(find_iacpm_error(&err), Some(IacpmError::NotADirectory { .. })));
    Ok(())
}

#[tokio::test]
async fn test_zip_url() -> Result<()> {
    let temp = TempDir::new()?;
    let url = "https://templates.example.com/aws-go.zip?token=abc";
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
        url,
        HttpResponse::new(
            200,
            build_zip(&[
                ("aws-go-main/", None),
                ("aws-go-main/Iacpm.yaml", Some(b"name: ${PROJECT}\n".as_slice())),
                ("aws-go-main/main.go", Some(b"package main // ${PROJECT}\n".as_slice())),
            ]),
        ),
    );
    let resolver = resolver(&temp.path().join("templates"), transport.clone(), Arc::new(FakeCloner::new()));

    let repo = resolver.resolve(url, false, TemplateKind::Project).await?;
    assert!(repo.should_delete);
    assert!(repo.sub_directory.ends_with("aws-go-main"));

    let dest = temp.path().join("project");
    copy_template_files(&repo.sub_directory, &dest, false, "billing", "")?;
    assert_eq!(std::fs::read_to_string(dest.join("main.go"))?, "package main // billing\n");

    repo.delete()?;
    assert!(!repo.root.exists());
    assert_eq!(transport.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_zip_errors() -> Result<()> {
    let temp = TempDir::new()?;
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
        "https://cloud.example.com/t.zip",
        HttpResponse::new(401, "nope").with_header(CLOUD_SIGNATURE_HEADER, "1"),
    );
    transport.respond("https://plain.example.com/t.zip", HttpResponse::new(401, "nope"));
    transport.respond(
        "https://empty.example.com/t.zip",
        HttpResponse::new(200, build_zip(&[("README.md", Some(b"no manifest".as_slice()))])),
    );
    let resolver = resolver(&temp.path().join("templates"), transport, Arc::new(FakeCloner::new()));

    let err = resolver
        .resolve("https://cloud.example.com/t.zip", false, TemplateKind::Project)
        .await
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Unauthorized));

    let err = resolver
        .resolve("https://plain.example.com/t.zip", false, TemplateKind::Project)
        .await
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Transport));

    let err = resolver
        .resolve("https://empty.example.com/t.zip", false, TemplateKind::Project)
        .await
        .unwrap_err();
    assert!(matches!(find_iacpm_error(&err), Some(IacpmError::MissingManifest { .. })));
    Ok(())
}

#[test]
fn test_copy_without_force_keeps_existing_files() -> Result<()> {
    let temp = TempDir::new()?;
    let template = temp.path().join("template");
    write_template(&template, "t");
    let dest = temp.path().join("project");
    std::fs::create_dir_all(&dest)?;
    std::fs::write(dest.join("main.txt"), "mine")?;

    let err = copy_template_files_dry_run(&template, &dest, "demo").unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Conflict));
    // The dry run wrote nothing
    assert_eq!(entries(&dest), vec!["main.txt"]);

    let err = copy_template_files(&template, &dest, false, "demo", "d").unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Conflict));
    assert_eq!(std::fs::read_to_string(dest.join("main.txt"))?, "mine");

    copy_template_files(&template, &dest, true, "demo", "a demo")?;
    assert_eq!(std::fs::read_to_string(dest.join("main.txt"))?, "project demo: a demo\n");
    Ok(())
}
