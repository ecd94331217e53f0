//! Plugin installs against a fake plugin server: reuse, overwrite, conflicts,
//! crash recovery and concurrent installs of one identity.

use crate::common::{asset_url, entries, manager, serve_plugin, spec};
use anyhow::Result;
use iacpm_cli::archive::ArchiveFormat;
use iacpm_cli::core::{ErrorKind, error_kind};
use iacpm_cli::plugin::{InstallRequest, PluginKind, has_plugin};
use iacpm_cli::source::HttpResponse;
use iacpm_cli::test_utils::FakeTransport;
use semver::VersionReq;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_install_then_reuse_without_download() -> Result<()> {
    iacpm_cli::test_utils::init_test_logging(None);
    let temp = TempDir::new()?;
    let transport = Arc::new(FakeTransport::new());
    serve_plugin(&transport, "aws", "6.1.0", "first");
    let manager = manager(temp.path(), transport.clone());

    let installed = manager.ensure_installed(&spec("aws", "6.1.0"), false).await?;
    assert_eq!(installed.dir_name, "resource-aws-v6.1.0");
    assert_eq!(std::fs::read_to_string(installed.dir().join("iacpm-resource-aws"))?, "first");
    assert!(installed.dir().join("docs/README.md").is_file());
    assert_eq!(transport.call_count(), 1);

    // Present and complete: no second download
    let again = manager.ensure_installed(&spec("aws", "6.1.0"), false).await?;
    assert_eq!(again.dir(), installed.dir());
    assert_eq!(transport.call_count(), 1);

    assert_eq!(entries(temp.path()), vec!["resource-aws-v6.1.0"]);
    Ok(())
}

#[tokio::test]
async fn test_overwrite_replaces_contents() -> Result<()> {
    let temp = TempDir::new()?;
    let transport = Arc::new(FakeTransport::new());
    serve_plugin(&transport, "aws", "6.1.0", "old");
    let manager = manager(temp.path(), transport.clone());
    manager.ensure_installed(&spec("aws", "6.1.0"), false).await?;

    serve_plugin(&transport, "aws", "6.1.0", "new");
    let installed = manager.ensure_installed(&spec("aws", "6.1.0"), true).await?;

    assert_eq!(std::fs::read_to_string(installed.dir().join("iacpm-resource-aws"))?, "new");
    assert_eq!(transport.call_count(), 2);
    assert_eq!(entries(temp.path()), vec!["resource-aws-v6.1.0"]);
    Ok(())
}

#[tokio::test]
async fn test_protocol_conflict_leaves_existing_install() -> Result<()> {
    let temp = TempDir::new()?;
    let transport = Arc::new(FakeTransport::new());
    serve_plugin(&transport, "aws", "6.1.0", "original");
    let manager = manager(temp.path(), transport);
    let installed = manager.ensure_installed(&spec("aws", "6.1.0"), false).await?;

    let archive = crate::common::plugin_archive("aws", "intruder");
    let err = InstallRequest::new(temp.path(), &spec("aws", "6.1.0"))?
        .lock()
        .await?
        .stage(Cursor::new(archive), ArchiveFormat::TarGz)
        .await
        .unwrap_err();

    assert_eq!(error_kind(&err), Some(ErrorKind::Conflict));
    assert_eq!(std::fs::read_to_string(installed.dir().join("iacpm-resource-aws"))?, "original");
    assert_eq!(entries(temp.path()), vec!["resource-aws-v6.1.0"]);
    Ok(())
}

#[tokio::test]
async fn test_interrupted_install_is_invisible_and_recovered() -> Result<()> {
    let temp = TempDir::new()?;
    let aws = spec("aws", "6.1.0");

    // Stage, then "crash" before publishing
    let staged = InstallRequest::new(temp.path(), &aws)?
        .lock()
        .await?
        .stage(Cursor::new(crate::common::plugin_archive("aws", "lost")), ArchiveFormat::TarGz)
        .await?;
    let staging = staged.staging_dir().to_path_buf();
    std::mem::forget(staged);

    assert!(staging.is_dir());
    assert!(temp.path().join("resource-aws-v6.1.0.partial").exists());
    assert!(!has_plugin(temp.path(), &aws)?);

    // A crashed process releases its lock; simulate that before retrying
    std::fs::remove_file(temp.path().join("resource-aws-v6.1.0.lock"))?;

    let transport = Arc::new(FakeTransport::new());
    serve_plugin(&transport, "aws", "6.1.0", "recovered");
    let manager = manager(temp.path(), transport);
    assert!(manager.list(true)?.is_empty());

    let installed = manager.ensure_installed(&aws, false).await?;
    assert_eq!(std::fs::read_to_string(installed.dir().join("iacpm-resource-aws"))?, "recovered");
    assert!(!staging.exists());
    assert_eq!(entries(temp.path()), vec!["resource-aws-v6.1.0"]);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_installs_of_one_identity() -> Result<()> {
    let temp = TempDir::new()?;
    let transport = Arc::new(FakeTransport::new());
    serve_plugin(&transport, "aws", "6.1.0", "payload");
    let manager = Arc::new(manager(temp.path(), transport));

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            // Alternate so both the reuse path and the replace path race
            manager.ensure_installed(&spec("aws", "6.1.0"), i % 2 == 0).await
        }));
    }
    for handle in handles {
        let installed = handle.await??;
        assert_eq!(installed.dir_name, "resource-aws-v6.1.0");
    }

    let dir = temp.path().join("resource-aws-v6.1.0");
    assert_eq!(std::fs::read_to_string(dir.join("iacpm-resource-aws"))?, "payload");
    assert_eq!(entries(temp.path()), vec!["resource-aws-v6.1.0"]);
    Ok(())
}

#[tokio::test]
async fn test_remove_and_find() -> Result<()> {
    let temp = TempDir::new()?;
    let transport = Arc::new(FakeTransport::new());
    serve_plugin(&transport, "aws", "6.0.0", "a");
    serve_plugin(&transport, "aws", "6.1.0", "b");
    let manager = manager(temp.path(), transport);

    manager
        .ensure_all_installed(&[spec("aws", "6.0.0"), spec("aws", "6.1.0")], false)
        .await?;
    let found = manager.find(PluginKind::Resource, "aws", &VersionReq::parse("^6")?)?;
    assert_eq!(found.map(|p| p.version.to_string()), Some("6.1.0".to_string()));

    manager.remove(&spec("aws", "6.1.0")).await?;
    let found = manager.find(PluginKind::Resource, "aws", &VersionReq::parse("^6")?)?;
    assert_eq!(found.map(|p| p.version.to_string()), Some("6.0.0".to_string()));

    // Removing something absent is fine
    manager.remove(&spec("aws", "6.1.0")).await?;
    assert_eq!(entries(temp.path()), vec!["resource-aws-v6.0.0"]);
    Ok(())
}

#[tokio::test]
async fn test_list_with_metadata() -> Result<()> {
    let temp = TempDir::new()?;
    let transport = Arc::new(FakeTransport::new());
    serve_plugin(&transport, "aws", "6.1.0", "12345");
    let manager = manager(temp.path(), transport);
    manager.ensure_installed(&spec("aws", "6.1.0"), false).await?;

    let plugins = manager.list(false)?;
    assert_eq!(plugins.len(), 1);
    let metadata = plugins[0].metadata.as_ref().expect("metadata requested");
    assert_eq!(metadata.size_bytes, 5 + "# plugin\n".len() as u64);
    assert!(metadata.install_time.is_some());

    assert!(manager.list(true)?[0].metadata.is_none());
    Ok(())
}

#[tokio::test]
async fn test_missing_artifact_and_checksum_mismatch() -> Result<()> {
    let temp = TempDir::new()?;
    let transport = Arc::new(FakeTransport::new());
    let manager = manager(temp.path(), transport.clone());

    let err = manager.ensure_installed(&spec("gcp", "7.0.0"), false).await.unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::NotFound));

    serve_plugin(&transport, "aws", "6.1.0", "payload");
    let pinned = spec("aws", "6.1.0").with_checksum("linux-amd64", "00".repeat(32));
    let err = manager.ensure_installed(&pinned, false).await.unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::InvalidArchive));

    assert!(!temp.path().join("resource-aws-v6.1.0").exists());
    Ok(())
}

#[tokio::test]
async fn test_server_error_surfaces_status() -> Result<()> {
    let temp = TempDir::new()?;
    let transport = Arc::new(FakeTransport::new());
    transport.respond(&asset_url("aws", "6.1.0"), HttpResponse::new(503, "maintenance"));
    let manager = manager(temp.path(), transport);

    let err = manager.ensure_installed(&spec("aws", "6.1.0"), false).await.unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Transport));
    assert!(format!("{err:#}").contains("503"));
    assert!(!temp.path().join("resource-aws-v6.1.0").exists());
    Ok(())
}
