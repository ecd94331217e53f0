//! Malicious archives must never write outside their destination, and a
//! rejected plugin archive must leave no trace in the plugin root.

use crate::common::{asset_url, entries, manager, spec};
use anyhow::Result;
use iacpm_cli::archive::{ArchiveFormat, extract};
use iacpm_cli::core::{ErrorKind, error_kind};
use iacpm_cli::source::HttpResponse;
use iacpm_cli::test_utils::{FakeTransport, TarEntry, build_tar_gz, build_zip};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_traversal_plugin_archive_is_rejected() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path().join("plugins");
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
        &asset_url("aws", "6.1.0"),
        HttpResponse::new(
            200,
            build_tar_gz(&[
                TarEntry::file("iacpm-resource-aws", b"bin"),
                TarEntry::file("../../escaped.txt", b"gotcha"),
            ]),
        ),
    );
    let manager = manager(&root, transport);

    let err = manager.ensure_installed(&spec("aws", "6.1.0"), false).await.unwrap_err();

    assert_eq!(error_kind(&err), Some(ErrorKind::InvalidArchive));
    assert!(!temp.path().join("escaped.txt").exists());
    assert!(!root.join("escaped.txt").exists());
    // No final directory, no staging directory, no sentinel, no lock
    assert!(entries(&root).is_empty(), "leftovers: {:?}", entries(&root));
    Ok(())
}

#[test]
fn test_link_entries_are_rejected() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("out");
    let archive = build_tar_gz(&[TarEntry::symlink("passwd", "/etc/passwd")]);

    let err = extract(Cursor::new(archive), &dest, ArchiveFormat::TarGz).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::InvalidArchive));
    assert!(!dest.join("passwd").exists());
}

#[test]
fn test_zip_traversal_is_rejected() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("out");
    let archive = build_zip(&[
        ("Iacpm.yaml", Some(b"name: x\n".as_slice())),
        ("sub/../../outside.txt", Some(b"gotcha".as_slice())),
    ]);

    let err = extract(Cursor::new(archive), &dest, ArchiveFormat::Zip).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::InvalidArchive));
    assert!(!temp.path().join("outside.txt").exists());
}

#[test]
fn test_inner_parent_components_stay_inside() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("out");
    let archive = build_tar_gz(&[
        TarEntry::dir("a"),
        TarEntry::file("a/b/../c.txt", b"fine"),
        TarEntry::file("./d.txt", b"also fine"),
    ]);

    extract(Cursor::new(archive), &dest, ArchiveFormat::TarGz).unwrap();
    assert_eq!(std::fs::read_to_string(dest.join("a/c.txt")).unwrap(), "fine");
    assert_eq!(std::fs::read_to_string(dest.join("d.txt")).unwrap(), "also fine");
}
