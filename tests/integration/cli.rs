//! The `iacpm` binary, run with an isolated `IACPM_HOME`.
//!
//! Only offline paths are exercised here; the network seams are covered
//! with fakes in the other modules.

use crate::common::{iacpm, plugin_archive, write_template};
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_plugin_ls_empty() {
    let home = TempDir::new().unwrap();
    iacpm(home.path())
        .args(["plugin", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No plugins installed"));
}

#[test]
fn test_plugin_install_from_file_then_ls_and_rm() {
    let home = TempDir::new().unwrap();
    let archive = home.path().join("aws.tar.gz");
    std::fs::write(&archive, plugin_archive("aws", "bin")).unwrap();

    iacpm(home.path())
        .args(["plugin", "install", "resource", "aws", "v6.1", "--file"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed"));
    assert!(home.path().join("plugins/resource-aws-v6.1.0/iacpm-resource-aws").is_file());

    iacpm(home.path())
        .args(["plugin", "ls", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"aws\"").and(predicate::str::contains("6.1.0")));

    // Not a terminal and no --yes: refuse
    iacpm(home.path())
        .args(["plugin", "rm", "resource", "aws"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
    assert!(home.path().join("plugins/resource-aws-v6.1.0").is_dir());

    iacpm(home.path())
        .args(["plugin", "rm", "resource", "aws", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    assert!(!home.path().join("plugins/resource-aws-v6.1.0").exists());
}

#[test]
fn test_plugin_rm_unknown_fails() {
    let home = TempDir::new().unwrap();
    iacpm(home.path())
        .args(["plugin", "rm", "tool", "nothing", "--yes"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_kind_is_a_usage_error() {
    let home = TempDir::new().unwrap();
    iacpm(home.path())
        .args(["plugin", "install", "provider", "aws"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("provider"));
}

#[test]
fn test_new_from_local_path() {
    let home = TempDir::new().unwrap();
    let template = home.path().join("my-template");
    write_template(&template, "Local template");
    let dest = home.path().join("billing-api");

    iacpm(home.path())
        .args(["new"])
        .arg(&template)
        .arg("--dir")
        .arg(&dest)
        .args(["--description", "Bills things"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cd billing-api"));

    assert_eq!(
        std::fs::read_to_string(dest.join("main.txt")).unwrap(),
        "project billing-api: Bills things\n"
    );
    // A local template is never deleted
    assert!(template.join("Iacpm.yaml").is_file());

    // Second run collides with every file
    iacpm(home.path())
        .args(["new"])
        .arg(&template)
        .arg("--dir")
        .arg(&dest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("main.txt"));

    iacpm(home.path())
        .args(["new"])
        .arg(&template)
        .arg("--dir")
        .arg(&dest)
        .args(["--name", "renamed", "--force"])
        .assert()
        .success();
    assert_eq!(std::fs::read_to_string(dest.join("main.txt")).unwrap(), "project renamed: \n");
}

#[test]
fn test_new_dry_run_writes_nothing() {
    let home = TempDir::new().unwrap();
    let template = home.path().join("tpl");
    write_template(&template, "t");
    let dest = home.path().join("out");

    iacpm(home.path())
        .args(["new"])
        .arg(&template)
        .arg("--dir")
        .arg(&dest)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"));
    assert!(!dest.exists());
}

#[test]
fn test_new_rejects_invalid_name() {
    let home = TempDir::new().unwrap();
    let template = home.path().join("tpl");
    write_template(&template, "t");

    iacpm(home.path())
        .args(["new"])
        .arg(&template)
        .arg("--dir")
        .arg(home.path().join("out"))
        .args(["--name", "iacpm"])
        .assert()
        .failure();
}

#[test]
fn test_template_ls_offline_missing_cache() {
    let home = TempDir::new().unwrap();
    iacpm(home.path())
        .args(["template", "ls", "aws-go", "--offline"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("aws-go"));
}
