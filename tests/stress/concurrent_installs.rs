//! Concurrent installs across many plugin identities.

use crate::common::{entries, manager, serve_plugin, spec};
use anyhow::Result;
use iacpm_cli::test_utils::FakeTransport;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

const IDENTITIES: usize = 20;
const TASKS_PER_IDENTITY: usize = 10;

fn name(i: usize) -> String {
    format!("p{i}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_identities_many_writers() -> Result<()> {
    let temp = TempDir::new()?;
    let transport = Arc::new(FakeTransport::new());
    for i in 0..IDENTITIES {
        serve_plugin(&transport, &name(i), "1.0.0", &format!("payload-{i}"));
    }
    let manager = Arc::new(manager(temp.path(), transport.clone()));

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..IDENTITIES {
        for t in 0..TASKS_PER_IDENTITY {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.ensure_installed(&spec(&name(i), "1.0.0"), t % 3 == 0).await
            }));
        }
    }
    for handle in handles {
        handle.await??;
    }
    println!(
        "{} installs over {IDENTITIES} identities in {:?} ({} downloads)",
        IDENTITIES * TASKS_PER_IDENTITY,
        start.elapsed(),
        transport.call_count()
    );

    let expected: Vec<String> = {
        let mut names: Vec<String> = (0..IDENTITIES).map(|i| format!("resource-{}-v1.0.0", name(i))).collect();
        names.sort();
        names
    };
    assert_eq!(entries(temp.path()), expected);
    for i in 0..IDENTITIES {
        let binary = temp.path().join(format!("resource-{}-v1.0.0/iacpm-resource-{}", name(i), name(i)));
        assert_eq!(std::fs::read_to_string(binary)?, format!("payload-{i}"));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_install_remove_churn() -> Result<()> {
    let temp = TempDir::new()?;
    let transport = Arc::new(FakeTransport::new());
    serve_plugin(&transport, "churn", "2.0.0", "churn");
    let manager = Arc::new(manager(temp.path(), transport));

    let start = Instant::now();
    let mut handles = Vec::new();
    for t in 0..50 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let churn = spec("churn", "2.0.0");
            if t % 2 == 0 {
                manager.ensure_installed(&churn, false).await.map(|_| ())
            } else {
                manager.remove(&churn).await
            }
        }));
    }
    for handle in handles {
        handle.await??;
    }
    println!("50 install/remove operations in {:?}", start.elapsed());

    // Whatever the interleaving, the root holds either nothing or one whole plugin
    let left = entries(temp.path());
    assert!(left.is_empty() || left == vec!["resource-churn-v2.0.0"], "leftovers: {left:?}");
    if !left.is_empty() {
        let binary = temp.path().join("resource-churn-v2.0.0/iacpm-resource-churn");
        assert_eq!(std::fs::read_to_string(binary)?, "churn");
    }
    Ok(())
}
