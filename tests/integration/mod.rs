//! Integration test suite for IACPM
//!
//! End-to-end tests of the plugin install protocol, safe extraction, template
//! retrieval and the `iacpm` binary. Network access goes through counting
//! fakes from `iacpm_cli::test_utils`; git tests use real repositories over
//! `file://` and skip themselves when `git` is missing.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! cargo nextest run --test integration
//! ```
//!
//! # Test Organization
//!
//! - **archive_safety**: Traversal, link and absolute-path entries
//! - **cli**: The binary against an isolated `IACPM_HOME`
//! - **git**: `GitCli` clone, refresh and ref resolution
//! - **plugin_install**: Reuse, overwrite, conflicts, crash recovery, concurrency
//! - **templates**: Template cache, git folder and zip URLs, offline mode, copying

// Shared test utilities (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod archive_safety;
mod cli;
mod git;
mod plugin_install;
mod templates;
