//! Stress Test Suite for IACPM
//!
//! Hammers the plugin install root with many concurrent installs, overwrites
//! and removals. These tests take longer than the integration suite and are
//! **not executed in CI**.
//!
//! Timings are logged via `println!` for manual review rather than asserted;
//! correctness (exactly one complete directory per identity, no leftovers) is
//! asserted.
//!
//! # Running Stress Tests
//!
//! ```bash
//! cargo test --test stress
//! cargo test --test stress -- --nocapture
//! cargo test --test stress --release
//! ```
//!
//! # Test Organization
//!
//! - **concurrent_installs.rs**: Install, overwrite and remove races across many identities

// Shared test utilities (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod concurrent_installs;
