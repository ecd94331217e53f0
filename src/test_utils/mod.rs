//! Test utilities for IACPM
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration and stress suites:
//! - [`init_test_logging`] - one-time tracing setup that plays well with `cargo test`
//! - [`build_tar_gz`] / [`build_zip`] - in-memory archives, including malicious ones
//! - [`FakeTransport`] / [`FakeCloner`] - counting fakes for the HTTP and git seams
//! - [`TestGit`] - real repositories on disk for the `git` integration
//!
//! # Example
//!
//! ```rust,no_run
//! use iacpm_cli::source::HttpResponse;
//! use iacpm_cli::test_utils::{FakeTransport, TarEntry, build_tar_gz};
//!
//! let transport = FakeTransport::new();
//! transport.respond(
//!     "https://get.iacpm.dev/releases/plugins/iacpm-tool-x-v1.0.0-linux-amd64.tar.gz",
//!     HttpResponse::new(200, build_tar_gz(&[TarEntry::file("iacpm-tool-x", b"bin")])),
//! );
//! ```

pub mod archives;
pub mod fakes;
pub mod git_helper;

pub use archives::{TarEntry, build_tar_gz, build_zip};
pub use fakes::{FakeCloner, FakeTransport};
pub use git_helper::TestGit;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initializes tracing for tests, once per process.
///
/// Uses `level` if given, else `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=iacpm_cli=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Whether a `git` binary is available; git-backed tests skip themselves otherwise.
pub fn git_available() -> bool {
    crate::utils::platform::command_exists(crate::utils::platform::get_git_command())
}
