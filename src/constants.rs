//! Global constants used throughout the IACPM codebase.
//!
//! This module contains timeout durations, backoff parameters, well-known
//! URLs and file names that are used across multiple modules. Defining
//! them centrally makes magic values discoverable.

use std::time::Duration;

/// Maximum backoff delay for exponential backoff (500ms).
///
/// Used when a lock timeout is configured and acquisition falls back to
/// polling `try_lock_exclusive`.
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for exponential backoff (10ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Timeout for Git clone operations (120 seconds).
///
/// Clone operations may take longer than fetch, especially
/// for large template repositories.
pub const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for Git fetch and ls-remote operations (60 seconds).
pub const GIT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for a single HTTP request (10 minutes).
///
/// Plugin tarballs can be large; the timeout only guards against
/// connections that stall completely.
pub fn default_http_timeout() -> Duration {
    Duration::from_secs(600)
}

/// Prefix shared by every plugin binary and release asset.
pub const PLUGIN_BINARY_PREFIX: &str = "iacpm";

/// Base URL of the legacy release bucket used when no server URL is given.
pub const DEFAULT_PLUGIN_RELEASES_URL: &str = "https://get.iacpm.dev/releases/plugins";

/// GitHub API host used for default plugin downloads.
pub const DEFAULT_GITHUB_API_HOST: &str = "api.github.com";

/// GitHub organization that publishes the default plugins.
pub const DEFAULT_GITHUB_ORG: &str = "iacpm";

/// Namespace used by the registry backend when a plugin name has none.
pub const DEFAULT_REGISTRY_NAMESPACE: &str = "iacpm";

/// Repository holding the project templates.
pub const DEFAULT_TEMPLATE_REPOSITORY: &str = "https://github.com/iacpm/templates.git";

/// Repository holding the policy pack templates.
pub const DEFAULT_POLICY_TEMPLATE_REPOSITORY: &str =
    "https://github.com/iacpm/templates-policy.git";

/// Branch checked out for both template repositories.
pub const DEFAULT_TEMPLATE_BRANCH: &str = "master";

/// Project manifest file that marks a directory as a project template.
pub const PROJECT_MANIFEST_FILE: &str = "Iacpm.yaml";

/// Manifest file that marks a directory as a policy pack template.
pub const POLICY_MANIFEST_FILE: &str = "IacpmPolicy.yaml";

/// Legacy per-template manifest, never copied into new projects.
pub const LEGACY_TEMPLATE_MANIFEST_FILE: &str = ".iacpm.template.yaml";

/// Name of the git metadata directory skipped by template walkers.
pub const GIT_DIR: &str = ".git";

/// Header the hosted service attaches to its responses.
///
/// A 401 carrying this header means the user needs to log in, not that the
/// URL is wrong.
pub const CLOUD_SIGNATURE_HEADER: &str = "x-iacpm-cloud";

/// Number of leading bytes inspected when deciding if a file is binary.
pub const BINARY_DETECTION_WINDOW: usize = 8000;

/// Maximum edit distance for "did you mean" template suggestions.
pub const MAX_SUGGESTION_DISTANCE: usize = 2;

/// Maximum length of a project description.
pub const MAX_PROJECT_DESCRIPTION_LENGTH: usize = 256;

/// Project name used when nothing valid can be derived from the input.
pub const DEFAULT_PROJECT_NAME: &str = "project";

/// Default file mode for archive entries that carry no mode bits.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default directory mode for archive entries that carry no mode bits.
pub const DEFAULT_DIR_MODE: u32 = 0o755;
