//! Error handling for IACPM
//!
//! This module provides the error taxonomy and user-friendly error reporting for
//! plugin installation and template retrieval. The error system is built around
//! two principles:
//! 1. **Strongly-typed errors** so calling layers can branch on the failure kind
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`IacpmError`] - Enumerated error types for every failure case
//! - [`ErrorKind`] - The coarse category callers branch on (retry with credentials,
//!   suggest alternatives, fail)
//! - [`ErrorContext`] - Wrapper that adds user-friendly messages and suggestions
//!
//! Library code returns [`anyhow::Result`] and attaches context with
//! `.with_context()`. Typed errors survive that wrapping and can be recovered with
//! [`find_iacpm_error`] or [`error_kind`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use iacpm_cli::core::{ErrorKind, IacpmError, error_kind};
//!
//! let err = anyhow::Error::from(IacpmError::Offline {
//!     url: "https://github.com/org/repo".to_string(),
//! });
//! assert_eq!(error_kind(&err), Some(ErrorKind::Unavailable));
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Coarse failure categories shared by every component.
///
/// Each [`IacpmError`] variant maps onto exactly one kind via [`IacpmError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A plugin, artifact, template or version is absent
    NotFound,
    /// The destination already exists and `force`/`overwrite` was not given
    Conflict,
    /// An archive is malformed, tries to escape its root, or lacks a manifest
    InvalidArchive,
    /// The server rejected our credentials; callers may prompt and retry
    Unauthorized,
    /// The operation needs the network but offline mode is on
    Unavailable,
    /// Network or HTTP failure
    Transport,
    /// A version string or annotation could not be parsed
    VersionParse,
    /// The caller supplied invalid input (names, URLs, configuration)
    InvalidInput,
    /// Local filesystem failure
    Io,
    /// Anything else
    Other,
}

/// The main error type for IACPM operations
///
/// Variants carry the entry name, URL, or HTTP status and body needed for the
/// caller to decide what to do next. Nothing in the crate retries on these errors.
///
/// # Error Categories
///
/// ## Plugins
/// - [`PluginNotFound`], [`ArtifactNotFound`] and [`VersionAnnotationMissing`] are
///   deliberately distinct: the first means the plugin does not exist, the second
///   that it exists but not for this OS/architecture, the third that the "latest"
///   reference carries no version.
///
/// ## Archives
/// - [`InvalidArchive`] for traversal or link entries, [`MissingManifest`] for
///   template archives without a project manifest.
///
/// ## Network
/// - [`Offline`], [`Unauthorized`], [`RateLimited`], [`HttpStatus`], [`Transport`]
///
/// [`PluginNotFound`]: IacpmError::PluginNotFound
/// [`ArtifactNotFound`]: IacpmError::ArtifactNotFound
/// [`VersionAnnotationMissing`]: IacpmError::VersionAnnotationMissing
/// [`InvalidArchive`]: IacpmError::InvalidArchive
/// [`MissingManifest`]: IacpmError::MissingManifest
/// [`Offline`]: IacpmError::Offline
/// [`Unauthorized`]: IacpmError::Unauthorized
/// [`RateLimited`]: IacpmError::RateLimited
/// [`HttpStatus`]: IacpmError::HttpStatus
/// [`Transport`]: IacpmError::Transport
#[derive(Error, Debug)]
pub enum IacpmError {
    /// Git executable not found in PATH
    ///
    /// Template URLs and the bare-name template cache are materialized with the
    /// system `git`.
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// Git operation failed during execution
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        /// The git operation that failed (e.g., "clone", "fetch", "ls-remote")
        operation: String,
        /// The error output from the git command
        stderr: String,
    },

    /// Git repository clone failed
    #[error("Failed to clone repository: {url}")]
    GitCloneFailed {
        /// The repository URL that failed to clone
        url: String,
        /// The reason for the clone failure
        reason: String,
    },

    /// Git checkout failed
    #[error("Failed to checkout reference '{reference}' in repository")]
    GitCheckoutFailed {
        /// The git reference (branch, tag, or commit) that failed to checkout
        reference: String,
        /// The reason for the checkout failure
        reason: String,
    },

    /// A template URL could not be interpreted as a git repository URL
    #[error("invalid Git URL '{url}': {reason}")]
    InvalidGitUrl {
        /// The URL as given by the user
        url: String,
        /// What was wrong with it
        reason: String,
    },

    /// No plugin with this identity exists at the source or on disk
    #[error("no {kind} plugin '{name}{}' found", format_version(.version.as_deref()))]
    PluginNotFound {
        /// Plugin kind
        kind: String,
        /// Plugin name
        name: String,
        /// Requested version, when one was given
        version: Option<String>,
    },

    /// The plugin release exists but ships nothing for this platform
    #[error("plugin '{name}' v{version} has no artifact for {os}-{arch}")]
    ArtifactNotFound {
        /// Plugin name
        name: String,
        /// Requested version
        version: String,
        /// Target operating system
        os: String,
        /// Target architecture
        arch: String,
    },

    /// The "latest" reference exists but carries no version
    #[error("no version annotation found on '{reference}'")]
    VersionAnnotationMissing {
        /// The tag or URL that was inspected
        reference: String,
    },

    /// A version string could not be parsed as semver
    #[error("invalid version '{value}': {reason}")]
    VersionParse {
        /// The offending string
        value: String,
        /// Parser message
        reason: String,
    },

    /// The running platform has no published plugin builds
    #[error("unsupported plugin platform: {os}-{arch}")]
    UnsupportedPlatform {
        /// Operating system reported by the standard library
        os: String,
        /// Architecture reported by the standard library
        arch: String,
    },

    /// The plugin server URL uses a scheme no backend understands
    #[error("unknown plugin source scheme: {scheme}")]
    UnknownSourceScheme {
        /// The scheme, without `://`
        scheme: String,
    },

    /// A plugin specification is incomplete or malformed
    #[error("invalid plugin specification: {reason}")]
    InvalidPluginSpec {
        /// What was wrong
        reason: String,
    },

    /// Downloaded bytes do not match the expected checksum
    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Artifact name
        name: String,
        /// Expected sha256 hex
        expected: String,
        /// Actual sha256 hex
        actual: String,
    },

    /// The install destination already exists and overwrite was not requested
    #[error("plugin directory already exists: {path}")]
    Conflict {
        /// The final plugin directory
        path: String,
    },

    /// The install lock could not be acquired in time
    #[error("timed out after {timeout_secs}s waiting for install lock '{name}'")]
    LockTimeout {
        /// Lock name (the plugin directory name)
        name: String,
        /// Configured timeout
        timeout_secs: u64,
    },

    /// An archive entry is unsafe or the archive is malformed
    #[error("invalid archive entry '{entry}': {reason}")]
    InvalidArchive {
        /// The offending entry name as stored in the archive
        entry: String,
        /// Why the entry was rejected
        reason: String,
    },

    /// A template archive does not contain a project manifest
    #[error("template '{location}' does not contain a {manifest}")]
    MissingManifest {
        /// The URL or path the archive came from
        location: String,
        /// The manifest file name that was expected
        manifest: String,
    },

    /// Bare template name not present in the template cache
    #[error("template '{name}' not found{}", format_suggestions(.suggestions))]
    TemplateNotFound {
        /// The lowercased template name
        name: String,
        /// Near-miss names, closest first
        suggestions: Vec<String>,
    },

    /// Copying a template would overwrite files and `force` was not given
    #[error("{}", format_existing_files(.files))]
    ExistingFiles {
        /// File names that already exist in the destination
        files: Vec<String>,
    },

    /// The path exists but is not a directory
    #[error("{path} is not a directory")]
    NotADirectory {
        /// The path that was expected to be a directory
        path: String,
    },

    /// Project name rejected by validation
    #[error("{reason}")]
    InvalidProjectName {
        /// User-facing explanation
        reason: String,
    },

    /// Project description rejected by validation
    #[error("{reason}")]
    InvalidProjectDescription {
        /// User-facing explanation
        reason: String,
    },

    /// A remote fetch was requested in offline mode
    #[error("cannot use {url} offline")]
    Offline {
        /// The URL that would have been fetched
        url: String,
    },

    /// The hosted service rejected the request with 401
    #[error("unauthorized: {url} requires authentication")]
    Unauthorized {
        /// The URL that was fetched
        url: String,
    },

    /// GitHub rate limit exhausted
    #[error("rate limit exceeded fetching {url}")]
    RateLimited {
        /// The URL that was fetched
        url: String,
    },

    /// The server answered with a non-2xx status
    #[error("{status} HTTP error fetching {url}{}", format_body(.body))]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// The URL that was fetched
        url: String,
        /// Response body, verbatim
        body: String,
    },

    /// The request never produced a response
    #[error("failed to fetch {url}: {reason}")]
    Transport {
        /// The URL that was fetched
        url: String,
        /// Transport error message
        reason: String,
    },

    /// The download URL override list could not be parsed
    #[error("{reason}")]
    InvalidUrlOverrides {
        /// The raw override string
        input: String,
        /// Parser message
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error for cases not covered by specific variants
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

fn format_version(version: Option<&str>) -> String {
    version.map(|v| format!("-v{v}")).unwrap_or_default()
}

fn format_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        return String::new();
    }
    let mut message = String::from("\n\nDid you mean this?\n");
    for suggestion in suggestions {
        message.push_str(&format!("\t{suggestion}\n"));
    }
    message
}

fn format_existing_files(files: &[String]) -> String {
    let mut message = String::from("creating this template will make changes to existing files:\n");
    for file in files {
        message.push_str(&format!("  overwrite   {file}\n"));
    }
    message.push_str("\nrerun the command and pass --force to accept and create");
    message
}

impl IacpmError {
    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::PluginNotFound {
                ..
            }
            | Self::ArtifactNotFound {
                ..
            }
            | Self::VersionAnnotationMissing {
                ..
            }
            | Self::TemplateNotFound {
                ..
            } => ErrorKind::NotFound,
            Self::Conflict {
                ..
            }
            | Self::ExistingFiles {
                ..
            } => ErrorKind::Conflict,
            Self::InvalidArchive {
                ..
            }
            | Self::MissingManifest {
                ..
            }
            | Self::ChecksumMismatch {
                ..
            } => ErrorKind::InvalidArchive,
            Self::Unauthorized {
                ..
            } => ErrorKind::Unauthorized,
            Self::Offline {
                ..
            } => ErrorKind::Unavailable,
            Self::RateLimited {
                ..
            }
            | Self::HttpStatus {
                ..
            }
            | Self::Transport {
                ..
            }
            | Self::GitCloneFailed {
                ..
            } => ErrorKind::Transport,
            Self::VersionParse {
                ..
            } => ErrorKind::VersionParse,
            Self::UnsupportedPlatform {
                ..
            }
            | Self::UnknownSourceScheme {
                ..
            }
            | Self::InvalidPluginSpec {
                ..
            }
            | Self::InvalidGitUrl {
                ..
            }
            | Self::InvalidProjectName {
                ..
            }
            | Self::InvalidProjectDescription {
                ..
            }
            | Self::InvalidUrlOverrides {
                ..
            }
            | Self::ConfigError {
                ..
            } => ErrorKind::InvalidInput,
            Self::IoError(_)
            | Self::NotADirectory {
                ..
            } => ErrorKind::Io,
            Self::GitNotFound
            | Self::GitCommandError {
                ..
            }
            | Self::GitCheckoutFailed {
                ..
            }
            | Self::LockTimeout {
                ..
            }
            | Self::Other {
                ..
            } => ErrorKind::Other,
        }
    }
}

impl Clone for IacpmError {
    fn clone(&self) -> Self {
        match self {
            Self::GitNotFound => Self::GitNotFound,
            Self::GitCommandError {
                operation,
                stderr,
            } => Self::GitCommandError {
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            Self::GitCloneFailed {
                url,
                reason,
            } => Self::GitCloneFailed {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::GitCheckoutFailed {
                reference,
                reason,
            } => Self::GitCheckoutFailed {
                reference: reference.clone(),
                reason: reason.clone(),
            },
            Self::InvalidGitUrl {
                url,
                reason,
            } => Self::InvalidGitUrl {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::PluginNotFound {
                kind,
                name,
                version,
            } => Self::PluginNotFound {
                kind: kind.clone(),
                name: name.clone(),
                version: version.clone(),
            },
            Self::ArtifactNotFound {
                name,
                version,
                os,
                arch,
            } => Self::ArtifactNotFound {
                name: name.clone(),
                version: version.clone(),
                os: os.clone(),
                arch: arch.clone(),
            },
            Self::VersionAnnotationMissing {
                reference,
            } => Self::VersionAnnotationMissing {
                reference: reference.clone(),
            },
            Self::VersionParse {
                value,
                reason,
            } => Self::VersionParse {
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::UnsupportedPlatform {
                os,
                arch,
            } => Self::UnsupportedPlatform {
                os: os.clone(),
                arch: arch.clone(),
            },
            Self::UnknownSourceScheme {
                scheme,
            } => Self::UnknownSourceScheme {
                scheme: scheme.clone(),
            },
            Self::InvalidPluginSpec {
                reason,
            } => Self::InvalidPluginSpec {
                reason: reason.clone(),
            },
            Self::ChecksumMismatch {
                name,
                expected,
                actual,
            } => Self::ChecksumMismatch {
                name: name.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Self::Conflict {
                path,
            } => Self::Conflict {
                path: path.clone(),
            },
            Self::LockTimeout {
                name,
                timeout_secs,
            } => Self::LockTimeout {
                name: name.clone(),
                timeout_secs: *timeout_secs,
            },
            Self::InvalidArchive {
                entry,
                reason,
            } => Self::InvalidArchive {
                entry: entry.clone(),
                reason: reason.clone(),
            },
            Self::MissingManifest {
                location,
                manifest,
            } => Self::MissingManifest {
                location: location.clone(),
                manifest: manifest.clone(),
            },
            Self::TemplateNotFound {
                name,
                suggestions,
            } => Self::TemplateNotFound {
                name: name.clone(),
                suggestions: suggestions.clone(),
            },
            Self::ExistingFiles {
                files,
            } => Self::ExistingFiles {
                files: files.clone(),
            },
            Self::NotADirectory {
                path,
            } => Self::NotADirectory {
                path: path.clone(),
            },
            Self::InvalidProjectName {
                reason,
            } => Self::InvalidProjectName {
                reason: reason.clone(),
            },
            Self::InvalidProjectDescription {
                reason,
            } => Self::InvalidProjectDescription {
                reason: reason.clone(),
            },
            Self::Offline {
                url,
            } => Self::Offline {
                url: url.clone(),
            },
            Self::Unauthorized {
                url,
            } => Self::Unauthorized {
                url: url.clone(),
            },
            Self::RateLimited {
                url,
            } => Self::RateLimited {
                url: url.clone(),
            },
            Self::HttpStatus {
                status,
                url,
                body,
            } => Self::HttpStatus {
                status: *status,
                url: url.clone(),
                body: body.clone(),
            },
            Self::Transport {
                url,
                reason,
            } => Self::Transport {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::InvalidUrlOverrides {
                input,
                reason,
            } => Self::InvalidUrlOverrides {
                input: input.clone(),
                reason: reason.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Finds the first [`IacpmError`] in an error chain.
///
/// Errors are usually wrapped with `.with_context()` on their way up; this walks
/// the chain so callers can still branch on the typed error.
#[must_use]
pub fn find_iacpm_error(error: &anyhow::Error) -> Option<&IacpmError> {
    error.chain().find_map(|cause| cause.downcast_ref::<IacpmError>())
}

/// Returns the [`ErrorKind`] of the first typed error in the chain.
#[must_use]
pub fn error_kind(error: &anyhow::Error) -> Option<ErrorKind> {
    find_iacpm_error(error).map(IacpmError::kind)
}

/// Error context wrapper that provides user-friendly error information
///
/// Combines an [`IacpmError`] with an optional suggestion (printed in green) and
/// optional details (printed in yellow).
///
/// # Examples
///
/// ```rust,no_run
/// use iacpm_cli::core::{ErrorContext, IacpmError};
///
/// let context = ErrorContext::new(IacpmError::GitNotFound)
///     .with_suggestion("Install git from https://git-scm.com/")
///     .with_details("Templates are fetched with the system git");
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying IACPM error
    pub error: IacpmError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from an [`IacpmError`]
    #[must_use]
    pub const fn new(error: IacpmError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Extension trait for converting [`IacpmError`] to [`anyhow::Error`] with context
pub trait IntoAnyhowWithContext {
    /// Convert the error to an [`anyhow::Error`] with the provided context
    fn into_anyhow_with_context(self, context: ErrorContext) -> anyhow::Error;
}

impl IntoAnyhowWithContext for IacpmError {
    fn into_anyhow_with_context(self, context: ErrorContext) -> anyhow::Error {
        anyhow::Error::new(ErrorContext {
            error: self,
            suggestion: context.suggestion,
            details: context.details,
        })
    }
}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// Recognizes [`IacpmError`] anywhere in the chain, [`ErrorContext`] values that
/// were attached earlier, and common [`std::io::Error`] kinds. Anything else is
/// reported with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(ctx) = error.downcast_ref::<ErrorContext>() {
        return ErrorContext {
            error: ctx.error.clone(),
            suggestion: ctx.suggestion.clone(),
            details: ctx.details.clone(),
        };
    }

    if let Some(iacpm_error) = find_iacpm_error(&error) {
        let mut context = create_error_context(iacpm_error.clone());
        // Keep the outer context messages; they name the plugin or template involved
        let outer: Vec<String> = error
            .chain()
            .take_while(|cause| cause.downcast_ref::<IacpmError>().is_none())
            .map(ToString::to_string)
            .collect();
        if !outer.is_empty() && context.details.is_none() {
            context.details = Some(outer.join(": "));
        }
        return context;
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(IacpmError::Other {
                    message: error.to_string(),
                })
                .with_suggestion("Check ownership and permissions of the plugin and template directories")
                .with_details("IACPM could not read or write a file it needs");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(IacpmError::Other {
                    message: error.to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    // Generic error - include the full error chain for better diagnostics
    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(IacpmError::Other {
        message,
    })
}

/// Create appropriate [`ErrorContext`] with suggestions for specific IACPM errors
fn create_error_context(error: IacpmError) -> ErrorContext {
    match &error {
        IacpmError::GitNotFound => ErrorContext::new(IacpmError::GitNotFound)
            .with_suggestion("Install git from https://git-scm.com/ or your system's package manager")
            .with_details("Template URLs and the template cache are fetched with git"),
        IacpmError::GitCloneFailed {
            url,
            reason,
        } => {
            let suggestion = format!("Check that {url} exists and that you have access to it");
            let reason = reason.clone();
            ErrorContext::new(error).with_suggestion(suggestion).with_details(reason)
        }
        IacpmError::GitCommandError {
            stderr,
            ..
        } => {
            let stderr = stderr.clone();
            ErrorContext::new(error).with_details(stderr)
        }
        IacpmError::PluginNotFound {
            kind,
            name,
            version,
        } => {
            let version = version.as_deref().map(|v| format!(" {v}")).unwrap_or_default();
            let suggestion = format!("Install it with `iacpm plugin install {kind} {name}{version}`");
            ErrorContext::new(error).with_suggestion(suggestion)
        }
        IacpmError::ArtifactNotFound {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the plugin's release page for supported platforms")
            .with_details("The release exists but does not include a build for this machine"),
        IacpmError::Conflict {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Pass --reinstall to replace the existing installation"),
        IacpmError::TemplateNotFound {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Run `iacpm template ls` to see the available templates"),
        IacpmError::Offline {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Drop --offline or use a template from the local cache"),
        IacpmError::Unauthorized {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Log in to the hosted service and retry"),
        IacpmError::RateLimited {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Set GITHUB_TOKEN to raise the GitHub API rate limit"),
        IacpmError::InvalidArchive {
            ..
        } => ErrorContext::new(error)
            .with_details("The archive was rejected before anything was written outside its staging directory"),
        IacpmError::ChecksumMismatch {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Retry the download; if it persists the published artifact may have changed"),
        IacpmError::InvalidUrlOverrides {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Fix IACPM_PLUGIN_DOWNLOAD_URL_OVERRIDES or plugins.download_url_overrides"),
        IacpmError::LockTimeout {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Another iacpm process is installing the same plugin; wait for it or raise plugins.lock_timeout_secs"),
        _ => ErrorContext::new(error),
    }
}
