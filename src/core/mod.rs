//! Core types for IACPM
//!
//! This module holds the error taxonomy shared by every component:
//! - [`IacpmError`] - Enumerated error types covering all failure modes
//! - [`ErrorKind`] - The category callers branch on
//! - [`ErrorContext`] - User-friendly error wrapper with suggestions and details
//! - [`user_friendly_error`] - Convert any error to user-friendly format

pub mod error;

pub use error::{
    ErrorContext, ErrorKind, IacpmError, IntoAnyhowWithContext, error_kind, find_iacpm_error,
    user_friendly_error,
};
