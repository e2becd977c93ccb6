//! Centralized error handling for stream validation
//!
//! # Error Categories
//!
//! - **Critical errors**: DNS, refused connections, TLS, authentication,
//!   configuration and upstream service failures. These abort a run.
//! - **Recoverable errors**: timeouts, single-host failures, bad statuses and
//!   malformed responses. These mark one channel invalid.
//! - **Configuration errors**: loading and validating [`crate::config`].
//!
//! The split is made by [`crate::services::error_classifier::ErrorClassifier`],
//! not by the variant itself.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using ValidationError
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Convenience type alias for configuration Results
pub type ConfigResult<T> = Result<T, ConfigError>;
