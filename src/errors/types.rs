//! Error type definitions for stream validation
//!
//! Every failure a probe or a run can produce is a [`ValidationError`]. Each
//! variant carries a stable code so the error classifier can match on
//! `code: message` text without caring which layer produced the error.

use thiserror::Error;

/// Errors raised while validating channels
///
/// Whether an error aborts a run or only marks one channel invalid is not
/// decided here; see [`crate::services::error_classifier::ErrorClassifier`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Host name could not be resolved
    #[error("DNS resolution failed for {host}: {message}")]
    Dns { host: String, message: String },

    /// Remote end actively refused the connection
    #[error("Connection refused: {url}")]
    ConnectionRefused { url: String },

    /// TLS handshake or certificate verification failed
    #[error("TLS/certificate error: {message}")]
    Tls { message: String },

    /// Credentials required by the environment were rejected
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Validator configuration is unusable
    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfiguration { field: String, message: String },

    /// A service the validator depends on is not available
    #[error("Upstream service unavailable: {service} - {message}")]
    ServiceUnavailable { service: String, message: String },

    /// Probe did not complete within its deadline
    #[error("Probe timed out after {timeout_ms}ms: {url}")]
    Timeout { url: String, timeout_ms: u64 },

    /// A single host could not be reached
    #[error("Host unreachable: {url}")]
    Unreachable { url: String },

    /// Response arrived but could not be interpreted
    #[error("Malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    /// Response status is not in the accepted set
    #[error("Unexpected status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Any other transport failure, message is the full error chain
    #[error("Request failed: {message}")]
    Request { message: String },

    /// Run was cancelled because a sibling lane hit a critical error
    #[error("Validation aborted: {reason}")]
    Aborted { reason: String },
}

impl ValidationError {
    /// Stable machine-readable code for the error
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Dns { .. } => "ENOTFOUND",
            ValidationError::ConnectionRefused { .. } => "ECONNREFUSED",
            ValidationError::Tls { .. } => "CERT_ERROR",
            ValidationError::Authentication { .. } => "EAUTH",
            ValidationError::InvalidConfiguration { .. } => "EINVALIDCONFIG",
            ValidationError::ServiceUnavailable { .. } => "ESERVICEUNAVAILABLE",
            ValidationError::Timeout { .. } => "ETIMEDOUT",
            ValidationError::Unreachable { .. } => "EHOSTUNREACH",
            ValidationError::MalformedResponse { .. } => "EMALFORMED",
            ValidationError::HttpStatus { .. } => "EHTTPSTATUS",
            ValidationError::Request { .. } => "EREQUEST",
            ValidationError::Aborted { .. } => "EABORTED",
        }
    }

    /// Free-form detail text, excluding any URL
    ///
    /// This is what message patterns are matched against, so a host name
    /// that happens to contain "ssl" or "dns" cannot change a classification.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ValidationError::Dns { message, .. }
            | ValidationError::Tls { message }
            | ValidationError::Authentication { message }
            | ValidationError::InvalidConfiguration { message, .. }
            | ValidationError::ServiceUnavailable { message, .. }
            | ValidationError::MalformedResponse { message, .. }
            | ValidationError::Request { message } => Some(message),
            ValidationError::Aborted { reason } => Some(reason),
            ValidationError::ConnectionRefused { .. }
            | ValidationError::Timeout { .. }
            | ValidationError::Unreachable { .. }
            | ValidationError::HttpStatus { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ValidationError::Timeout { .. })
    }

    /// Create an invalid configuration error
    pub fn invalid_config<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a generic request error
    pub fn request<S: Into<String>>(message: S) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Create an aborted error
    pub fn aborted<S: Into<String>>(reason: S) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Layered config could not be extracted
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Default config could not be serialised
    #[error("Failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Config file could not be written
    #[error("Failed to write configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Values loaded but failed validation
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}
