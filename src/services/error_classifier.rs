//! Critical vs recoverable error classification
//!
//! A single ordered list of regex patterns decides whether a probe failure
//! means the environment is broken (critical, abort the run) or only that one
//! stream is broken (recoverable, mark the channel invalid). Patterns are
//! matched against `code: detail`, where the detail never contains the URL.
//! The first matching pattern wins; anything unmatched is recoverable.

use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

use crate::config::ClassifierConfig;
use crate::errors::{ValidationError, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Critical,
    Recoverable,
}

/// A named regex with the severity it assigns
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    name: String,
    regex: Regex,
    severity: ErrorSeverity,
}

impl ErrorPattern {
    pub fn new<S: Into<String>>(
        name: S,
        pattern: &str,
        severity: ErrorSeverity,
    ) -> ValidationResult<Self> {
        let name = name.into();
        let regex = Regex::new(pattern).map_err(|e| {
            ValidationError::invalid_config("classifier", format!("pattern '{name}': {e}"))
        })?;
        Ok(Self {
            name,
            regex,
            severity,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    fn matches(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

/// Built-in patterns, in evaluation order
const BUILTIN_PATTERNS: &[(&str, &str, ErrorSeverity)] = &[
    // Typed per-stream failures stay recoverable whatever their detail says
    (
        "per_stream_failure",
        r"^(ETIMEDOUT|EHOSTUNREACH|EMALFORMED|EHTTPSTATUS):",
        ErrorSeverity::Recoverable,
    ),
    (
        "dns_resolution",
        r"(?i)^ENOTFOUND:|EAI_AGAIN|dns error|failed to lookup address|name or service not known|no such host|nodename nor servname|temporary failure in name resolution",
        ErrorSeverity::Critical,
    ),
    (
        "connection_refused",
        r"(?i)^ECONNREFUSED:|connection refused",
        ErrorSeverity::Critical,
    ),
    (
        "tls_certificate",
        r"(?i)^CERT_ERROR:|certificate|tls handshake|invalid peer|unknownissuer|\bssl\b",
        ErrorSeverity::Critical,
    ),
    (
        "authentication",
        r"(?i)^EAUTH:|authentication (failed|required)|\b407\b",
        ErrorSeverity::Critical,
    ),
    (
        "invalid_configuration",
        r"(?i)^EINVALIDCONFIG:|invalid configuration",
        ErrorSeverity::Critical,
    ),
    (
        "service_unavailable",
        r"(?i)^ESERVICEUNAVAILABLE:|upstream service unavailable",
        ErrorSeverity::Critical,
    ),
    ("run_aborted", r"^EABORTED:", ErrorSeverity::Critical),
];

static DEFAULT_PATTERNS: LazyLock<Vec<ErrorPattern>> = LazyLock::new(|| {
    BUILTIN_PATTERNS
        .iter()
        .filter_map(|(name, pattern, severity)| ErrorPattern::new(*name, pattern, *severity).ok())
        .collect()
});

/// Ordered pattern list deciding the fail-fast/continue question
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    patterns: Vec<ErrorPattern>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.clone(),
        }
    }
}

impl ErrorClassifier {
    /// Classifier with an explicit pattern list and no built-ins
    pub fn with_patterns(patterns: Vec<ErrorPattern>) -> Self {
        Self { patterns }
    }

    /// Built-in list preceded by configured recoverable, then critical, patterns
    pub fn from_config(config: &ClassifierConfig) -> ValidationResult<Self> {
        let mut patterns = Vec::with_capacity(
            config.recoverable_patterns.len()
                + config.critical_patterns.len()
                + DEFAULT_PATTERNS.len(),
        );
        for (index, pattern) in config.recoverable_patterns.iter().enumerate() {
            patterns.push(ErrorPattern::new(
                format!("configured_recoverable_{index}"),
                pattern,
                ErrorSeverity::Recoverable,
            )?);
        }
        for (index, pattern) in config.critical_patterns.iter().enumerate() {
            patterns.push(ErrorPattern::new(
                format!("configured_critical_{index}"),
                pattern,
                ErrorSeverity::Critical,
            )?);
        }
        patterns.extend(DEFAULT_PATTERNS.iter().cloned());
        Ok(Self { patterns })
    }

    /// Insert a pattern ahead of every existing one
    pub fn prepend(mut self, pattern: ErrorPattern) -> Self {
        self.patterns.insert(0, pattern);
        self
    }

    pub fn patterns(&self) -> &[ErrorPattern] {
        &self.patterns
    }

    /// First pattern matching the error, if any
    pub fn matching_pattern(&self, error: &ValidationError) -> Option<&ErrorPattern> {
        let haystack = format!("{}: {}", error.code(), error.detail().unwrap_or_default());
        let matched = self.patterns.iter().find(|p| p.matches(&haystack));
        trace!(
            "Classified '{}' by {}",
            haystack,
            matched.map(ErrorPattern::name).unwrap_or("fallback")
        );
        matched
    }

    pub fn classify(&self, error: &ValidationError) -> ErrorSeverity {
        self.matching_pattern(error)
            .map(ErrorPattern::severity)
            .unwrap_or(ErrorSeverity::Recoverable)
    }

    pub fn is_critical(&self, error: &ValidationError) -> bool {
        self.classify(error) == ErrorSeverity::Critical
    }
}
