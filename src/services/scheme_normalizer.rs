//! Scheme downgrade and fallback policy
//!
//! For a secure URL the plain variant is probed first. If it works it becomes
//! the preferred URL. If it fails, for any reason, the original is tried,
//! unless `skip_https_if_http_fails` is set, in which case the URL is
//! reported invalid with `httpsSkipped`. A failed downgrade is a conversion
//! failure and never aborts on its own; only the original scheme's error can
//! propagate as critical. Each attempt gets the full probe timeout.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::error_classifier::ErrorClassifier;
use super::stream_probe::{ProbeResponse, StreamProbe};
use crate::errors::{ValidationError, ValidationResult};
use crate::models::OutcomeMeta;
use crate::utils::url::UrlUtils;

/// Outcome of testing one URL and its scheme variants
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeTestResult {
    pub is_valid: bool,
    /// URL callers should use, the downgraded variant when `converted`
    pub preferred_url: String,
    pub converted: bool,
    pub meta: OutcomeMeta,
}

#[derive(Clone)]
pub struct SchemeNormalizer {
    probe: Arc<dyn StreamProbe>,
    classifier: Arc<ErrorClassifier>,
    convert_https_to_http: bool,
    skip_https_if_http_fails: bool,
}

impl SchemeNormalizer {
    pub fn new(
        probe: Arc<dyn StreamProbe>,
        classifier: Arc<ErrorClassifier>,
        convert_https_to_http: bool,
        skip_https_if_http_fails: bool,
    ) -> Self {
        Self {
            probe,
            classifier,
            convert_https_to_http,
            skip_https_if_http_fails,
        }
    }

    /// Downgraded variant to try first, if conversion applies to `url`
    fn downgraded_variant(&self, url: &str) -> Option<String> {
        if !self.convert_https_to_http {
            return None;
        }
        UrlUtils::downgrade_scheme(url).filter(|variant| variant != url)
    }

    /// Longest `test_schemes` can take for `url` with `timeout` per attempt
    pub fn attempt_budget(&self, url: &str, timeout: Duration) -> Duration {
        let attempts = match self.downgraded_variant(url) {
            Some(_) if !self.skip_https_if_http_fails => 2,
            _ => 1,
        };
        timeout * attempts
    }

    /// Probe `url` and its downgraded variant, each within `timeout`
    ///
    /// Recoverable failures come back as `is_valid == false`; a critical
    /// failure of the original scheme as `Err`.
    pub async fn test_schemes(
        &self,
        url: &str,
        timeout: Duration,
    ) -> ValidationResult<SchemeTestResult> {
        let mut meta = OutcomeMeta::default();

        let Some(variant) = self.downgraded_variant(url) else {
            return self.attempt_original(url, timeout, meta).await;
        };

        meta.scheme_attempts.push(variant.clone());
        match self.attempt(&variant, timeout).await {
            Ok(response) => {
                debug!(
                    "Downgraded scheme works, preferring {}",
                    UrlUtils::obfuscate_credentials(&variant)
                );
                record_response(&mut meta, &response);
                meta.converted = true;
                meta.original_url = Some(url.to_string());
                meta.preferred_url = Some(variant.clone());
                Ok(SchemeTestResult {
                    is_valid: true,
                    preferred_url: variant,
                    converted: true,
                    meta,
                })
            }
            Err(e) if self.skip_https_if_http_fails => {
                debug!(
                    "Downgraded scheme failed for {}, skipping original: [{}] {}",
                    UrlUtils::obfuscate_credentials(url),
                    e.code(),
                    e
                );
                record_error(&mut meta, &e);
                meta.https_skipped = true;
                Ok(SchemeTestResult {
                    is_valid: false,
                    preferred_url: url.to_string(),
                    converted: false,
                    meta,
                })
            }
            Err(e) => {
                debug!(
                    "Downgraded scheme failed for {}, falling back to original: [{}] {}",
                    UrlUtils::obfuscate_credentials(url),
                    e.code(),
                    e
                );
                self.attempt_original(url, timeout, meta).await
            }
        }
    }

    async fn attempt_original(
        &self,
        url: &str,
        timeout: Duration,
        mut meta: OutcomeMeta,
    ) -> ValidationResult<SchemeTestResult> {
        meta.scheme_attempts.push(url.to_string());
        match self.attempt(url, timeout).await {
            Ok(response) => {
                record_response(&mut meta, &response);
                meta.error = None;
                meta.error_code = None;
                Ok(SchemeTestResult {
                    is_valid: true,
                    preferred_url: url.to_string(),
                    converted: false,
                    meta,
                })
            }
            Err(e) if self.classifier.is_critical(&e) => Err(e),
            Err(e) => {
                record_error(&mut meta, &e);
                Ok(SchemeTestResult {
                    is_valid: false,
                    preferred_url: url.to_string(),
                    converted: false,
                    meta,
                })
            }
        }
    }

    /// One probe, cut off at `timeout` even if the probe overruns it
    async fn attempt(&self, url: &str, timeout: Duration) -> ValidationResult<ProbeResponse> {
        tokio::time::timeout(timeout, self.probe.probe(url, timeout))
            .await
            .unwrap_or_else(|_| {
                Err(ValidationError::Timeout {
                    url: UrlUtils::obfuscate_credentials(url),
                    timeout_ms: timeout.as_millis() as u64,
                })
            })
    }
}

impl std::fmt::Debug for SchemeNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeNormalizer")
            .field("convert_https_to_http", &self.convert_https_to_http)
            .field("skip_https_if_http_fails", &self.skip_https_if_http_fails)
            .finish_non_exhaustive()
    }
}

fn record_response(meta: &mut OutcomeMeta, response: &ProbeResponse) {
    meta.status = Some(response.status);
    meta.response_time_ms = Some(response.elapsed.as_millis() as u64);
}

fn record_error(meta: &mut OutcomeMeta, error: &ValidationError) {
    meta.error = Some(error.to_string());
    meta.error_code = Some(error.code().to_string());
    if let ValidationError::HttpStatus { status, .. } = error {
        meta.status = Some(*status);
    }
}
