//! Per-channel validation
//!
//! Cache first, then the scheme normalizer bounded by the time its attempts
//! may take together. Fresh results are cached by the original stream URL.
//! Recoverable failures become invalid outcomes; critical ones are returned
//! as errors for the caller to abort on. Counting outcomes is left to the
//! caller, so a standalone check never touches a run's statistics.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::error_classifier::ErrorClassifier;
use super::scheme_normalizer::{SchemeNormalizer, SchemeTestResult};
use super::validation_cache::ValidationCache;
use crate::errors::{ValidationError, ValidationResult};
use crate::models::{Channel, OutcomeSource, ValidationOutcome};
use crate::utils::url::UrlUtils;

pub type SchemeCache = ValidationCache<SchemeTestResult>;

#[derive(Debug, Clone)]
pub struct ReachabilityProber {
    cache: Arc<SchemeCache>,
    normalizer: SchemeNormalizer,
    classifier: Arc<ErrorClassifier>,
    probe_timeout: Duration,
}

impl ReachabilityProber {
    pub fn new(
        cache: Arc<SchemeCache>,
        normalizer: SchemeNormalizer,
        classifier: Arc<ErrorClassifier>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            normalizer,
            classifier,
            probe_timeout,
        }
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Validate one channel
    ///
    /// Never fails for recoverable errors. A critical error is logged and
    /// returned unchanged. `meta.from_cache` and `meta.converted` on the
    /// outcome tell the caller what to count.
    pub async fn validate_channel(&self, channel: &Channel) -> ValidationResult<ValidationOutcome> {
        let url = channel.stream_url.as_str();

        if let Some(cached) = self.cache.get(url).await {
            debug!(
                "Cache hit for channel {} ({})",
                channel.id,
                UrlUtils::obfuscate_credentials(url)
            );
            return Ok(self.finish(channel, cached, true));
        }

        let budget = self.normalizer.attempt_budget(url, self.probe_timeout);
        let result = tokio::time::timeout(
            budget,
            self.normalizer.test_schemes(url, self.probe_timeout),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ValidationError::Timeout {
                url: UrlUtils::obfuscate_credentials(url),
                timeout_ms: budget.as_millis() as u64,
            })
        });

        match result {
            Ok(scheme_result) => {
                self.cache.set(url, scheme_result.clone()).await;
                Ok(self.finish(channel, scheme_result, false))
            }
            Err(e) if self.classifier.is_critical(&e) => {
                error!(
                    "Critical error validating channel {} ({}): [{}] {}",
                    channel.id,
                    UrlUtils::obfuscate_credentials(url),
                    e.code(),
                    e
                );
                Err(e)
            }
            Err(e) => {
                warn!(
                    "Channel {} failed validation ({}): {}",
                    channel.id,
                    UrlUtils::obfuscate_credentials(url),
                    e
                );
                Ok(ValidationOutcome::failed(channel, &e))
            }
        }
    }

    fn finish(
        &self,
        channel: &Channel,
        result: SchemeTestResult,
        from_cache: bool,
    ) -> ValidationOutcome {
        let source = match (from_cache, result.converted, result.is_valid) {
            (true, _, _) => OutcomeSource::Cache,
            (false, true, _) => OutcomeSource::Converted,
            (false, false, true) => OutcomeSource::Probe,
            (false, false, false) => OutcomeSource::Error,
        };
        if !result.is_valid && !from_cache {
            warn!(
                "Channel {} failed validation ({}): {}",
                channel.id,
                UrlUtils::obfuscate_credentials(&channel.stream_url),
                result.meta.error.as_deref().unwrap_or("no detail")
            );
        }

        let preferred = result.converted.then_some(result.preferred_url.as_str());
        let annotated = channel.with_validation(result.is_valid, preferred);
        let mut meta = result.meta;
        meta.from_cache = from_cache;

        ValidationOutcome::new(annotated, result.is_valid, source, meta)
    }
}
