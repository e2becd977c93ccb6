//! Stream validation service
//!
//! Entry point for callers. Wires the cache, classifier, probe, scheme
//! normalizer, concurrency controller and orchestrator together from one
//! [`ValidatorConfig`] and exposes the public validation operations.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::batch_orchestrator::{BatchOrchestrator, RunState};
use super::concurrency_controller::{
    AdaptiveConcurrencyController, ConcurrencyState, ThrottleEvent,
};
use super::error_classifier::ErrorClassifier;
use super::reachability_prober::{ReachabilityProber, SchemeCache};
use super::run_statistics::RunStatistics;
use super::scheme_normalizer::SchemeNormalizer;
use super::stream_probe::{HttpStreamProbe, StreamProbe};
use super::validation_cache::ValidationCache;
use crate::config::ValidatorConfig;
use crate::errors::ValidationResult;
use crate::models::{
    Channel, OutcomeMeta, OutcomeSource, StatsSnapshot, ValidationOptions, ValidationOutcome,
    ValidationReport,
};
use crate::utils::system_load::{LoadSampler, SystemLoadSampler};

pub struct ValidationService {
    config: ValidatorConfig,
    cache: Arc<SchemeCache>,
    stats: Arc<RunStatistics>,
    prober: ReachabilityProber,
    orchestrator: BatchOrchestrator,
}

impl ValidationService {
    /// Service probing over HTTP with load sampling from sysinfo
    pub fn new(config: ValidatorConfig) -> ValidationResult<Self> {
        let probe = Arc::new(HttpStreamProbe::new(&config.http)?);
        Self::with_components(config, probe, Some(Arc::new(SystemLoadSampler::new())))
    }

    /// Service with a custom probe and a fixed concurrency limit
    pub fn with_probe(config: ValidatorConfig, probe: Arc<dyn StreamProbe>) -> ValidationResult<Self> {
        Self::with_components(config, probe, None)
    }

    pub fn with_components(
        config: ValidatorConfig,
        probe: Arc<dyn StreamProbe>,
        sampler: Option<Arc<dyn LoadSampler>>,
    ) -> ValidationResult<Self> {
        config.validate()?;

        let validation = &config.validation;
        let classifier = Arc::new(ErrorClassifier::from_config(&config.classifier)?);
        let cache = Arc::new(ValidationCache::new(
            validation.cache_ttl,
            validation.cache_capacity,
        ));
        let stats = Arc::new(RunStatistics::new());

        let normalizer = SchemeNormalizer::new(
            probe,
            classifier.clone(),
            validation.convert_https_to_http,
            validation.skip_https_if_http_fails,
        );
        let prober = ReachabilityProber::new(
            cache.clone(),
            normalizer,
            classifier,
            validation.probe_timeout,
        );
        let controller = AdaptiveConcurrencyController::new(&config.concurrency);

        let mut orchestrator = BatchOrchestrator::new(
            prober.clone(),
            controller,
            stats.clone(),
            validation.clone(),
        );
        if let Some(sampler) = sampler {
            orchestrator = orchestrator.with_load_sampler(sampler);
        }

        info!(
            "Stream validation service ready (enabled: {}, timeout: {:?}, concurrency {}..{})",
            validation.enabled,
            validation.probe_timeout,
            config.concurrency.min_limit,
            config.concurrency.max_limit
        );

        Ok(Self {
            config,
            cache,
            stats,
            prober,
            orchestrator,
        })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a single channel
    ///
    /// Returns `Err` only for critical errors. Shares the cache and the
    /// concurrency limit with runs but leaves run statistics alone.
    pub async fn validate_channel(&self, channel: &Channel) -> ValidationResult<ValidationOutcome> {
        if !self.config.validation.enabled {
            return Ok(ValidationOutcome::new(
                channel.with_validation(true, None),
                true,
                OutcomeSource::Disabled,
                OutcomeMeta::default(),
            ));
        }
        let _permit = self.orchestrator.controller().acquire().await;
        self.prober.validate_channel(channel).await
    }

    /// Validate in simple fixed-size batches, for smaller inputs
    pub async fn validate_channels_batch(
        &self,
        channels: &[Channel],
        options: &ValidationOptions,
    ) -> ValidationResult<ValidationReport> {
        self.orchestrator
            .validate_channels_batch(channels, options)
            .await
    }

    /// Validate with chunking and parallel lanes, for large inputs
    pub async fn validate_channels_parallel(
        &self,
        channels: &[Channel],
        options: &ValidationOptions,
    ) -> ValidationResult<ValidationReport> {
        self.orchestrator
            .validate_channels_parallel(channels, options)
            .await
    }

    pub fn get_validation_stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("Validation cache cleared");
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.len().await
    }

    pub async fn purge_expired(&self) -> usize {
        let purged = self.cache.purge_expired().await;
        debug!("Purged {} expired validation results", purged);
        purged
    }

    pub fn run_state(&self) -> RunState {
        self.orchestrator.run_state()
    }

    pub fn concurrency_state(&self) -> ConcurrencyState {
        self.orchestrator.controller().snapshot()
    }

    pub fn subscribe_throttle_events(&self) -> broadcast::Receiver<ThrottleEvent> {
        self.orchestrator.controller().subscribe()
    }
}

impl std::fmt::Debug for ValidationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationService")
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}
