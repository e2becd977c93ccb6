//! Batch and parallel validation runs
//!
//! A run moves `Idle -> Running -> Completed | Aborted`. The parallel path
//! splits the (deduplicated) input into chunks to bound memory and give
//! progress checkpoints, then drains each chunk with a fixed pool of lanes
//! pulling indices from a shared queue. Every probe holds a permit from the
//! adaptive concurrency controller. The first critical error cancels the
//! sibling lanes; the configured [`CriticalErrorPolicy`] decides whether the
//! whole call fails or only the rest of that chunk is marked aborted.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::concurrency_controller::{AdaptiveConcurrencyController, ThrottleEvent};
use super::reachability_prober::ReachabilityProber;
use super::run_statistics::RunStatistics;
use crate::config::{CriticalErrorPolicy, ValidationConfig};
use crate::errors::{ValidationError, ValidationResult};
use crate::models::{Channel, ValidationOptions, ValidationOutcome, ValidationReport};
use crate::utils::human_format::{format_duration, format_percent, format_rate};
use crate::utils::system_load::LoadSampler;
use crate::utils::url::UrlUtils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Aborted,
}

/// Effective settings for one run, config overlaid with call options
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub chunk_size: usize,
    pub batch_size: usize,
    pub concurrency: usize,
    pub lane_hard_cap: usize,
    pub deduplicate: bool,
    pub critical_error_policy: CriticalErrorPolicy,
    pub progress_interval: usize,
}

impl RunSettings {
    pub fn resolve(
        config: &ValidationConfig,
        options: &ValidationOptions,
    ) -> ValidationResult<Self> {
        let settings = Self {
            chunk_size: options.chunk_size.unwrap_or(config.chunk_size),
            batch_size: options.batch_size.unwrap_or(config.batch_size),
            concurrency: options.concurrency.unwrap_or(config.concurrency),
            lane_hard_cap: config.lane_hard_cap,
            deduplicate: options.deduplicate.unwrap_or(config.deduplicate),
            critical_error_policy: options
                .critical_error_policy
                .unwrap_or(config.critical_error_policy),
            progress_interval: config.progress_interval,
        };
        for (field, value) in [
            ("chunk_size", settings.chunk_size),
            ("batch_size", settings.batch_size),
            ("concurrency", settings.concurrency),
        ] {
            if value == 0 {
                return Err(ValidationError::invalid_config(
                    field,
                    "must be greater than zero",
                ));
            }
        }
        Ok(settings)
    }

    /// Lanes for a chunk: `min(concurrency, chunk_len, hard_cap)`, at least one
    pub fn lane_count(&self, chunk_len: usize) -> usize {
        self.concurrency
            .min(chunk_len)
            .min(self.lane_hard_cap)
            .max(1)
    }
}

/// Collapse channels whose stream URLs are the same after normalization
///
/// The first occurrence wins and input order is kept.
pub fn deduplicate_channels(channels: &[Channel]) -> (Vec<Channel>, usize) {
    let mut seen = HashSet::with_capacity(channels.len());
    let unique: Vec<Channel> = channels
        .iter()
        .filter(|channel| seen.insert(UrlUtils::dedup_key(&channel.stream_url)))
        .cloned()
        .collect();
    let removed = channels.len() - unique.len();
    (unique, removed)
}

/// Logs progress every `interval` channels instead of on every item
struct ProgressReporter {
    total: usize,
    interval: usize,
    done: AtomicUsize,
    stats: Arc<RunStatistics>,
}

impl ProgressReporter {
    fn new(total: usize, interval: usize, stats: Arc<RunStatistics>) -> Self {
        Self {
            total,
            interval,
            done: AtomicUsize::new(0),
            stats,
        }
    }

    fn advance(&self, count: usize) {
        let before = self.done.fetch_add(count, Ordering::Relaxed);
        let done = before + count;
        let crossed = self.interval > 0 && done / self.interval > before / self.interval;
        if crossed && done < self.total {
            let snapshot = self.stats.snapshot();
            let running_ms = self.stats.running_ms();
            info!(
                "Validation progress: {}/{} ({}), {} valid, {} invalid, {} cache hits, {}",
                done,
                self.total,
                format_percent(done, self.total),
                snapshot.valid_count,
                snapshot.invalid_count,
                snapshot.cache_hits,
                format_rate(done as u64, running_ms)
            );
        }
    }
}

/// Counts throttling transitions for the duration of a run
struct ThrottleWatcher {
    task: JoinHandle<()>,
}

impl ThrottleWatcher {
    fn spawn(mut events: broadcast::Receiver<ThrottleEvent>, stats: Arc<RunStatistics>) -> Self {
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        stats.record_throttle_event();
                        debug!("Run observed throttle event, limit now {}", event.limit());
                    }
                    Err(RecvError::Lagged(missed)) => {
                        for _ in 0..missed {
                            stats.record_throttle_event();
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }
}

impl Drop for ThrottleWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Marks the run aborted if it is dropped before finishing
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
    finished: bool,
}

impl RunGuard<'_> {
    fn finish(mut self, state: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        self.finished = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.state.lock().unwrap_or_else(PoisonError::into_inner) = RunState::Aborted;
        }
    }
}

/// Shared state of the lanes working one chunk
struct LaneContext {
    chunk: Arc<[Channel]>,
    next: AtomicUsize,
    cancel: CancellationToken,
    /// First critical error and the index it happened at
    critical: OnceLock<(Option<usize>, ValidationError)>,
    prober: ReachabilityProber,
    controller: AdaptiveConcurrencyController,
    stats: Arc<RunStatistics>,
    progress: Arc<ProgressReporter>,
}

impl LaneContext {
    fn fail(&self, index: Option<usize>, error: ValidationError) {
        if self.critical.set((index, error)).is_ok() {
            debug!("Cancelling sibling lanes after critical error");
        }
        self.cancel.cancel();
    }
}

/// Pull channels off the shared queue one at a time until it is empty or cancelled
async fn run_lane(ctx: Arc<LaneContext>) -> Vec<(usize, ValidationOutcome)> {
    let mut outcomes = Vec::new();
    while !ctx.cancel.is_cancelled() {
        let index = ctx.next.fetch_add(1, Ordering::SeqCst);
        let Some(channel) = ctx.chunk.get(index) else {
            break;
        };

        let permit = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            permit = ctx.controller.acquire() => permit,
        };
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            result = ctx.prober.validate_channel(channel) => result,
        };
        permit.release();

        match result {
            Ok(outcome) => {
                ctx.stats.record_outcome(&outcome);
                outcomes.push((index, outcome));
                ctx.progress.advance(1);
            }
            Err(e) => {
                ctx.fail(Some(index), e);
                break;
            }
        }
    }
    outcomes
}

/// Runs validation over channel lists
pub struct BatchOrchestrator {
    prober: ReachabilityProber,
    controller: AdaptiveConcurrencyController,
    stats: Arc<RunStatistics>,
    config: ValidationConfig,
    sampler: Option<Arc<dyn LoadSampler>>,
    state: Mutex<RunState>,
}

impl BatchOrchestrator {
    pub fn new(
        prober: ReachabilityProber,
        controller: AdaptiveConcurrencyController,
        stats: Arc<RunStatistics>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            prober,
            controller,
            stats,
            config,
            sampler: None,
            state: Mutex::new(RunState::Idle),
        }
    }

    /// Sample system load while a run is in progress
    pub fn with_load_sampler(mut self, sampler: Arc<dyn LoadSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn run_state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn controller(&self) -> &AdaptiveConcurrencyController {
        &self.controller
    }

    fn begin_run(&self) -> ValidationResult<RunGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == RunState::Running {
            return Err(ValidationError::ServiceUnavailable {
                service: "batch_orchestrator".to_string(),
                message: "a validation run is already in progress".to_string(),
            });
        }
        *state = RunState::Running;
        Ok(RunGuard {
            state: &self.state,
            finished: false,
        })
    }

    /// Every channel passes through as valid when validation is disabled
    ///
    /// Stream URLs are left alone; only the `validated` flag is set.
    fn disabled_report(&self, channels: &[Channel]) -> ValidationReport {
        debug!(
            "Validation disabled, passing {} channels through",
            channels.len()
        );
        self.stats.reset();
        ValidationReport {
            valid_channels: channels
                .iter()
                .map(|channel| channel.with_validation(true, None))
                .collect(),
            invalid_channels: Vec::new(),
            stats: Default::default(),
        }
    }

    /// Shared run prologue: settings, stats reset, dedup
    fn prepare(
        &self,
        channels: &[Channel],
        options: &ValidationOptions,
    ) -> ValidationResult<(RunSettings, Vec<Channel>)> {
        let settings = RunSettings::resolve(&self.config, options)?;
        self.stats.reset();

        let channels = if settings.deduplicate {
            let (unique, removed) = deduplicate_channels(channels);
            if removed > 0 {
                info!("Removed {} duplicate stream URLs before validation", removed);
                self.stats.record_duplicates(removed as u64);
            }
            unique
        } else {
            channels.to_vec()
        };
        Ok((settings, channels))
    }

    fn finish_run(
        &self,
        guard: RunGuard<'_>,
        result: ValidationResult<Vec<ValidationOutcome>>,
    ) -> ValidationResult<ValidationReport> {
        self.stats.finalize();
        let stats = self.stats.snapshot();
        match result {
            Ok(outcomes) => {
                guard.finish(RunState::Completed);
                info!(
                    "Validation completed: {} valid, {} invalid, {} cache hits, {} conversions in {}",
                    stats.valid_count,
                    stats.invalid_count,
                    stats.cache_hits,
                    stats.conversions,
                    format_duration(stats.elapsed_ms)
                );
                Ok(ValidationReport::from_outcomes(outcomes, stats))
            }
            Err(e) => {
                guard.finish(RunState::Aborted);
                error!(
                    "Validation run aborted after {} channels in {}: {}",
                    stats.total_processed,
                    format_duration(stats.elapsed_ms),
                    e
                );
                Err(e)
            }
        }
    }

    /// High-throughput path: chunks drained by a pool of lanes
    pub async fn validate_channels_parallel(
        &self,
        channels: &[Channel],
        options: &ValidationOptions,
    ) -> ValidationResult<ValidationReport> {
        if !self.config.enabled {
            return Ok(self.disabled_report(channels));
        }

        let guard = self.begin_run()?;
        let (settings, channels) = match self.prepare(channels, options) {
            Ok(prepared) => prepared,
            Err(e) => return self.finish_run(guard, Err(e)),
        };

        let _sampling = self
            .sampler
            .as_ref()
            .map(|sampler| self.controller.start_sampling(sampler.clone()));
        let _watcher = ThrottleWatcher::spawn(self.controller.subscribe(), self.stats.clone());
        let progress = Arc::new(ProgressReporter::new(
            channels.len(),
            settings.progress_interval,
            self.stats.clone(),
        ));

        let chunk_count = channels.len().div_ceil(settings.chunk_size);
        info!(
            "Validating {} channels in {} chunks of up to {} ({} lanes max)",
            channels.len(),
            chunk_count,
            settings.chunk_size,
            settings.lane_count(settings.chunk_size)
        );

        let mut outcomes = Vec::with_capacity(channels.len());
        let mut result = Ok(());
        for (chunk_index, chunk) in channels.chunks(settings.chunk_size).enumerate() {
            debug!(
                "Starting chunk {}/{} ({} channels)",
                chunk_index + 1,
                chunk_count,
                chunk.len()
            );
            match self.run_chunk(chunk, &settings, progress.clone()).await {
                Ok(chunk_outcomes) => outcomes.extend(chunk_outcomes),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        self.finish_run(guard, result.map(|_| outcomes))
    }

    async fn run_chunk(
        &self,
        chunk: &[Channel],
        settings: &RunSettings,
        progress: Arc<ProgressReporter>,
    ) -> ValidationResult<Vec<ValidationOutcome>> {
        let ctx = Arc::new(LaneContext {
            chunk: Arc::from(chunk.to_vec()),
            next: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
            critical: OnceLock::new(),
            prober: self.prober.clone(),
            controller: self.controller.clone(),
            stats: self.stats.clone(),
            progress: progress.clone(),
        });

        let lane_count = settings.lane_count(chunk.len());
        let mut lanes = JoinSet::new();
        for _ in 0..lane_count {
            lanes.spawn(run_lane(ctx.clone()));
        }

        let mut slots: Vec<Option<ValidationOutcome>> = vec![None; chunk.len()];
        while let Some(joined) = lanes.join_next().await {
            match joined {
                Ok(lane_outcomes) => {
                    for (index, outcome) in lane_outcomes {
                        slots[index] = Some(outcome);
                    }
                }
                Err(e) => {
                    error!("Validation lane failed: {}", e);
                    ctx.fail(None, ValidationError::aborted(format!("lane task failed: {e}")));
                }
            }
        }

        if let Some((failed_index, error)) = ctx.critical.get() {
            match settings.critical_error_policy {
                CriticalErrorPolicy::AbortRun => return Err(error.clone()),
                CriticalErrorPolicy::AbortChunk => {
                    let reason = format!("chunk abandoned after critical error: {error}");
                    let mut abandoned = 0;
                    for (index, slot) in slots.iter_mut().enumerate() {
                        if slot.is_some() {
                            continue;
                        }
                        let channel = &chunk[index];
                        let outcome = if *failed_index == Some(index) {
                            ValidationOutcome::failed(channel, error)
                        } else {
                            abandoned += 1;
                            ValidationOutcome::aborted(channel, &reason)
                        };
                        self.stats.record_outcome(&outcome);
                        progress.advance(1);
                        *slot = Some(outcome);
                    }
                    warn!(
                        "Critical error [{}] abandoned {} channels of a {} channel chunk, continuing",
                        error.code(),
                        abandoned,
                        chunk.len()
                    );
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Simple path: fixed-size batches probed together, no lane splitting
    pub async fn validate_channels_batch(
        &self,
        channels: &[Channel],
        options: &ValidationOptions,
    ) -> ValidationResult<ValidationReport> {
        if !self.config.enabled {
            return Ok(self.disabled_report(channels));
        }

        let guard = self.begin_run()?;
        let (settings, channels) = match self.prepare(channels, options) {
            Ok(prepared) => prepared,
            Err(e) => return self.finish_run(guard, Err(e)),
        };

        let _sampling = self
            .sampler
            .as_ref()
            .map(|sampler| self.controller.start_sampling(sampler.clone()));
        let _watcher = ThrottleWatcher::spawn(self.controller.subscribe(), self.stats.clone());
        let progress = ProgressReporter::new(
            channels.len(),
            settings.progress_interval,
            self.stats.clone(),
        );

        info!(
            "Validating {} channels in batches of {}",
            channels.len(),
            settings.batch_size
        );

        let mut outcomes = Vec::with_capacity(channels.len());
        let mut result = Ok(());
        for batch in channels.chunks(settings.batch_size) {
            match self.run_batch(batch, &settings).await {
                Ok(batch_outcomes) => {
                    progress.advance(batch_outcomes.len());
                    outcomes.extend(batch_outcomes);
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        self.finish_run(guard, result.map(|_| outcomes))
    }

    async fn run_batch(
        &self,
        batch: &[Channel],
        settings: &RunSettings,
    ) -> ValidationResult<Vec<ValidationOutcome>> {
        let probes = batch.iter().map(|channel| async move {
            let _permit = self.controller.acquire().await;
            self.prober.validate_channel(channel).await
        });

        match settings.critical_error_policy {
            // The first critical error drops the rest of the batch's probes
            CriticalErrorPolicy::AbortRun => {
                let outcomes = futures::future::try_join_all(probes).await?;
                for outcome in &outcomes {
                    self.stats.record_outcome(outcome);
                }
                Ok(outcomes)
            }
            CriticalErrorPolicy::AbortChunk => {
                let results = futures::future::join_all(probes).await;
                let outcomes = batch
                    .iter()
                    .zip(results)
                    .map(|(channel, result)| {
                        let outcome = result.unwrap_or_else(|e| {
                            warn!(
                                "Critical error [{}] on channel {}, continuing with remaining batches",
                                e.code(),
                                channel.id
                            );
                            ValidationOutcome::failed(channel, &e)
                        });
                        self.stats.record_outcome(&outcome);
                        outcome
                    })
                    .collect();
                Ok(outcomes)
            }
        }
    }
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("state", &self.run_state())
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(concurrency: usize, hard_cap: usize) -> RunSettings {
        RunSettings {
            concurrency,
            lane_hard_cap: hard_cap,
            ..RunSettings::resolve(&ValidationConfig::default(), &ValidationOptions::default())
                .unwrap()
        }
    }

    #[test]
    fn test_lane_count_is_smallest_bound() {
        assert_eq!(settings(20, 64).lane_count(500), 20);
        assert_eq!(settings(20, 64).lane_count(3), 3);
        assert_eq!(settings(200, 64).lane_count(500), 64);
        assert_eq!(settings(20, 64).lane_count(0), 1);
    }

    #[test]
    fn test_options_override_config() {
        let options = ValidationOptions {
            concurrency: Some(4),
            chunk_size: Some(10),
            critical_error_policy: Some(CriticalErrorPolicy::AbortChunk),
            ..Default::default()
        };
        let resolved = RunSettings::resolve(&ValidationConfig::default(), &options).unwrap();
        assert_eq!(resolved.concurrency, 4);
        assert_eq!(resolved.chunk_size, 10);
        assert_eq!(resolved.critical_error_policy, CriticalErrorPolicy::AbortChunk);
        assert!(resolved.deduplicate);
    }

    #[test]
    fn test_zero_override_is_rejected() {
        let options = ValidationOptions {
            chunk_size: Some(0),
            ..Default::default()
        };
        let err = RunSettings::resolve(&ValidationConfig::default(), &options).unwrap_err();
        assert_eq!(err.code(), "EINVALIDCONFIG");
    }

    #[test]
    fn test_deduplicate_keeps_first_occurrence() {
        let channels = vec![
            Channel::new("1", "One", "https://Ok.Example/stream/"),
            Channel::new("2", "Two", "http://other.example/live"),
            Channel::new("3", "One again", "http://ok.example/stream"),
        ];
        let (unique, removed) = deduplicate_channels(&channels);
        assert_eq!(removed, 1);
        let ids: Vec<_> = unique.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_run_guard_marks_abandoned_run_aborted() {
        let state = Mutex::new(RunState::Running);
        drop(RunGuard {
            state: &state,
            finished: false,
        });
        assert_eq!(*state.lock().unwrap(), RunState::Aborted);

        let state = Mutex::new(RunState::Running);
        RunGuard {
            state: &state,
            finished: false,
        }
        .finish(RunState::Completed);
        assert_eq!(*state.lock().unwrap(), RunState::Completed);
    }
}
