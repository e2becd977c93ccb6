//! Per-run validation counters
//!
//! Counters only ever increase during a run and are reset when the next run
//! starts. Lanes update them concurrently, so each one is an atomic.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

use crate::models::{StatsSnapshot, ValidationOutcome};

#[derive(Debug, Default)]
pub struct RunStatistics {
    total_processed: AtomicU64,
    valid_count: AtomicU64,
    invalid_count: AtomicU64,
    cache_hits: AtomicU64,
    conversions: AtomicU64,
    duplicates_removed: AtomicU64,
    throttle_events: AtomicU64,
    elapsed_ms: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter and start the run clock
    pub fn reset(&self) {
        for counter in [
            &self.total_processed,
            &self.valid_count,
            &self.invalid_count,
            &self.cache_hits,
            &self.conversions,
            &self.duplicates_removed,
            &self.throttle_events,
            &self.elapsed_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        if let Ok(mut started_at) = self.started_at.lock() {
            *started_at = Some(Instant::now());
        }
    }

    /// Count one finished channel, including its cache hit and conversion flags
    pub fn record_outcome(&self, outcome: &ValidationOutcome) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        if outcome.is_valid {
            self.valid_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.invalid_count.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.meta.from_cache {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.meta.converted {
            self.conversions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_duplicates(&self, count: u64) {
        self.duplicates_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_throttle_event(&self) {
        self.throttle_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_processed(&self) -> u64 {
        self.total_processed.load(Ordering::Relaxed)
    }

    /// Freeze `elapsed_ms` at the time since the last reset
    pub fn finalize(&self) {
        let started_at = self.started_at.lock().ok().and_then(|guard| *guard);
        if let Some(started_at) = started_at {
            self.elapsed_ms
                .store(started_at.elapsed().as_millis() as u64, Ordering::Relaxed);
        }
    }

    /// Milliseconds since the last reset, live while a run is in progress
    pub fn running_ms(&self) -> u64 {
        self.started_at
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_processed: self.total_processed.load(Ordering::Relaxed),
            valid_count: self.valid_count.load(Ordering::Relaxed),
            invalid_count: self.invalid_count.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            conversions: self.conversions.load(Ordering::Relaxed),
            duplicates_removed: self.duplicates_removed.load(Ordering::Relaxed),
            throttle_events: self.throttle_events.load(Ordering::Relaxed),
            elapsed_ms: self.elapsed_ms.load(Ordering::Relaxed),
        }
    }
}
