//! Validation outcome and run report types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::channel::Channel;
use crate::config::CriticalErrorPolicy;

/// Which path produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSource {
    /// Served from the validation cache
    Cache,
    /// Probed using the channel's own URL
    Probe,
    /// Probed successfully using the downgraded scheme
    Converted,
    /// Validation disabled, passed through untouched
    Disabled,
    /// Probe failed with a recoverable error
    Error,
    /// Never probed because its chunk was abandoned
    Aborted,
}

/// Per-outcome annotations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeMeta {
    #[serde(default)]
    pub from_cache: bool,
    #[serde(default)]
    pub converted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default)]
    pub https_skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// URLs tried, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scheme_attempts: Vec<String>,
}

/// Result of validating one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    /// Annotated copy of the input channel
    pub channel: Channel,
    pub is_valid: bool,
    pub source: OutcomeSource,
    pub meta: OutcomeMeta,
    pub checked_at: DateTime<Utc>,
}

impl ValidationOutcome {
    pub fn new(channel: Channel, is_valid: bool, source: OutcomeSource, meta: OutcomeMeta) -> Self {
        Self {
            channel,
            is_valid,
            source,
            meta,
            checked_at: Utc::now(),
        }
    }

    /// Outcome for a channel whose probe failed with a recoverable error
    pub fn failed(channel: &Channel, error: &crate::errors::ValidationError) -> Self {
        Self::new(
            channel.with_validation(false, None),
            false,
            OutcomeSource::Error,
            OutcomeMeta {
                error: Some(error.to_string()),
                error_code: Some(error.code().to_string()),
                ..Default::default()
            },
        )
    }

    /// Outcome for a channel that was never probed because its chunk was abandoned
    pub fn aborted(channel: &Channel, reason: &str) -> Self {
        Self::new(
            channel.with_validation(false, None),
            false,
            OutcomeSource::Aborted,
            OutcomeMeta {
                error: Some(reason.to_string()),
                error_code: Some("EABORTED".to_string()),
                ..Default::default()
            },
        )
    }
}

/// Read-only snapshot of run statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_processed: u64,
    pub valid_count: u64,
    pub invalid_count: u64,
    pub cache_hits: u64,
    pub conversions: u64,
    pub duplicates_removed: u64,
    pub throttle_events: u64,
    pub elapsed_ms: u64,
}

/// Partitioned result of a batch or parallel run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid_channels: Vec<Channel>,
    pub invalid_channels: Vec<Channel>,
    pub stats: StatsSnapshot,
}

impl ValidationReport {
    /// Split outcomes by validity, keeping input order within each side
    pub fn from_outcomes(outcomes: Vec<ValidationOutcome>, stats: StatsSnapshot) -> Self {
        let (valid, invalid): (Vec<_>, Vec<_>) =
            outcomes.into_iter().partition(|outcome| outcome.is_valid);
        Self {
            valid_channels: valid.into_iter().map(|o| o.channel).collect(),
            invalid_channels: invalid.into_iter().map(|o| o.channel).collect(),
            stats,
        }
    }
}

/// Per-call overrides of the configured validation settings
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    pub concurrency: Option<usize>,
    pub chunk_size: Option<usize>,
    pub batch_size: Option<usize>,
    pub deduplicate: Option<bool>,
    pub critical_error_policy: Option<CriticalErrorPolicy>,
}
