/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
use std::time::Duration;

// Validation defaults
pub const DEFAULT_VALIDATION_ENABLED: bool = true;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_CACHE_CAPACITY: usize = 50_000;
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_BATCH_SIZE: usize = 25;
pub const DEFAULT_LANE_CONCURRENCY: usize = 20;
pub const DEFAULT_LANE_HARD_CAP: usize = 64;
pub const DEFAULT_CONVERT_HTTPS_TO_HTTP: bool = true;
pub const DEFAULT_SKIP_HTTPS_IF_HTTP_FAILS: bool = false;
pub const DEFAULT_DEDUPLICATE: bool = true;
pub const DEFAULT_PROGRESS_INTERVAL: usize = 250;

// Adaptive concurrency defaults
pub const DEFAULT_MIN_LIMIT: usize = 2;
pub const DEFAULT_MAX_LIMIT: usize = 20;
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MEMORY_THRESHOLD_PERCENT: f64 = 85.0;
pub const DEFAULT_CPU_THRESHOLD_PERCENT: f64 = 90.0;
pub const DEFAULT_RECOVERY_STEP: usize = 2;
pub const DEFAULT_ADAPTIVE: bool = true;

// HTTP probe defaults
pub const DEFAULT_USER_AGENT: &str = concat!("stream-validator/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_ACCEPTABLE_STATUS_CODES: &[&str] = &["2xx"];
pub const DEFAULT_FOLLOW_REDIRECTS: bool = true;
pub const DEFAULT_MAX_REDIRECTS: usize = 5;
pub const DEFAULT_GET_FALLBACK_ON_HEAD_REJECTION: bool = true;

// Environment
pub const ENV_PREFIX: &str = "STREAM_VALIDATOR_";
pub const DEFAULT_CONFIG_FILE: &str = "stream-validator.toml";
