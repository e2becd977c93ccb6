//! Service layer for stream validation
//!
//! Components, leaf first:
//!
//! - [`validation_cache`]: URL to result map with lazy TTL expiry
//! - [`error_classifier`]: critical vs recoverable decision
//! - [`concurrency_controller`]: load-adaptive permit pool
//! - [`stream_probe`]: one reachability check against one URL
//! - [`scheme_normalizer`]: downgraded-scheme-first probing policy
//! - [`reachability_prober`]: cache, normalizer and deadline for one channel
//! - [`run_statistics`]: per-run counters
//! - [`batch_orchestrator`]: chunked, laned runs with fail-fast semantics
//! - [`validation_service`]: the public entry point wiring it all together
//!
//! # Usage
//!
//! ```rust,no_run
//! use stream_validator::config::ValidatorConfig;
//! use stream_validator::models::{Channel, ValidationOptions};
//! use stream_validator::services::ValidationService;
//!
//! # async fn example() -> Result<(), stream_validator::errors::ValidationError> {
//! let service = ValidationService::new(ValidatorConfig::default())?;
//! let channels = vec![Channel::new("a", "News", "https://ok.example/stream")];
//! let report = service
//!     .validate_channels_parallel(&channels, &ValidationOptions::default())
//!     .await?;
//! println!("{} reachable", report.valid_channels.len());
//! # Ok(())
//! # }
//! ```

pub mod batch_orchestrator;
pub mod concurrency_controller;
pub mod error_classifier;
pub mod reachability_prober;
pub mod run_statistics;
pub mod scheme_normalizer;
pub mod stream_probe;
pub mod validation_cache;
pub mod validation_service;

pub use batch_orchestrator::{BatchOrchestrator, RunSettings, RunState};
pub use concurrency_controller::{
    AdaptiveConcurrencyController, ConcurrencyPermit, ConcurrencyState, ThrottleEvent,
};
pub use error_classifier::{ErrorClassifier, ErrorPattern, ErrorSeverity};
pub use reachability_prober::ReachabilityProber;
pub use run_statistics::RunStatistics;
pub use scheme_normalizer::{SchemeNormalizer, SchemeTestResult};
pub use stream_probe::{HttpStreamProbe, ProbeResponse, StreamProbe};
pub use validation_cache::ValidationCache;
pub use validation_service::ValidationService;
