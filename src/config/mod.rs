use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use crate::errors::{ConfigResult, ValidationError, ValidationResult};
use defaults::*;

/// What a critical error does to the rest of a parallel run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalErrorPolicy {
    /// Fail the whole call and surface the error to the caller
    #[default]
    AbortRun,
    /// Mark the rest of the affected chunk invalid and keep going
    AbortChunk,
}

/// Channel validation behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// When false every channel is returned as valid without probing
    pub enabled: bool,
    /// Deadline for one probe, including scheme fallback
    #[serde(with = "duration_serde::duration")]
    pub probe_timeout: Duration,
    /// How long a cached result stays usable
    #[serde(with = "duration_serde::duration")]
    pub cache_ttl: Duration,
    /// Maximum number of cached URLs
    pub cache_capacity: usize,
    /// Channels per chunk in the parallel path
    pub chunk_size: usize,
    /// Channels probed together in the simple batch path
    pub batch_size: usize,
    /// Configured lane count for the parallel path
    pub concurrency: usize,
    /// Absolute ceiling on lanes regardless of configuration
    pub lane_hard_cap: usize,
    /// Try the plain http:// variant of https:// URLs first
    pub convert_https_to_http: bool,
    /// Report invalid when the downgraded variant fails instead of retrying the original
    pub skip_https_if_http_fails: bool,
    /// Collapse channels sharing a stream URL before probing
    pub deduplicate: bool,
    pub critical_error_policy: CriticalErrorPolicy,
    /// Processed items between progress log lines
    pub progress_interval: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_VALIDATION_ENABLED,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_LANE_CONCURRENCY,
            lane_hard_cap: DEFAULT_LANE_HARD_CAP,
            convert_https_to_http: DEFAULT_CONVERT_HTTPS_TO_HTTP,
            skip_https_if_http_fails: DEFAULT_SKIP_HTTPS_IF_HTTP_FAILS,
            deduplicate: DEFAULT_DEDUPLICATE,
            critical_error_policy: CriticalErrorPolicy::default(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// Adaptive concurrency controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub min_limit: usize,
    pub max_limit: usize,
    /// Starting ceiling, defaults to `max_limit`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_limit: Option<usize>,
    #[serde(with = "duration_serde::duration")]
    pub sample_interval: Duration,
    /// System memory usage (0-100) above which probes are throttled
    pub memory_threshold_percent: f64,
    /// System CPU usage (0-100) above which probes are throttled
    pub cpu_threshold_percent: f64,
    /// Permits restored per calm sample while recovering
    pub recovery_step: usize,
    /// Disable to keep the limit fixed at `initial_limit`
    pub adaptive: bool,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            min_limit: DEFAULT_MIN_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            initial_limit: None,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            memory_threshold_percent: DEFAULT_MEMORY_THRESHOLD_PERCENT,
            cpu_threshold_percent: DEFAULT_CPU_THRESHOLD_PERCENT,
            recovery_step: DEFAULT_RECOVERY_STEP,
            adaptive: DEFAULT_ADAPTIVE,
        }
    }
}

impl ConcurrencyConfig {
    /// Initial limit clamped into `[min_limit, max_limit]`
    pub fn effective_initial_limit(&self) -> usize {
        self.initial_limit
            .unwrap_or(self.max_limit)
            .clamp(self.min_limit, self.max_limit)
    }
}

/// HTTP probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpProbeConfig {
    pub user_agent: String,
    /// Status patterns treated as reachable, e.g. "2xx" or "206"
    pub acceptable_status_codes: Vec<String>,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    /// Retry with a ranged GET when a server rejects HEAD
    pub get_fallback_on_head_rejection: bool,
}

impl Default for HttpProbeConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            acceptable_status_codes: DEFAULT_ACCEPTABLE_STATUS_CODES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            follow_redirects: DEFAULT_FOLLOW_REDIRECTS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            get_fallback_on_head_rejection: DEFAULT_GET_FALLBACK_ON_HEAD_REJECTION,
        }
    }
}

/// Extra error patterns checked before the built-in list
///
/// Patterns are regular expressions matched against `code: detail` text.
/// Recoverable patterns are tried first, then critical ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub critical_patterns: Vec<String>,
    pub recoverable_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub validation: ValidationConfig,
    pub concurrency: ConcurrencyConfig,
    pub http: HttpProbeConfig,
    pub classifier: ClassifierConfig,
}

impl ValidatorConfig {
    /// Load configuration layered as defaults, then TOML file, then environment
    ///
    /// A missing file is not an error; environment variables use the
    /// `STREAM_VALIDATOR_` prefix with `__` between section and key, e.g.
    /// `STREAM_VALIDATOR_VALIDATION__PROBE_TIMEOUT=3s`.
    pub fn load<P: AsRef<Path>>(config_file: P) -> ConfigResult<Self> {
        let path = config_file.as_ref();
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        info!("Configuration loaded from: {}", path.display());
        Ok(config)
    }

    /// Write the default configuration as pretty TOML
    pub fn write_default<P: AsRef<Path>>(config_file: P) -> ConfigResult<Self> {
        let default_config = Self::default();
        let contents = toml::to_string_pretty(&default_config)?;
        std::fs::write(config_file.as_ref(), contents)?;
        info!(
            "Created default config file: {}",
            config_file.as_ref().display()
        );
        Ok(default_config)
    }

    /// Reject settings the controller and orchestrator cannot honour
    pub fn validate(&self) -> ValidationResult<()> {
        let c = &self.concurrency;
        if c.min_limit == 0 {
            return Err(ValidationError::invalid_config(
                "concurrency.min_limit",
                "must be at least 1",
            ));
        }
        if c.min_limit > c.max_limit {
            return Err(ValidationError::invalid_config(
                "concurrency.min_limit",
                format!(
                    "min_limit {} exceeds max_limit {}",
                    c.min_limit, c.max_limit
                ),
            ));
        }
        if c.sample_interval.is_zero() {
            return Err(ValidationError::invalid_config(
                "concurrency.sample_interval",
                "must be greater than zero",
            ));
        }
        for (field, value) in [
            ("concurrency.memory_threshold_percent", c.memory_threshold_percent),
            ("concurrency.cpu_threshold_percent", c.cpu_threshold_percent),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(ValidationError::invalid_config(
                    field,
                    format!("{value} is outside (0, 100]"),
                ));
            }
        }

        let v = &self.validation;
        for (field, value) in [
            ("validation.chunk_size", v.chunk_size),
            ("validation.batch_size", v.batch_size),
            ("validation.concurrency", v.concurrency),
            ("validation.lane_hard_cap", v.lane_hard_cap),
            ("validation.cache_capacity", v.cache_capacity),
        ] {
            if value == 0 {
                return Err(ValidationError::invalid_config(
                    field,
                    "must be greater than zero",
                ));
            }
        }
        if v.probe_timeout.is_zero() {
            return Err(ValidationError::invalid_config(
                "validation.probe_timeout",
                "must be greater than zero",
            ));
        }
        if self.http.acceptable_status_codes.is_empty() {
            return Err(ValidationError::invalid_config(
                "http.acceptable_status_codes",
                "at least one status pattern is required",
            ));
        }
        for pattern in self
            .classifier
            .critical_patterns
            .iter()
            .chain(&self.classifier.recoverable_patterns)
        {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(ValidationError::invalid_config(
                    "classifier",
                    format!("invalid pattern '{pattern}': {e}"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ValidatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency.effective_initial_limit(), DEFAULT_MAX_LIMIT);
        assert_eq!(
            config.validation.critical_error_policy,
            CriticalErrorPolicy::AbortRun
        );
    }

    #[test]
    fn test_initial_limit_is_clamped() {
        let config = ConcurrencyConfig {
            min_limit: 4,
            max_limit: 8,
            initial_limit: Some(100),
            ..Default::default()
        };
        assert_eq!(config.effective_initial_limit(), 8);

        let config = ConcurrencyConfig {
            initial_limit: Some(1),
            ..config
        };
        assert_eq!(config.effective_initial_limit(), 4);
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut config = ValidatorConfig::default();
        config.concurrency.min_limit = 30;
        config.concurrency.max_limit = 10;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "EINVALIDCONFIG");
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = ValidatorConfig::default();
        config.validation.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = ValidatorConfig::default();
        config.concurrency.cpu_threshold_percent = 150.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_classifier_pattern() {
        let mut config = ValidatorConfig::default();
        config.classifier.critical_patterns = vec!["(unclosed".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("classifier"));
    }

    #[test]
    #[serial]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[validation]
probe_timeout = "2s"
chunk_size = 100
critical_error_policy = "abort_chunk"

[concurrency]
min_limit = 1
max_limit = 6
"#
        )
        .unwrap();

        let config = ValidatorConfig::load(file.path()).unwrap();
        assert_eq!(config.validation.probe_timeout, Duration::from_secs(2));
        assert_eq!(config.validation.chunk_size, 100);
        assert_eq!(
            config.validation.critical_error_policy,
            CriticalErrorPolicy::AbortChunk
        );
        assert_eq!(config.concurrency.max_limit, 6);
        // Untouched values keep their defaults
        assert_eq!(config.validation.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        figment::Jail::expect_with(|jail| {
            jail.set_env("STREAM_VALIDATOR_VALIDATION__CHUNK_SIZE", "42");
            jail.set_env("STREAM_VALIDATOR_VALIDATION__ENABLED", "false");
            let config = ValidatorConfig::load(&path).map_err(|e| e.to_string())?;
            assert_eq!(config.validation.chunk_size, 42);
            assert!(!config.validation.enabled);
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[concurrency]\nmin_limit = 0").unwrap();
        assert!(ValidatorConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_write_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.toml");
        ValidatorConfig::write_default(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("probe_timeout = \"5s\""));
        let reloaded: ValidatorConfig = toml::from_str(&contents).unwrap();
        assert_eq!(reloaded.validation.chunk_size, DEFAULT_CHUNK_SIZE);
    }
}
