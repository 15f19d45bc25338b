//! Configuration management with TOML support
//!
//! This module provides the configuration system that:
//! - Loads from TOML files
//! - Supports environment variable overrides
//! - Validates configuration values
//!
//! Filters and transformers for the reporter are code, not configuration;
//! they are installed through [`crate::reporting::ErrorReporter::builder`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{FaultlineError, FaultlineResult};
use crate::patterns::{BackoffPolicy, CircuitBreakerConfig};

/// Complete configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Retry, timeout and circuit breaker settings
    pub recovery: RecoveryConfig,

    /// Error reporter settings
    pub reporter: ReporterConfig,

    /// Logging configuration
    pub observability: ObservabilityConfig,
}

/// Recovery engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Attempts per guarded operation, including the first
    pub max_attempts: u32,

    /// Timeout applied to each individual attempt
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,

    /// Consecutive failures that open a breaker
    pub circuit_breaker_threshold: u32,

    /// Cool-down before an open breaker admits a trial attempt
    #[serde(with = "humantime_serde")]
    pub circuit_breaker_recovery_time: Duration,

    /// Trial attempts admitted while half-open
    pub half_open_max_calls: u32,

    /// Backoff between attempts
    pub backoff: BackoffPolicy,
}

/// Error reporter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Probability that a new error is kept (0.0 - 1.0)
    pub sample_rate: f64,

    /// Capacity of the deduplicated error cache
    pub max_cached_errors: usize,

    /// Newly cached errors per delivery batch
    pub batch_size: usize,

    /// Entries listed in the report's top errors
    pub top_errors: usize,

    /// Webhook receiving JSON batches
    pub webhook_url: Option<String>,

    /// Timeout for a single webhook delivery
    #[serde(with = "humantime_serde")]
    pub delivery_timeout: Duration,

    /// Value injected into every cached error's context
    pub user_agent: String,
}

/// Observability configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, compact)
    pub format: String,

    /// Include span events and targets
    pub verbose: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_millis(30_000),
            circuit_breaker_threshold: 5,
            circuit_breaker_recovery_time: Duration::from_millis(60_000),
            half_open_max_calls: 1,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RecoveryConfig {
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_threshold,
            recovery_time: self.circuit_breaker_recovery_time,
            half_open_max_calls: self.half_open_max_calls,
        }
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1.0,
            max_cached_errors: 100,
            batch_size: 10,
            top_errors: 10,
            webhook_url: None,
            delivery_timeout: Duration::from_secs(10),
            user_agent: format!("faultline/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> FaultlineResult<Self> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| {
            FaultlineError::configuration(
                "file",
                format!("Failed to read {}: {}", path.as_ref().display(), e),
            )
        })?;

        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text without env overrides
    pub fn from_toml_str(contents: &str) -> FaultlineResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> FaultlineResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("FAULTLINE_LOG_LEVEL") {
            self.observability.logging.level = level;
        }
        if let Ok(url) = std::env::var("FAULTLINE_WEBHOOK_URL") {
            self.reporter.webhook_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Ok(rate) = std::env::var("FAULTLINE_SAMPLE_RATE") {
            if let Ok(rate) = rate.parse() {
                self.reporter.sample_rate = rate;
            }
        }
        if let Ok(attempts) = std::env::var("FAULTLINE_MAX_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse() {
                self.recovery.max_attempts = attempts;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> FaultlineResult<()> {
        let recovery = &self.recovery;
        if recovery.max_attempts == 0 {
            return Err(FaultlineError::configuration(
                "recovery.max_attempts",
                "must be at least 1",
            ));
        }
        if recovery.attempt_timeout.is_zero() {
            return Err(FaultlineError::configuration(
                "recovery.attempt_timeout",
                "must be greater than zero",
            ));
        }
        if recovery.circuit_breaker_threshold == 0 {
            return Err(FaultlineError::configuration(
                "recovery.circuit_breaker_threshold",
                "must be at least 1",
            ));
        }
        if recovery.half_open_max_calls == 0 {
            return Err(FaultlineError::configuration(
                "recovery.half_open_max_calls",
                "must be at least 1",
            ));
        }
        if !(recovery.backoff.multiplier >= 1.0) {
            return Err(FaultlineError::configuration(
                "recovery.backoff.multiplier",
                format!("must be >= 1.0, got {}", recovery.backoff.multiplier),
            ));
        }
        if recovery.backoff.base_delay > recovery.backoff.max_delay {
            return Err(FaultlineError::configuration(
                "recovery.backoff",
                "base_delay must not exceed max_delay",
            ));
        }

        let reporter = &self.reporter;
        if !(0.0..=1.0).contains(&reporter.sample_rate) {
            return Err(FaultlineError::configuration(
                "reporter.sample_rate",
                format!("must be within 0.0..=1.0, got {}", reporter.sample_rate),
            ));
        }
        if reporter.max_cached_errors == 0 {
            return Err(FaultlineError::configuration(
                "reporter.max_cached_errors",
                "must be at least 1",
            ));
        }
        if reporter.batch_size == 0 {
            return Err(FaultlineError::configuration(
                "reporter.batch_size",
                "must be at least 1",
            ));
        }
        if let Some(url) = &reporter.webhook_url {
            let parsed = url::Url::parse(url)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(FaultlineError::configuration(
                    "reporter.webhook_url",
                    format!("unsupported scheme '{}'", parsed.scheme()),
                ));
            }
        }

        let logging = &self.observability.logging;
        match logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(FaultlineError::configuration(
                    "observability.logging.level",
                    format!("Invalid log level: {}", logging.level),
                ))
            }
        }
        match logging.format.as_str() {
            "pretty" | "compact" => {}
            _ => {
                return Err(FaultlineError::configuration(
                    "observability.logging.format",
                    format!("Invalid log format: {}", logging.format),
                ))
            }
        }

        Ok(())
    }
}

/// Configuration builder for programmatic construction
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.recovery.max_attempts = attempts;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery.attempt_timeout = timeout;
        self
    }

    pub fn circuit_breaker(mut self, threshold: u32, recovery_time: Duration) -> Self {
        self.config.recovery.circuit_breaker_threshold = threshold;
        self.config.recovery.circuit_breaker_recovery_time = recovery_time;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.config.recovery.backoff = backoff;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.recovery.backoff.jitter = enabled;
        self
    }

    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.config.reporter.sample_rate = rate;
        self
    }

    pub fn max_cached_errors(mut self, capacity: usize) -> Self {
        self.config.reporter.max_cached_errors = capacity;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.reporter.batch_size = size;
        self
    }

    pub fn webhook_url(mut self, url: impl Into<String>) -> Self {
        self.config.reporter.webhook_url = Some(url.into());
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.observability.logging.level = level.into();
        self
    }

    pub fn build(self) -> FaultlineResult<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.recovery.max_attempts, 3);
        assert_eq!(config.recovery.attempt_timeout, Duration::from_secs(30));
        assert_eq!(config.recovery.circuit_breaker_threshold, 5);
        assert_eq!(
            config.recovery.circuit_breaker_recovery_time,
            Duration::from_secs(60)
        );
        assert_eq!(config.recovery.backoff.base_delay, Duration::from_secs(1));
        assert_eq!(config.recovery.backoff.max_delay, Duration::from_secs(30));
        assert_eq!(config.recovery.backoff.multiplier, 2.0);
        assert!(config.recovery.backoff.jitter);
        assert_eq!(config.reporter.sample_rate, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_validates() {
        assert!(ConfigBuilder::new().max_attempts(0).build().is_err());
        assert!(ConfigBuilder::new().sample_rate(1.5).build().is_err());
        assert!(ConfigBuilder::new().webhook_url("ftp://x").build().is_err());
        assert!(ConfigBuilder::new().webhook_url("not a url").build().is_err());

        let config = ConfigBuilder::new()
            .max_attempts(5)
            .jitter(false)
            .webhook_url("https://ops.example.com/errors")
            .build()
            .unwrap();
        assert_eq!(config.recovery.max_attempts, 5);
        assert!(!config.recovery.backoff.jitter);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
[recovery]
max_attempts = 4
attempt_timeout = "5s"

[recovery.backoff]
base_delay = "250ms"
"#,
        )
        .unwrap();

        assert_eq!(config.recovery.max_attempts, 4);
        assert_eq!(config.recovery.attempt_timeout, Duration::from_secs(5));
        assert_eq!(
            config.recovery.backoff.base_delay,
            Duration::from_millis(250)
        );
        assert_eq!(config.recovery.backoff.max_delay, Duration::from_secs(30));
        assert_eq!(config.reporter, ReporterConfig::default());
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let mut config = Config::default();
        config.recovery.backoff.base_delay = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }
}
