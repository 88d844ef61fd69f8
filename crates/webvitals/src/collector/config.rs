//! Configuration types for the collector

use std::time::Duration;
use tracing::warn;

use crate::collector::core::{CollectorError, CoreWebVitalsPolicy, MetricKind, Result};

/// Environment variable holding the measurement API key
pub const API_KEY_ENV: &str = "PAGESPEED_API_KEY";

/// Sliding-window quota shared by every worker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    pub max_queries: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_queries: 60,
            window: Duration::from_secs(60),
        }
    }
}

/// Bounded retry applied only to HTTP 429 responses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleRetryConfig {
    /// Total attempts per URL, the first one included
    pub max_attempts: u32,
    /// Fixed sleep before each retry
    pub backoff: Duration,
}

impl Default for ThrottleRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(5),
        }
    }
}

/// Configuration for one batch run
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub api_key: String,
    /// Maximum simultaneous in-flight requests
    pub concurrency: usize,
    pub rate_limit: RateLimitConfig,
    pub throttle_retry: ThrottleRetryConfig,
    /// Per-request timeout; `None` uses the API's own default
    pub timeout: Option<Duration>,
    pub user_agent: String,
    /// Which three metrics decide pass/fail
    pub policy: CoreWebVitalsPolicy,
    /// Field metrics requested from the record API
    pub metrics: Vec<MetricKind>,
}

impl CollectorConfig {
    /// Preset for the record-query API: 60 queries a minute
    pub fn crux() -> Self {
        let rate_limit = RateLimitConfig {
            max_queries: 60,
            window: Duration::from_secs(60),
        };
        Self {
            concurrency: 20.min(rate_limit.max_queries / 2),
            rate_limit,
            timeout: Some(Duration::from_secs(30)),
            ..Self::default()
        }
    }

    /// Preset for the page-analysis API: 20 queries a minute
    pub fn psi() -> Self {
        let rate_limit = RateLimitConfig {
            max_queries: 20,
            window: Duration::from_secs(60),
        };
        Self {
            concurrency: 5.min(rate_limit.max_queries / 4),
            rate_limit,
            timeout: Some(Duration::from_secs(60)),
            ..Self::default()
        }
    }

    /// Read the API key from the environment, loading `.env` if present
    pub fn api_key_from_env() -> Result<String> {
        dotenv::dotenv().ok(); // Ignore error if .env not present
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CollectorError::Configuration {
                message: format!("{} environment variable not set", API_KEY_ENV),
                field: Some(API_KEY_ENV.to_string()),
                suggestion: Some(format!(
                    "Set {} in your .env file or pass --api-key",
                    API_KEY_ENV
                )),
            })
    }

    /// Fail fast on settings that would deadlock or never authenticate
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(CollectorError::Configuration {
                message: "API key is empty".to_string(),
                field: Some("api_key".to_string()),
                suggestion: Some(format!("Set {} or pass --api-key", API_KEY_ENV)),
            });
        }
        if self.concurrency == 0 {
            return Err(CollectorError::config("concurrency must be greater than zero", "concurrency"));
        }
        if self.rate_limit.max_queries == 0 {
            return Err(CollectorError::config(
                "rate limit max_queries must be greater than zero",
                "rate_limit.max_queries",
            ));
        }
        if self.rate_limit.window.is_zero() {
            return Err(CollectorError::config(
                "rate limit window must be longer than zero",
                "rate_limit.window",
            ));
        }
        if self.throttle_retry.max_attempts == 0 {
            return Err(CollectorError::config(
                "throttle retry max_attempts must be at least 1",
                "throttle_retry.max_attempts",
            ));
        }
        if matches!(self.timeout, Some(t) if t.is_zero()) {
            return Err(CollectorError::config("timeout must be longer than zero", "timeout"));
        }

        if self.concurrency > self.rate_limit.max_queries / 2 {
            warn!(
                "Concurrency {} exceeds half the rate limit ({} per {:?}); workers will queue at the limiter",
                self.concurrency, self.rate_limit.max_queries, self.rate_limit.window
            );
        }

        Ok(())
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            concurrency: 20,
            rate_limit: RateLimitConfig::default(),
            throttle_retry: ThrottleRetryConfig::default(),
            timeout: None,
            user_agent: format!("webvitals/{}", env!("CARGO_PKG_VERSION")),
            policy: CoreWebVitalsPolicy::default(),
            metrics: MetricKind::FIELD.to_vec(),
        }
    }
}

/// Builder for CollectorConfig
#[derive(Debug, Clone, Default)]
pub struct CollectorConfigBuilder {
    config: CollectorConfig,
}

impl CollectorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the record-query preset
    pub fn crux() -> Self {
        Self { config: CollectorConfig::crux() }
    }

    /// Start from the page-analysis preset
    pub fn psi() -> Self {
        Self { config: CollectorConfig::psi() }
    }

    pub fn api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.config.api_key = api_key.into();
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn rate_limit(mut self, max_queries: usize, window: Duration) -> Self {
        self.config.rate_limit = RateLimitConfig { max_queries, window };
        self
    }

    pub fn max_throttle_attempts(mut self, max_attempts: u32) -> Self {
        self.config.throttle_retry.max_attempts = max_attempts;
        self
    }

    pub fn throttle_backoff(mut self, backoff: Duration) -> Self {
        self.config.throttle_retry.backoff = backoff;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn policy(mut self, policy: CoreWebVitalsPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn metrics(mut self, metrics: Vec<MetricKind>) -> Self {
        self.config.metrics = metrics;
        self
    }

    pub fn build(self) -> CollectorConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_keep_concurrency_below_half_the_quota() {
        let crux = CollectorConfig::crux();
        assert_eq!(crux.rate_limit.max_queries, 60);
        assert_eq!(crux.concurrency, 20);
        assert_eq!(crux.timeout, Some(Duration::from_secs(30)));

        let psi = CollectorConfig::psi();
        assert_eq!(psi.rate_limit.max_queries, 20);
        assert_eq!(psi.concurrency, 5);
        assert_eq!(psi.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_validate_rejects_missing_key() {
        let err = CollectorConfig::crux().validate().unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let zero_queries = CollectorConfigBuilder::crux()
            .api_key("k")
            .rate_limit(0, Duration::from_secs(60))
            .build();
        assert!(zero_queries.validate().is_err());

        let zero_window = CollectorConfigBuilder::crux()
            .api_key("k")
            .rate_limit(10, Duration::ZERO)
            .build();
        assert!(zero_window.validate().is_err());

        let zero_concurrency = CollectorConfigBuilder::crux().api_key("k").concurrency(0).build();
        assert!(zero_concurrency.validate().is_err());

        let zero_attempts = CollectorConfigBuilder::crux().api_key("k").max_throttle_attempts(0).build();
        assert!(zero_attempts.validate().is_err());
    }

    #[test]
    fn test_builder_overrides_preset() {
        let config = CollectorConfigBuilder::psi()
            .api_key("secret")
            .concurrency(2)
            .rate_limit(10, Duration::from_secs(30))
            .throttle_backoff(Duration::from_millis(10))
            .policy(CoreWebVitalsPolicy::LEGACY_FID)
            .build();

        assert_eq!(config.concurrency, 2);
        assert_eq!(config.rate_limit.window, Duration::from_secs(30));
        assert_eq!(config.throttle_retry.backoff, Duration::from_millis(10));
        assert_eq!(config.policy, CoreWebVitalsPolicy::LEGACY_FID);
        assert!(config.validate().is_ok());
    }
}
