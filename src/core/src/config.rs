use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{EniError, Result};

/// Fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Must be positive.
    pub max_attempts: u32,

    /// Delay between two attempts, in milliseconds
    pub interval_ms: u64,
}

impl RetryPolicy {
    /// Intervals must be whole milliseconds.
    pub fn new(max_attempts: u32, interval: Duration) -> Result<Self> {
        if interval.subsec_nanos() % 1_000_000 != 0 {
            return Err(EniError::Config(format!(
                "retry policy: interval {:?} is not a whole number of milliseconds",
                interval
            )));
        }
        let interval_ms = u64::try_from(interval.as_millis()).map_err(|_| {
            EniError::Config(format!("retry policy: interval {:?} is too large", interval))
        })?;
        let policy = Self {
            max_attempts,
            interval_ms,
        };
        policy.validate("retry policy")?;
        Ok(policy)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound of the time spent sleeping by a loop under this policy.
    pub fn max_wait(&self) -> Duration {
        self.interval() * self.max_attempts.saturating_sub(1)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(EniError::Config(format!(
                "{}: max_attempts must be positive",
                name
            )));
        }
        Ok(())
    }
}

/// Instance metadata service client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImdsConfig {
    /// Base URL of the metadata service
    pub endpoint: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,

    /// Lifetime requested for IMDSv2 session tokens
    pub token_ttl_secs: u32,
}

impl Default for ImdsConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://169.254.169.254".to_string(),
            timeout_ms: 2000,
            token_ttl_secs: 21600, // 6 hours
        }
    }
}

impl ImdsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Engine configuration
///
/// Immutable once handed to the engine; tests substitute short policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry policy for secondary address lookups, which can lag attachment
    #[serde(default = "default_metadata_retry")]
    pub metadata_retry: RetryPolicy,

    /// Polling policy for the IPv6 default route
    #[serde(default = "default_gateway_poll")]
    pub gateway_poll: RetryPolicy,

    /// Metadata client settings
    #[serde(default)]
    pub imds: ImdsConfig,
}

fn default_metadata_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 20,
        interval_ms: 1000,
    }
}

fn default_gateway_poll() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 10,
        interval_ms: 1000,
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metadata_retry: default_metadata_retry(),
            gateway_poll: default_gateway_poll(),
            imds: ImdsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load the configuration from defaults plus environment overrides.
    ///
    /// Environment variables:
    /// - `ENI_METADATA_RETRY_ATTEMPTS`, `ENI_METADATA_RETRY_INTERVAL_MS`
    /// - `ENI_GATEWAY_POLL_ATTEMPTS`, `ENI_GATEWAY_POLL_INTERVAL_MS`
    /// - `ENI_IMDS_ENDPOINT`, `ENI_IMDS_TIMEOUT_MS`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<u32>("ENI_METADATA_RETRY_ATTEMPTS")? {
            config.metadata_retry.max_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("ENI_METADATA_RETRY_INTERVAL_MS")? {
            config.metadata_retry.interval_ms = v;
        }
        if let Some(v) = env_parse::<u32>("ENI_GATEWAY_POLL_ATTEMPTS")? {
            config.gateway_poll.max_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("ENI_GATEWAY_POLL_INTERVAL_MS")? {
            config.gateway_poll.interval_ms = v;
        }
        if let Ok(endpoint) = std::env::var("ENI_IMDS_ENDPOINT") {
            config.imds.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Some(v) = env_parse::<u64>("ENI_IMDS_TIMEOUT_MS")? {
            config.imds.timeout_ms = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.metadata_retry.validate("metadata_retry")?;
        self.gateway_poll.validate("gateway_poll")?;
        if self.imds.endpoint.is_empty() {
            return Err(EniError::Config("imds.endpoint must not be empty".to_string()));
        }
        Ok(())
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| EniError::Config(format!("invalid {}='{}': {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_KEYS: &[&str] = &[
        "ENI_METADATA_RETRY_ATTEMPTS",
        "ENI_METADATA_RETRY_INTERVAL_MS",
        "ENI_GATEWAY_POLL_ATTEMPTS",
        "ENI_GATEWAY_POLL_INTERVAL_MS",
        "ENI_IMDS_ENDPOINT",
        "ENI_IMDS_TIMEOUT_MS",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.metadata_retry.max_attempts, 20);
        assert_eq!(config.metadata_retry.interval(), Duration::from_secs(1));
        assert_eq!(config.gateway_poll.max_attempts, 10);
        assert_eq!(config.gateway_poll.interval(), Duration::from_secs(1));
        assert_eq!(config.imds.endpoint, "http://169.254.169.254");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_policy_rejects_zero_attempts() {
        let err = RetryPolicy::new(0, Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("max_attempts must be positive"));
    }

    #[test]
    fn test_retry_policy_rejects_sub_millisecond_interval() {
        let err = RetryPolicy::new(3, Duration::from_micros(500)).unwrap_err();
        assert!(matches!(err, EniError::Config(_)));
        assert!(RetryPolicy::new(3, Duration::from_micros(1500)).is_err());
        let policy = RetryPolicy::new(3, Duration::from_micros(2000)).unwrap();
        assert_eq!(policy.interval(), Duration::from_millis(2));
    }

    #[test]
    fn test_retry_policy_rejects_oversized_interval() {
        let interval = Duration::from_secs(u64::MAX);
        let err = RetryPolicy::new(3, interval).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_retry_policy_max_wait() {
        let policy = RetryPolicy::new(10, Duration::from_millis(500)).unwrap();
        assert_eq!(policy.max_wait(), Duration::from_millis(4500));
        let single = RetryPolicy::new(1, Duration::from_secs(5)).unwrap();
        assert_eq!(single.max_wait(), Duration::ZERO);
    }

    #[test]
    fn test_engine_config_deserialize_partial() {
        let json = r#"{"gateway_poll": {"max_attempts": 3, "interval_ms": 10}}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.gateway_poll.max_attempts, 3);
        assert_eq!(config.metadata_retry.max_attempts, 20);
        assert_eq!(config.imds, ImdsConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("ENI_METADATA_RETRY_ATTEMPTS", "5");
        std::env::set_var("ENI_GATEWAY_POLL_INTERVAL_MS", "250");
        std::env::set_var("ENI_IMDS_ENDPOINT", "http://127.0.0.1:1338/");

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.metadata_retry.max_attempts, 5);
        assert_eq!(config.gateway_poll.interval(), Duration::from_millis(250));
        assert_eq!(config.imds.endpoint, "http://127.0.0.1:1338");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        std::env::set_var("ENI_GATEWAY_POLL_ATTEMPTS", "ten");
        let err = EngineConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("ENI_GATEWAY_POLL_ATTEMPTS"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_zero_attempts() {
        clear_env();
        std::env::set_var("ENI_METADATA_RETRY_ATTEMPTS", "0");
        assert!(EngineConfig::from_env().is_err());
        clear_env();
    }
}
