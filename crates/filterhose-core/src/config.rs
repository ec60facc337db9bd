use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::RATE_LIMIT_MAX;
use crate::errors::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "https://stream.twitter.com/1.1/statuses/filter.json";
/// The endpoint sends a keep-alive at least every 30s; 90s of silence means a stall.
pub const DEFAULT_STALL_TIMEOUT_MS: u64 = 90_000;
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Runtime settings for a filter stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
    /// Sent as the `tweet_mode` form field only when set.
    #[serde(default)]
    pub tweet_mode: Option<String>,
    /// Ceiling for the rate-limit backoff. An explicit `null` means unbounded.
    #[serde(default = "default_rate_limit_max_ms")]
    pub rate_limit_max_ms: Option<u64>,
    /// Capacity of the broadcast channel subscribers read events from.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}
fn default_stall_timeout_ms() -> u64 {
    DEFAULT_STALL_TIMEOUT_MS
}
fn default_rate_limit_max_ms() -> Option<u64> {
    Some(RATE_LIMIT_MAX.as_millis() as u64)
}
fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            stall_timeout_ms: default_stall_timeout_ms(),
            tweet_mode: None,
            rate_limit_max_ms: default_rate_limit_max_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl StreamConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://")) {
            return Err(ConfigError::InvalidEndpoint {
                url: self.endpoint.clone(),
                reason: "expected an http or https URL",
            });
        }
        if self.stall_timeout_ms == 0 {
            return Err(ConfigError::Invalid("stallTimeoutMs must be positive".into()));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid("eventBuffer must be positive".into()));
        }
        Ok(())
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub fn rate_limit_max(&self) -> Option<Duration> {
        self.rate_limit_max_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.stall_timeout(), Duration::from_secs(90));
        assert_eq!(config.rate_limit_max(), Some(Duration::from_secs(320)));
        assert!(config.tweet_mode.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config = StreamConfig::from_json("{}").unwrap();
        assert_eq!(config, StreamConfig::default());
    }

    #[test]
    fn explicit_null_unbounds_rate_limit() {
        let config = StreamConfig::from_json(
            r#"{"endpoint":"http://localhost:3000","stallTimeoutMs":50,"rateLimitMaxMs":null,"tweetMode":"extended"}"#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "http://localhost:3000");
        assert_eq!(config.stall_timeout(), Duration::from_millis(50));
        assert_eq!(config.rate_limit_max(), None);
        assert_eq!(config.tweet_mode.as_deref(), Some("extended"));
    }

    #[test]
    fn rejects_bad_endpoint() {
        let err = StreamConfig::from_json(r#"{"endpoint":"ftp://nope"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn rejects_zero_stall_timeout() {
        let err = StreamConfig::from_json(r#"{"stallTimeoutMs":0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            StreamConfig::from_json("{not json"),
            Err(ConfigError::Invalid(_))
        ));
    }
}
