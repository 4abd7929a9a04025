//! Backend client configuration.
//!
//! Provides the actions backend endpoint, timeout and retry settings.
//! Configuration is loaded from environment variables with defaults that
//! point at the hosted backend.

use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default base URL of the hosted actions backend.
pub const DEFAULT_API_URI: &str = "https://api.integration.app";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Configuration of the actions backend client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend API.
    pub base_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Retries after the first attempt of a read request.
    pub max_retries: u32,

    /// Whether to verify TLS certificates (disable only for testing).
    pub verify_tls: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URI.to_string(),
            timeout_secs: 30,
            max_retries: 3,
            verify_tls: true,
        }
    }
}

impl BackendConfig {
    /// Create a configuration for a base URL with default settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MEMBRANE_API_URI`: backend URL (default: https://api.integration.app)
    /// - `BACKEND_TIMEOUT_SECS`: request timeout in seconds (default: 30)
    /// - `BACKEND_MAX_RETRIES`: retries after a failed read (default: 3)
    /// - `BACKEND_VERIFY_TLS`: whether to verify TLS (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();

        let config = Self {
            base_url: std::env::var("MEMBRANE_API_URI").unwrap_or(default.base_url),
            timeout_secs: parse_env("BACKEND_TIMEOUT_SECS")?.unwrap_or(default.timeout_secs),
            max_retries: parse_env("BACKEND_MAX_RETRIES")?.unwrap_or(default.max_retries),
            verify_tls: std::env::var("BACKEND_VERIFY_TLS")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(default.verify_tls),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "MEMBRANE_API_URI".to_string(),
                message: format!("expected an http(s) URL, got '{}'", self.base_url),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BACKEND_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Get the request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy for read requests: the first attempt plus `max_retries`.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::with_max_attempts(self.max_retries.saturating_add(1))
    }

    /// Build a URL by appending path segments to the base URL. Each segment
    /// is percent-encoded, so an id containing `/`, `?` or `#` stays one
    /// segment.
    pub fn segment_url(&self, segments: &[&str]) -> Result<reqwest::Url, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: "MEMBRANE_API_URI".to_string(),
            message,
        };

        let mut url = reqwest::Url::parse(self.base_url.trim_end_matches('/'))
            .map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("'{}' cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("could not parse '{}'", raw),
            }),
        Err(_) => Ok(None),
    }
}
