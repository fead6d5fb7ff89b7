//! Common connection settings shared by every connector.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{SourceError, SourceResult};
use crate::resilience::RetryConfig;

/// Timeouts and retry budget applied to every call a connector makes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Connection establishment timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum retry attempts for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled on every attempt.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound on the retry delay in milliseconds.
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    200
}

fn default_max_retry_delay_ms() -> u64 {
    5_000
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl ConnectionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Retry policy derived from these settings.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_delay_ms),
            max_delay: Duration::from_millis(self.max_retry_delay_ms.max(self.retry_delay_ms)),
            ..RetryConfig::default()
        }
    }

    pub fn validate(&self) -> SourceResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(SourceError::invalid_configuration(
                "request_timeout_ms must be greater than zero",
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(SourceError::invalid_configuration(
                "connect_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// TLS trust settings for HTTPS endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM file with additional certificates to trust.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_certs_path: Option<PathBuf>,

    /// Accept any server certificate.
    #[serde(default)]
    pub allow_insecure: bool,
}

impl TlsConfig {
    pub fn with_trust_certs_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.trust_certs_path = Some(path.into());
        self
    }
}

/// Reject an empty or whitespace-only endpoint.
pub fn require_endpoint(name: &str, value: &str) -> SourceResult<()> {
    if value.trim().is_empty() {
        return Err(SourceError::invalid_configuration(format!(
            "{name} must not be empty"
        )));
    }
    Ok(())
}
