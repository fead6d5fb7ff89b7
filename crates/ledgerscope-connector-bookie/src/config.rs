//! Bookie connector configuration.

use ledgerscope_connector::config::{require_endpoint, ConnectionSettings, TlsConfig};
use ledgerscope_connector::{SourceError, SourceResult};
use serde::{Deserialize, Serialize};

/// Where and how to reach a bookie's HTTP admin service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookieConfig {
    /// Base URL, e.g. `http://bookie-0:8000`.
    pub base_url: String,

    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub tls: TlsConfig,
}

impl BookieConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connection: ConnectionSettings::default(),
            tls: TlsConfig::default(),
        }
    }

    pub fn with_connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn validate(&self) -> SourceResult<()> {
        require_endpoint("bookie url", &self.base_url)?;
        url::Url::parse(&self.base_url).map_err(|e| {
            SourceError::invalid_configuration(format!("invalid bookie url '{}': {e}", self.base_url))
        })?;
        self.connection.validate()
    }

    /// Absolute URL for an API path starting with `/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
