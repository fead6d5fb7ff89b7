//! Admin API connector configuration.

use ledgerscope_connector::config::{require_endpoint, ConnectionSettings, TlsConfig};
use ledgerscope_connector::{SourceError, SourceResult};
use serde::{Deserialize, Serialize};

/// Where and how to reach the serving layer's admin REST API.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Base URL, e.g. `https://broker:8443`.
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub tls: TlsConfig,

    /// Maximum broker redirects followed per request.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
}

fn default_max_redirects() -> u32 {
    5
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .field("connection", &self.connection)
            .field("tls", &self.tls)
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}

impl AdminConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            connection: ConnectionSettings::default(),
            tls: TlsConfig::default(),
            max_redirects: default_max_redirects(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
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
        require_endpoint("admin url", &self.base_url)?;
        url::Url::parse(&self.base_url).map_err(|e| {
            SourceError::invalid_configuration(format!("invalid admin url '{}': {e}", self.base_url))
        })?;
        if matches!(&self.auth_token, Some(t) if t.trim().is_empty()) {
            return Err(SourceError::invalid_configuration("auth token must not be empty"));
        }
        self.connection.validate()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
