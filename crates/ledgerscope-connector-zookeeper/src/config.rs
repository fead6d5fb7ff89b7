//! ZooKeeper connector configuration.

use ledgerscope_connector::config::{require_endpoint, ConnectionSettings};
use ledgerscope_connector::SourceResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection parameters for the coordination store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZookeeperConfig {
    /// Connect string, e.g. `zk1:2181,zk2:2181/pulsar`.
    pub connect_string: String,

    /// Session timeout in milliseconds.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    #[serde(default)]
    pub connection: ConnectionSettings,
}

fn default_session_timeout_ms() -> u64 {
    30_000
}

impl ZookeeperConfig {
    pub fn new(connect_string: impl Into<String>) -> Self {
        Self {
            connect_string: connect_string.into(),
            session_timeout_ms: default_session_timeout_ms(),
            connection: ConnectionSettings::default(),
        }
    }

    pub fn with_session_timeout_ms(mut self, ms: u64) -> Self {
        self.session_timeout_ms = ms;
        self
    }

    pub fn with_connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = connection;
        self
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn validate(&self) -> SourceResult<()> {
        require_endpoint("zookeeper connect string", &self.connect_string)?;
        self.connection.validate()
    }
}
