//! Layered CLI settings

use crate::commands::ConnectionArgs;
use crate::config::ConfigPaths;
use crate::error::{CliError, CliResult};
use ledgerscope_connector::{ConnectionSettings, TlsConfig};
use ledgerscope_connector_admin::AdminConfig;
use ledgerscope_connector_bookie::BookieConfig;
use ledgerscope_connector_zookeeper::ZookeeperConfig;
use ledgerscope_reconcile::{ReconcileConfig, RepairConfig};
use serde::{Deserialize, Serialize};

/// Everything needed to reach the three witnesses and drive a run.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// ZooKeeper connect string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zookeeper: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zookeeper_session_timeout_ms: Option<u64>,

    /// Bookie HTTP admin base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookie_url: Option<String>,

    /// Broker admin REST base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub repair: RepairConfig,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("zookeeper", &self.zookeeper)
            .field("bookie_url", &self.bookie_url)
            .field("admin_url", &self.admin_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .field("tls", &self.tls)
            .field("connection", &self.connection)
            .field("reconcile", &self.reconcile)
            .field("repair", &self.repair)
            .finish()
    }
}

impl Settings {
    /// Load `config.json` if present, otherwise start from defaults.
    pub fn load(paths: &ConfigPaths) -> CliResult<Self> {
        if !paths.config_file.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&paths.config_file)?;
        serde_json::from_str(&content).map_err(|e| {
            CliError::Config(format!(
                "invalid config file {}: {}",
                paths.config_file.display(),
                e
            ))
        })
    }

    /// Load from the default location and apply command-line overrides.
    pub fn resolve(args: &ConnectionArgs) -> CliResult<Self> {
        let paths = ConfigPaths::new()?;
        let mut settings = Self::load(&paths)?;
        settings.apply_args(args);
        Ok(settings)
    }

    /// Flags and their environment variables override the file.
    pub fn apply_args(&mut self, args: &ConnectionArgs) {
        if let Some(zk) = &args.zookeeper {
            self.zookeeper = Some(zk.clone());
        }
        if let Some(url) = &args.bookie_url {
            self.bookie_url = Some(url.clone());
        }
        if let Some(url) = &args.admin_url {
            self.admin_url = Some(url.clone());
        }
        if let Some(token) = &args.auth_token {
            self.auth_token = Some(token.clone());
        }
        if let Some(path) = &args.tls_trust_certs {
            self.tls.trust_certs_path = Some(path.clone());
        }
        if args.tls_allow_insecure {
            self.tls.allow_insecure = true;
        }
        if let Some(ms) = args.request_timeout_ms {
            self.connection.request_timeout_ms = ms;
        }
        if let Some(retries) = args.max_retries {
            self.connection.max_retries = retries;
        }
        if let Some(concurrency) = args.concurrency {
            self.reconcile.concurrency = concurrency;
        }
        if let Some(factor) = args.replication_factor {
            self.reconcile.replication_factor = Some(factor);
        }
    }

    pub fn zookeeper_config(&self) -> CliResult<ZookeeperConfig> {
        let connect_string = required(&self.zookeeper, "coordination store address (--zookeeper)")?;
        let mut config = ZookeeperConfig::new(connect_string).with_connection(self.connection.clone());
        if let Some(ms) = self.zookeeper_session_timeout_ms {
            config = config.with_session_timeout_ms(ms);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn bookie_config(&self) -> CliResult<BookieConfig> {
        let url = required(&self.bookie_url, "bookie HTTP endpoint (--bookie-url)")?;
        let config = BookieConfig::new(url)
            .with_connection(self.connection.clone())
            .with_tls(self.tls.clone());
        config.validate()?;
        Ok(config)
    }

    pub fn admin_config(&self) -> CliResult<AdminConfig> {
        let url = required(&self.admin_url, "admin API endpoint (--admin-url)")?;
        let mut config = AdminConfig::new(url)
            .with_connection(self.connection.clone())
            .with_tls(self.tls.clone());
        if let Some(token) = &self.auth_token {
            config = config.with_auth_token(token.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

fn required<'a>(value: &'a Option<String>, what: &str) -> CliResult<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CliError::Config(format!("no {what} configured"))),
    }
}
