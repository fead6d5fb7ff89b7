//! CLI commands

pub mod reconcile;
pub mod repair;
pub mod storage_size;
pub mod trim;

use crate::config::Settings;
use crate::error::CliResult;
use clap::Args;
use ledgerscope_connector::{AdminBridge, LedgerInspector, MetadataReader};
use ledgerscope_connector_admin::PulsarAdminBridge;
use ledgerscope_connector_bookie::BookieInspector;
use ledgerscope_connector_zookeeper::{ManagedLedgerReader, ZookeeperStore};
use ledgerscope_reconcile::CancellationToken;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Endpoints, credentials and tuning shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// ZooKeeper connect string, e.g. zk1:2181,zk2:2181
    #[arg(long, env = "LEDGERSCOPE_ZOOKEEPER")]
    pub zookeeper: Option<String>,

    /// Bookie HTTP admin endpoint, e.g. http://bookie:8000
    #[arg(long, env = "LEDGERSCOPE_BOOKIE_URL")]
    pub bookie_url: Option<String>,

    /// Broker admin REST endpoint, e.g. http://broker:8080
    #[arg(long, env = "LEDGERSCOPE_ADMIN_URL")]
    pub admin_url: Option<String>,

    /// Bearer token for the admin API
    #[arg(long, env = "LEDGERSCOPE_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// PEM file with certificates to trust for HTTPS endpoints
    #[arg(long)]
    pub tls_trust_certs: Option<PathBuf>,

    /// Accept any TLS certificate
    #[arg(long)]
    pub tls_allow_insecure: bool,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,

    /// Retry attempts for transient failures
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Maximum concurrent ledger lookups
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Expected live replicas per ledger (default: each ledger's write quorum)
    #[arg(long)]
    pub replication_factor: Option<u32>,
}

/// The three witnesses behind their capability traits.
pub struct Witnesses {
    pub metadata: Arc<dyn MetadataReader>,
    pub inspector: Arc<dyn LedgerInspector>,
    pub admin: Arc<dyn AdminBridge>,
}

impl Witnesses {
    /// Connect to all three systems.
    pub async fn connect(settings: &Settings) -> CliResult<Self> {
        let admin = settings.admin_config()?;
        let (metadata, inspector) = Self::connect_writable(settings).await?;
        Ok(Self {
            metadata,
            inspector,
            admin: Arc::new(PulsarAdminBridge::new(admin)?),
        })
    }

    /// Connect only the two witnesses repairs write to.
    pub async fn connect_writable(
        settings: &Settings,
    ) -> CliResult<(Arc<dyn MetadataReader>, Arc<dyn LedgerInspector>)> {
        let zookeeper = settings.zookeeper_config()?;
        let bookie = settings.bookie_config()?;

        let store = ZookeeperStore::connect(zookeeper).await?;
        info!("Connected to coordination store");

        Ok((
            Arc::new(ManagedLedgerReader::new(store)),
            Arc::new(BookieInspector::new(bookie)?),
        ))
    }
}

/// A token cancelled on Ctrl-C.
pub fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight lookups");
            token.cancel();
        }
    });
    cancel
}
