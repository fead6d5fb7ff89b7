//! ZooKeeper-backed [`MetadataStore`].

use async_trait::async_trait;
use ledgerscope_connector::prelude::*;
use ledgerscope_connector::resilience::with_timeout;
use tracing::{debug, info, instrument};

use crate::config::ZookeeperConfig;

const SYSTEM: WitnessSource = WitnessSource::MetadataStore;

/// Coordination-store access over a single ZooKeeper session.
pub struct ZookeeperStore {
    client: zookeeper_client::Client,
    config: ZookeeperConfig,
    retry: RetryExecutor,
}

impl std::fmt::Debug for ZookeeperStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZookeeperStore")
            .field("connect_string", &self.config.connect_string)
            .finish_non_exhaustive()
    }
}

impl ZookeeperStore {
    /// Open a session, failing with `Unreachable` if the ensemble does not answer in time.
    #[instrument(skip(config), fields(connect_string = %config.connect_string))]
    pub async fn connect(config: ZookeeperConfig) -> SourceResult<Self> {
        config.validate()?;

        let client = with_timeout(SYSTEM, config.session_timeout(), async {
            zookeeper_client::Client::connect(&config.connect_string)
                .await
                .map_err(|e| {
                    SourceError::unreachable_with_source(
                        SYSTEM,
                        format!("cannot connect to {}", config.connect_string),
                        e,
                    )
                })
        })
        .await?;

        info!(connect_string = %config.connect_string, "Connected to coordination store");

        let retry = RetryExecutor::new(config.connection.retry_config());
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    fn map_error(path: &str, err: zookeeper_client::Error) -> SourceError {
        match err {
            zookeeper_client::Error::NoNode => SourceError::not_found(path.to_string()),
            zookeeper_client::Error::BadVersion => SourceError::VersionConflict {
                path: path.to_string(),
            },
            zookeeper_client::Error::NoAuth => SourceError::AuthenticationFailed { system: SYSTEM },
            other => SourceError::unreachable_with_source(SYSTEM, format!("request on {path} failed"), other),
        }
    }
}

#[async_trait]
impl MetadataStore for ZookeeperStore {
    #[instrument(skip(self))]
    async fn list(&self, path: &str) -> SourceResult<Vec<String>> {
        let client = &self.client;
        let timeout = self.config.connection.request_timeout();
        let children = self
            .retry
            .execute(|| {
                with_timeout(SYSTEM, timeout, async move {
                    client
                        .list_children(path)
                        .await
                        .map_err(|e| Self::map_error(path, e))
                })
            })
            .await?;
        debug!(path, count = children.len(), "Listed children");
        Ok(children)
    }

    #[instrument(skip(self))]
    async fn get(&self, path: &str) -> SourceResult<Versioned> {
        let client = &self.client;
        let timeout = self.config.connection.request_timeout();
        let (data, stat) = self
            .retry
            .execute(|| {
                with_timeout(SYSTEM, timeout, async move {
                    client
                        .get_data(path)
                        .await
                        .map_err(|e| Self::map_error(path, e))
                })
            })
            .await?;
        Ok(Versioned {
            data,
            version: stat.version,
        })
    }

    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn set(&self, path: &str, data: Vec<u8>, expected_version: i32) -> SourceResult<i32> {
        // a retried compare-and-set could report a conflict for its own earlier write
        let stat = with_timeout(
            SYSTEM,
            self.config.connection.request_timeout(),
            async {
                self.client
                    .set_data(path, &data, Some(expected_version))
                    .await
                    .map_err(|e| Self::map_error(path, e))
            },
        )
        .await?;
        info!(path, version = stat.version, "Updated coordination-store node");
        Ok(stat.version)
    }
}
