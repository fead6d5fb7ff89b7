//! [`LedgerInspector`] over the bookie HTTP admin service.

use async_trait::async_trait;
use ledgerscope_connector::prelude::*;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::config::BookieConfig;
use crate::metadata::LedgerMetadataJson;

const SYSTEM: WitnessSource = WitnessSource::StorageEnsemble;

/// Reads and administers ledgers through one bookie's HTTP endpoint.
pub struct BookieInspector {
    config: BookieConfig,
    client: Client,
    retry: RetryExecutor,
}

impl std::fmt::Debug for BookieInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookieInspector")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl BookieInspector {
    pub fn new(config: BookieConfig) -> SourceResult<Self> {
        config.validate()?;
        let client = Self::build_client(&config)?;
        let retry = RetryExecutor::new(config.connection.retry_config());
        Ok(Self {
            config,
            client,
            retry,
        })
    }

    fn build_client(config: &BookieConfig) -> SourceResult<Client> {
        let mut builder = Client::builder()
            .timeout(config.connection.request_timeout())
            .connect_timeout(config.connection.connect_timeout());

        if let Some(path) = &config.tls.trust_certs_path {
            let pem = std::fs::read(path).map_err(|e| {
                SourceError::invalid_configuration(format!(
                    "cannot read trust certificates {}: {e}",
                    path.display()
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                SourceError::invalid_configuration(format!("invalid trust certificate: {e}"))
            })?;
            builder = builder.add_root_certificate(cert);
        }
        if config.tls.allow_insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().map_err(|e| {
            SourceError::invalid_configuration(format!("failed to build HTTP client: {e}"))
        })
    }

    /// Send a request, retrying transport failures and 5xx responses.
    async fn send(&self, method: Method, path: &str) -> SourceResult<Response> {
        let url = self.config.url(path);
        self.retry
            .execute(|| {
                let request = self.client.request(method.clone(), &url);
                let url = &url;
                async move {
                    let response = request.send().await.map_err(|e| {
                        if e.is_timeout() {
                            SourceError::Timeout {
                                system: SYSTEM,
                                timeout_ms: self.config.connection.request_timeout_ms,
                            }
                        } else {
                            SourceError::unreachable_with_source(SYSTEM, format!("request to {url} failed"), e)
                        }
                    })?;

                    let status = response.status();
                    debug!(url = %url, status = %status, "Received bookie response");
                    if status.is_success() {
                        return Ok(response);
                    }
                    let body = response.text().await.unwrap_or_default();
                    Err(handle_response_error(status, url, &body))
                }
            })
            .await
    }

    async fn get_json(&self, path: &str) -> SourceResult<Value> {
        let response = self.send(Method::GET, path).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| SourceError::invalid_data(format!("bookie response for {path}: {e}")))
    }
}

/// Map a non-success status to a [`SourceError`].
fn handle_response_error(status: StatusCode, url: &str, body: &str) -> SourceError {
    match status {
        StatusCode::NOT_FOUND => SourceError::not_found(url.to_string()),
        // the bookie reports a missing ledger as a server error
        _ if body.contains("NoSuchLedgerExists") => SourceError::not_found(url.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceError::AuthenticationFailed { system: SYSTEM }
        }
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => {
            SourceError::unreachable(SYSTEM, format!("HTTP {status} from {url}: {body}"))
        }
        _ => SourceError::operation_failed(format!("HTTP {status} from {url}: {body}")),
    }
}

#[async_trait]
impl LedgerInspector for BookieInspector {
    #[instrument(skip(self))]
    async fn list_ledger_ids(&self) -> SourceResult<Vec<u64>> {
        let body = self.get_json("/api/v1/ledger/list/").await?;
        let Value::Object(map) = body else {
            return Err(SourceError::invalid_data("ledger list is not a JSON object"));
        };
        let mut ids = Vec::with_capacity(map.len());
        for key in map.keys() {
            match key.parse::<u64>() {
                Ok(id) => ids.push(id),
                Err(_) => warn!(key = %key, "Ignoring non-numeric ledger id"),
            }
        }
        ids.sort_unstable();
        debug!(count = ids.len(), "Listed ledgers in storage ensemble");
        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn get_ledger_metadata(&self, ledger_id: u64) -> SourceResult<EnsembleLedger> {
        let body = self
            .get_json(&format!("/api/v1/ledger/metadata/?ledger_id={ledger_id}"))
            .await?;
        let mut by_id: BTreeMap<String, Value> = serde_json::from_value(body)?;
        let raw = by_id
            .remove(&ledger_id.to_string())
            .ok_or_else(|| SourceError::not_found(format!("ledger {ledger_id}")))?;
        let metadata: LedgerMetadataJson = serde_json::from_value(raw)?;
        metadata.into_ensemble_ledger(ledger_id)
    }

    #[instrument(skip(self))]
    async fn list_available_bookies(&self) -> SourceResult<Vec<String>> {
        let body = self
            .get_json("/api/v1/bookie/list_bookies/?type=rw&print_hostnames=false")
            .await?;
        let Value::Object(map) = body else {
            return Err(SourceError::invalid_data("bookie list is not a JSON object"));
        };
        let mut bookies: Vec<String> = map.keys().cloned().collect();
        bookies.sort();
        Ok(bookies)
    }

    #[instrument(skip(self))]
    async fn delete_ledger(&self, ledger_id: u64) -> SourceResult<()> {
        self.send(
            Method::DELETE,
            &format!("/api/v1/ledger/delete/?ledger_id={ledger_id}"),
        )
        .await?;
        info!(ledger_id, "Deleted ledger");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn flag_under_replicated(&self, ledger_id: u64) -> SourceResult<()> {
        // the auditor re-checks every ledger; there is no per-ledger trigger
        self.send(Method::PUT, "/api/v1/autorecovery/trigger_audit")
            .await?;
        info!(ledger_id, "Triggered replication audit");
        Ok(())
    }
}
