//! [`AdminBridge`] over the Pulsar admin REST API.

use async_trait::async_trait;
use ledgerscope_connector::prelude::*;
use reqwest::{header, redirect, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::config::AdminConfig;
use crate::stats::InternalStats;

const SYSTEM: WitnessSource = WitnessSource::AdminApi;

/// Serving-layer witness backed by the admin REST API.
pub struct PulsarAdminBridge {
    config: AdminConfig,
    client: Client,
    retry: RetryExecutor,
}

impl std::fmt::Debug for PulsarAdminBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulsarAdminBridge")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicStats {
    #[serde(default)]
    storage_size: Option<i64>,
}

impl PulsarAdminBridge {
    pub fn new(config: AdminConfig) -> SourceResult<Self> {
        config.validate()?;
        let client = Self::build_client(&config)?;
        let retry = RetryExecutor::new(config.connection.retry_config());
        Ok(Self {
            config,
            client,
            retry,
        })
    }

    fn build_client(config: &AdminConfig) -> SourceResult<Client> {
        // redirects are followed by hand so the bearer token reaches the owning broker
        let mut builder = Client::builder()
            .timeout(config.connection.request_timeout())
            .connect_timeout(config.connection.connect_timeout())
            .redirect(redirect::Policy::none());

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

    /// One GET including broker redirects.
    async fn get_once(&self, url: &str) -> SourceResult<Response> {
        let mut target = url.to_string();
        for _ in 0..=self.config.max_redirects {
            let mut request = self.client.get(&target);
            if let Some(token) = &self.config.auth_token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout {
                        system: SYSTEM,
                        timeout_ms: self.config.connection.request_timeout_ms,
                    }
                } else {
                    SourceError::unreachable_with_source(
                        SYSTEM,
                        format!("request to {target} failed"),
                        e,
                    )
                }
            })?;

            let status = response.status();
            debug!(url = %target, status = %status, "Received admin response");

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        SourceError::operation_failed(format!("HTTP {status} from {target} without location"))
                    })?;
                let next = url::Url::parse(&target)
                    .and_then(|base| base.join(location))
                    .map_err(|e| SourceError::invalid_data(format!("bad redirect '{location}': {e}")))?;
                debug!(from = %target, to = %next, "Following broker redirect");
                target = next.to_string();
                continue;
            }
            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            return Err(handle_response_error(status, &target, &body));
        }
        Err(SourceError::operation_failed(format!(
            "too many redirects for {url}"
        )))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SourceResult<T> {
        let url = self.config.url(path);
        let response = self.retry.execute(|| self.get_once(&url)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::invalid_data(format!("admin response for {path}: {e}")))
    }

    /// Like [`Self::get_json`], but an empty or `null` body is `None`.
    async fn get_optional_json<T: DeserializeOwned>(&self, path: &str) -> SourceResult<Option<T>> {
        let url = self.config.url(path);
        let response = self.retry.execute(|| self.get_once(&url)).await?;
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::invalid_data(format!("admin response for {path}: {e}")))?;
        let body = body.trim();
        if body.is_empty() || body == "null" {
            return Ok(None);
        }
        serde_json::from_str(body)
            .map(Some)
            .map_err(|e| SourceError::invalid_data(format!("admin response for {path}: {e}")))
    }

    async fn list_namespaces(&self, scope: &Scope) -> SourceResult<Vec<String>> {
        if let Some(ns) = scope.namespace() {
            return Ok(vec![ns.to_string()]);
        }
        match self
            .get_json::<Vec<String>>(&format!("/admin/v2/namespaces/{}", scope.tenant()))
            .await
        {
            Ok(namespaces) => Ok(namespaces),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

fn handle_response_error(status: StatusCode, url: &str, body: &str) -> SourceError {
    match status {
        StatusCode::NOT_FOUND => SourceError::not_found(url.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceError::AuthenticationFailed { system: SYSTEM }
        }
        s if s.is_server_error() => {
            SourceError::unreachable(SYSTEM, format!("HTTP {status} from {url}: {body}"))
        }
        _ => SourceError::operation_failed(format!("HTTP {status} from {url}: {body}")),
    }
}

#[async_trait]
impl AdminBridge for PulsarAdminBridge {
    #[instrument(skip(self), fields(scope = %scope))]
    async fn list_topics(&self, scope: &Scope) -> SourceResult<Vec<TopicRef>> {
        let mut topics = Vec::new();
        for namespace in self.list_namespaces(scope).await? {
            let names: Vec<String> = match self
                .get_json(&format!("/admin/v2/persistent/{namespace}"))
                .await
            {
                Ok(names) => names,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            for name in names {
                match name.parse::<TopicRef>() {
                    Ok(topic) if scope.contains(&topic) => topics.push(topic),
                    Ok(_) => {}
                    Err(e) => warn!(topic = %name, error = %e, "Skipping unparseable topic"),
                }
            }
        }
        topics.sort();
        topics.dedup();
        debug!(count = topics.len(), "Listed topics from admin API");
        Ok(topics)
    }

    #[instrument(skip(self), fields(topic = %topic))]
    async fn get_topic_internal_stats(&self, topic: &TopicRef) -> SourceResult<Vec<ListedLedger>> {
        let stats: InternalStats = self
            .get_json(&format!(
                "/admin/v2/persistent/{}/internalStats",
                topic.admin_path()
            ))
            .await?;
        Ok(stats.into_listed())
    }

    #[instrument(skip(self), fields(topic = %topic))]
    async fn get_storage_size(&self, topic: &TopicRef) -> SourceResult<u64> {
        let stats: TopicStats = self
            .get_json(&format!("/admin/v2/persistent/{}/stats", topic.admin_path()))
            .await?;
        Ok(stats
            .storage_size
            .and_then(|s| u64::try_from(s).ok())
            .unwrap_or(0))
    }

    #[instrument(skip(self), fields(topic = %topic))]
    async fn get_topic_retention(&self, topic: &TopicRef) -> SourceResult<Option<RetentionPolicy>> {
        self.get_optional_json(&format!(
            "/admin/v2/persistent/{}/retention",
            topic.admin_path()
        ))
        .await
    }

    #[instrument(skip(self))]
    async fn get_namespace_retention(
        &self,
        namespace: &str,
    ) -> SourceResult<Option<RetentionPolicy>> {
        self.get_optional_json(&format!("/admin/v2/namespaces/{namespace}/retention"))
            .await
    }
}
