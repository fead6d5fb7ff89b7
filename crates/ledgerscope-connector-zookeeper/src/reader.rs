//! Managed-ledger metadata reader.
//!
//! Walks `/managed-ledgers/<tenant>/<namespace>/persistent` for topics and
//! decodes each topic's ledger list and cursor nodes.

use async_trait::async_trait;
use ledgerscope_connector::prelude::*;
use prost::Message;
use tracing::{debug, info, instrument, warn};

use crate::proto::{ManagedCursorInfo, ManagedLedgerInfo};

const ROOT: &str = "/managed-ledgers";

/// [`MetadataReader`] over any [`MetadataStore`].
#[derive(Debug)]
pub struct ManagedLedgerReader<S> {
    store: S,
}

impl<S: MetadataStore> ManagedLedgerReader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Children of `path`, treating a missing node as empty.
    async fn children_or_empty(&self, path: &str) -> SourceResult<Vec<String>> {
        match self.store.list(path).await {
            Ok(mut children) => {
                children.sort();
                Ok(children)
            }
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn namespaces(&self, scope: &Scope) -> SourceResult<Vec<String>> {
        if let Some(ns) = scope.namespace() {
            return Ok(vec![ns.to_string()]);
        }
        let tenant = scope.tenant();
        let children = self.children_or_empty(&format!("{ROOT}/{tenant}")).await?;
        Ok(children
            .into_iter()
            .map(|ns| format!("{tenant}/{ns}"))
            .collect())
    }

    async fn read_cursors(&self, topic: &TopicRef, path: &str) -> SourceResult<Vec<ListedLedger>> {
        let mut cursors = Vec::new();
        for name in self.children_or_empty(path).await? {
            let cursor_path = format!("{path}/{name}");
            let node = match self.store.get(&cursor_path).await {
                Ok(node) => node,
                // deleted between list and get
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            let info = ManagedCursorInfo::decode(node.data.as_slice()).map_err(|e| {
                SourceError::invalid_data(format!("cursor {cursor_path}: {e}"))
            })?;

            let Ok(ledger_id) = u64::try_from(info.cursors_ledger_id) else {
                debug!(topic = %topic, cursor = %name, "Cursor has no ledger");
                continue;
            };
            let mark_delete = match (info.mark_delete_ledger_id, info.mark_delete_entry_id) {
                (Some(l), Some(e)) => Some(Position::new(l, e)),
                _ => None,
            };
            let cursor_name = match urlencoding::decode(&name) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => name.clone(),
            };
            cursors.push(
                ListedLedger::new(ledger_id, LedgerState::Open, LedgerRole::Cursor)
                    .with_cursor(cursor_name, mark_delete),
            );
        }
        Ok(cursors)
    }
}

fn decode_managed_ledger(path: &str, data: &[u8]) -> SourceResult<ManagedLedgerInfo> {
    ManagedLedgerInfo::decode(data)
        .map_err(|e| SourceError::invalid_data(format!("managed ledger {path}: {e}")))
}

#[async_trait]
impl<S: MetadataStore> MetadataReader for ManagedLedgerReader<S> {
    #[instrument(skip(self), fields(scope = %scope))]
    async fn list_topics(&self, scope: &Scope) -> SourceResult<Vec<TopicRef>> {
        let mut topics = Vec::new();
        for namespace in self.namespaces(scope).await? {
            let path = format!("{ROOT}/{namespace}/persistent");
            for encoded in self.children_or_empty(&path).await? {
                let ml_name = format!("{namespace}/persistent/{encoded}");
                match TopicRef::from_managed_ledger_name(&ml_name) {
                    Ok(topic) if scope.contains(&topic) => topics.push(topic),
                    Ok(_) => {}
                    Err(e) => warn!(path = %path, node = %encoded, error = %e, "Skipping unparseable managed ledger"),
                }
            }
        }
        topics.sort();
        debug!(count = topics.len(), "Listed topics from coordination store");
        Ok(topics)
    }

    #[instrument(skip(self), fields(topic = %topic))]
    async fn get_ledger_list(&self, topic: &TopicRef) -> SourceResult<Vec<ListedLedger>> {
        let path = topic.managed_ledger_path();
        let node = match self.store.get(&path).await {
            Ok(node) => node,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let info = decode_managed_ledger(&path, &node.data)?;
        let terminated = info.terminated_position.is_some();

        let count = info.ledger_info.len();
        let mut ledgers = Vec::with_capacity(count);
        for (idx, ledger) in info.ledger_info.iter().enumerate() {
            let Ok(ledger_id) = u64::try_from(ledger.ledger_id) else {
                continue;
            };
            // No per-ledger state is stored; the tail is the write ledger
            // unless the managed ledger is terminated.
            let state = if idx + 1 == count && !terminated {
                LedgerState::Open
            } else {
                LedgerState::Closed
            };
            let mut listed = ListedLedger::new(ledger_id, state, LedgerRole::Data);
            listed.entries = ledger.entries.and_then(|e| u64::try_from(e).ok());
            listed.size = ledger.size.and_then(|s| u64::try_from(s).ok());
            ledgers.push(listed);
        }

        ledgers.extend(self.read_cursors(topic, &path).await?);
        Ok(ledgers)
    }

    #[instrument(skip(self), fields(topic = %topic))]
    async fn remove_ledger(&self, topic: &TopicRef, ledger_id: u64) -> SourceResult<()> {
        let path = topic.managed_ledger_path();
        let node = self.store.get(&path).await?;
        let mut info = decode_managed_ledger(&path, &node.data)?;

        let before = info.ledger_info.len();
        info.ledger_info
            .retain(|l| u64::try_from(l.ledger_id).ok() != Some(ledger_id));
        if info.ledger_info.len() == before {
            return Err(SourceError::not_found(format!(
                "ledger {ledger_id} in {path}"
            )));
        }

        let version = self
            .store
            .set(&path, info.encode_to_vec(), node.version)
            .await?;
        info!(topic = %topic, ledger_id, version, "Removed ledger from managed-ledger list");
        Ok(())
    }
}
