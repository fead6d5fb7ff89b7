//! Capability traits for the three witnesses.
//!
//! Each witness is reached through its own trait so the reconciliation
//! engine can be driven by real connectors or by in-memory fakes.

use async_trait::async_trait;

use crate::error::SourceResult;
use crate::topic::{Scope, TopicRef};
use crate::types::{EnsembleLedger, ListedLedger, RetentionPolicy, Versioned};

/// Raw key/value access to the coordination store.
///
/// `set` is a compare-and-set on the node version and is only used to
/// re-point managed-ledger metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Names of the children of `path`.
    async fn list(&self, path: &str) -> SourceResult<Vec<String>>;

    /// Value and version of the node at `path`.
    async fn get(&self, path: &str) -> SourceResult<Versioned>;

    /// Replace the value at `path` if its version is still `expected_version`.
    ///
    /// Returns the new version.
    async fn set(&self, path: &str, data: Vec<u8>, expected_version: i32) -> SourceResult<i32>;
}

/// Topic-level view of the coordination store.
#[async_trait]
pub trait MetadataReader: Send + Sync {
    /// Persistent topics (and partitions) within `scope`.
    async fn list_topics(&self, scope: &Scope) -> SourceResult<Vec<TopicRef>>;

    /// Data ledgers in managed-ledger order followed by cursor ledgers.
    ///
    /// A topic without a managed-ledger node yields an empty list.
    async fn get_ledger_list(&self, topic: &TopicRef) -> SourceResult<Vec<ListedLedger>>;

    /// Drop `ledger_id` from the topic's managed-ledger list.
    async fn remove_ledger(&self, topic: &TopicRef, ledger_id: u64) -> SourceResult<()>;
}

/// Ledger-level view of the storage ensemble.
#[async_trait]
pub trait LedgerInspector: Send + Sync {
    async fn list_ledger_ids(&self) -> SourceResult<Vec<u64>>;

    /// Metadata for one ledger, or `NotFound` when the ensemble has no such ledger.
    async fn get_ledger_metadata(&self, ledger_id: u64) -> SourceResult<EnsembleLedger>;

    /// Addresses of the bookies currently accepting writes.
    async fn list_available_bookies(&self) -> SourceResult<Vec<String>>;

    async fn delete_ledger(&self, ledger_id: u64) -> SourceResult<()>;

    /// Ask the auditor to re-replicate `ledger_id`.
    async fn flag_under_replicated(&self, ledger_id: u64) -> SourceResult<()>;
}

/// The serving layer's view through its admin API.
#[async_trait]
pub trait AdminBridge: Send + Sync {
    async fn list_topics(&self, scope: &Scope) -> SourceResult<Vec<TopicRef>>;

    /// Ledgers the serving layer holds for the topic: data, cursor, schema
    /// and compacted. `NotFound` when the topic does not exist.
    async fn get_topic_internal_stats(&self, topic: &TopicRef) -> SourceResult<Vec<ListedLedger>>;

    /// Storage size of the topic in bytes.
    async fn get_storage_size(&self, topic: &TopicRef) -> SourceResult<u64>;

    /// Retention set on the topic itself; `None` when it inherits.
    async fn get_topic_retention(&self, topic: &TopicRef) -> SourceResult<Option<RetentionPolicy>>;

    /// Retention of the `tenant/namespace`; `None` when unset.
    async fn get_namespace_retention(&self, namespace: &str)
        -> SourceResult<Option<RetentionPolicy>>;
}
