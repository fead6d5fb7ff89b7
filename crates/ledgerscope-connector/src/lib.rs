//! # Connector Framework
//!
//! Core abstractions for reading the three witnesses of a Pulsar cluster's
//! durable storage: the coordination store, the bookie ensemble and the
//! admin API.
//!
//! ## Architecture
//!
//! - [`MetadataStore`] - raw coordination-store access (`list`, `get`, `set`)
//! - [`MetadataReader`] - managed-ledger lists per topic
//! - [`LedgerInspector`] - per-ledger metadata from the ensemble
//! - [`AdminBridge`] - internal stats from the serving layer
//!
//! Connectors translate wire formats into [`ListedLedger`] and
//! [`EnsembleLedger`] values and report failures as [`SourceError`], which
//! carries the transient/permanent split the retry logic keys on.
//!
//! ## Crate Organization
//!
//! - [`topic`] - `TopicRef` and `Scope`
//! - [`types`] - witness enums and ledger views
//! - [`error`] - error types with transient/permanent classification
//! - [`traits`] - capability traits
//! - [`config`] - connection settings shared by connectors
//! - [`resilience`] - retry with backoff and per-call deadlines

pub mod config;
pub mod error;
pub mod resilience;
pub mod topic;
pub mod traits;
pub mod types;

pub use config::{ConnectionSettings, TlsConfig};
pub use error::{SourceError, SourceResult};
pub use resilience::{RetryConfig, RetryExecutor};
pub use topic::{ParseTopicError, Scope, TopicRef};
pub use traits::{AdminBridge, LedgerInspector, MetadataReader, MetadataStore};
pub use types::{
    EnsembleLedger, LedgerOwner, LedgerRole, LedgerState, ListedLedger, Position, RetentionPolicy,
    Versioned, WitnessSource,
};

/// Prelude module for convenient imports.
///
/// ```
/// use ledgerscope_connector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConnectionSettings, TlsConfig};
    pub use crate::error::{SourceError, SourceResult};
    pub use crate::resilience::{with_timeout, RetryConfig, RetryExecutor};
    pub use crate::topic::{Scope, TopicRef};
    pub use crate::traits::{AdminBridge, LedgerInspector, MetadataReader, MetadataStore};
    pub use crate::types::{
        EnsembleLedger, LedgerOwner, LedgerRole, LedgerState, ListedLedger, Position,
        RetentionPolicy, Versioned, WitnessSource,
    };
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;
