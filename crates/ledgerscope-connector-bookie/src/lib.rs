//! # Bookie Connector
//!
//! Reads ledger metadata from the storage ensemble through the bookie HTTP
//! admin service and performs the two ensemble-side repairs: ledger
//! deletion and re-replication audits.
//!
//! Topic attribution comes from the ledger's own custom metadata; see
//! [`metadata::attribute_owner`].

pub mod config;
pub mod inspector;
pub mod metadata;

pub use config::BookieConfig;
pub use inspector::BookieInspector;
