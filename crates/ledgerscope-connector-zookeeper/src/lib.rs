//! # ZooKeeper Connector
//!
//! Reads managed-ledger and cursor metadata from the coordination store.
//!
//! [`ZookeeperStore`] is the raw [`MetadataStore`](ledgerscope_connector::MetadataStore);
//! [`ManagedLedgerReader`] turns any store into a
//! [`MetadataReader`](ledgerscope_connector::MetadataReader).
//! [`MemoryStore`] is an in-memory store for tests and dry experiments.

pub mod config;
pub mod memory;
pub mod proto;
pub mod reader;
pub mod store;

pub use config::ZookeeperConfig;
pub use memory::MemoryStore;
pub use reader::ManagedLedgerReader;
pub use store::ZookeeperStore;
