//! # Admin API Connector
//!
//! The serving layer's own view of topic-to-ledger assignment, read from
//! the Pulsar admin REST API (`/admin/v2`). Used as the third, advisory
//! witness and for storage-size reporting.

pub mod bridge;
pub mod config;
pub mod stats;

pub use bridge::PulsarAdminBridge;
pub use config::AdminConfig;
