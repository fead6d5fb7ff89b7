//! Reconciliation error types.

use ledgerscope_connector::SourceError;
use thiserror::Error;

/// Errors that abort a reconciliation or repair step.
///
/// Per-topic and per-ledger failures are not errors; they are carried in
/// the report as data.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The coordination store could not be listed; nothing can be reconciled.
    #[error("coordination store unavailable while listing topics: {0}")]
    MetadataUnavailable(#[source] SourceError),

    /// The precondition a repair action was planned from no longer holds.
    #[error("stale plan for ledger {ledger_id}: {reason}")]
    StalePlan { ledger_id: u64, reason: String },

    /// A witness call failed while re-validating or applying an action.
    #[error("{0}")]
    Source(#[from] SourceError),

    /// Engine or planner configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Report (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ReconcileError {
    fn from(err: serde_json::Error) -> Self {
        ReconcileError::Serialization(err.to_string())
    }
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
