//! # Ledger Reconciliation
//!
//! Compares the three witnesses of a Pulsar cluster's storage, the
//! coordination store, the bookie ensemble and the admin API, and reports
//! every ledger whose witnesses disagree.
//!
//! ## Flow
//!
//! 1. [`ReconciliationEngine::reconcile`] lists topics, gathers each topic's
//!    metadata and admin views concurrently and looks up every candidate
//!    ledger in the ensemble through a bounded [`LookupPool`].
//! 2. [`classify`] derives each ledger's [`RecordStatus`] from its witnesses.
//! 3. [`RepairPlanner::plan`] turns a [`ReconciliationReport`] into a
//!    [`RepairPlan`], and [`RepairPlanner::execute`] applies it one action at
//!    a time after re-validating each against a fresh read.
//! 4. [`LedgerTrimmer::plan`] selects the oldest ledgers whose retention has
//!    expired and plans their deletion through the same executor.
//!
//! The engine holds no state between runs and never writes.

pub mod classify;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod planner;
pub mod pool;
pub mod report;
pub mod trim;
pub mod witness;

pub use classify::{classify, Conflict, ConflictField, ObservedValue, Reachability, RecordStatus};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ReconcileConfig, RepairConfig};
pub use engine::ReconciliationEngine;
pub use error::{ReconcileError, ReconcileResult};
pub use planner::{ActionOutcome, Alert, RepairAction, RepairKind, RepairPlan, RepairPlanner};
pub use pool::{LookupOutcome, LookupPool};
pub use report::{
    LedgerRecord, ReconciliationReport, ReportStatistics, SourceFailure, StorageSizeEntry,
    StorageSizeReport, TopicReport, TopicSummary, Verdict,
};
pub use trim::{LedgerTrimmer, TrimSelection};
pub use witness::LedgerWitness;

// Re-exported so callers can cancel a run without depending on tokio-util.
pub use tokio_util::sync::CancellationToken;
