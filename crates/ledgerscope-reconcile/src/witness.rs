//! One source's observation of one ledger.

use chrono::{DateTime, Utc};
use ledgerscope_connector::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a single witness reported about a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerWitness {
    pub source: WitnessSource,
    pub state: LedgerState,
    pub role: LedgerRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensemble: Option<Vec<String>>,
    /// Ensemble members currently available for writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_members: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_quorum: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctime: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark_delete: Option<Position>,
    pub observed_at: DateTime<Utc>,
}

impl LedgerWitness {
    /// A witness that could not be consulted.
    pub fn unknown(source: WitnessSource, role: LedgerRole, observed_at: DateTime<Utc>) -> Self {
        Self {
            source,
            state: LedgerState::Unknown,
            role,
            entry_count: None,
            ensemble: None,
            live_members: None,
            write_quorum: None,
            ctime: None,
            size: None,
            cursor: None,
            mark_delete: None,
            observed_at,
        }
    }

    /// From a metadata-store or admin-api listing.
    pub fn listed(source: WitnessSource, ledger: &ListedLedger, observed_at: DateTime<Utc>) -> Self {
        Self {
            state: ledger.state,
            entry_count: ledger.entries,
            size: ledger.size,
            cursor: ledger.cursor.clone(),
            mark_delete: ledger.mark_delete,
            ..Self::unknown(source, ledger.role, observed_at)
        }
    }

    /// From ensemble metadata; `available` is the set of writable bookies
    /// when it could be listed.
    pub fn from_ensemble(
        ledger: &EnsembleLedger,
        available: Option<&BTreeSet<String>>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let live_members = available.map(|bookies| {
            ledger
                .ensemble
                .iter()
                .filter(|b| bookies.contains(*b))
                .count() as u32
        });
        Self {
            state: ledger.state,
            entry_count: ledger.entry_count,
            ensemble: Some(ledger.ensemble.clone()),
            live_members,
            write_quorum: ledger.write_quorum,
            ctime: ledger.ctime,
            size: ledger.length,
            ..Self::unknown(
                WitnessSource::StorageEnsemble,
                ledger.owner.as_ref().map(|o| o.role).unwrap_or_default(),
                observed_at,
            )
        }
    }

    /// Equal in everything but the observation time.
    pub fn same_observation(&self, other: &LedgerWitness) -> bool {
        Self {
            observed_at: other.observed_at,
            ..self.clone()
        } == *other
    }
}
