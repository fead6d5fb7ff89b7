//! Pure classification of a ledger's witness set.
//!
//! The status is a function of the witnesses and of which listing sources
//! were reachable for the topic, nothing else.

use ledgerscope_connector::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::witness::LedgerWitness;

/// Derived status of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    /// All applicable witnesses present and in agreement.
    Consistent,
    /// Witnesses present but disagreeing.
    Divergent,
    /// Only the ensemble knows the ledger.
    Orphaned,
    /// Listed for the topic but absent from the ensemble.
    Missing,
    /// Fewer live ensemble members than the replication factor.
    UnderReplicated,
    /// The ensemble could not be consulted.
    Indeterminate,
}

impl RecordStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Consistent => "consistent",
            RecordStatus::Divergent => "divergent",
            RecordStatus::Orphaned => "orphaned",
            RecordStatus::Missing => "missing",
            RecordStatus::UnderReplicated => "under-replicated",
            RecordStatus::Indeterminate => "indeterminate",
        }
    }

    /// Higher wins when several statuses apply.
    #[must_use]
    pub fn precedence(&self) -> u8 {
        match self {
            RecordStatus::Missing => 5,
            RecordStatus::Orphaned => 4,
            RecordStatus::Divergent => 3,
            RecordStatus::Indeterminate => 2,
            RecordStatus::UnderReplicated => 1,
            RecordStatus::Consistent => 0,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Field the witnesses disagree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictField {
    /// Listed by one of metadata-store / admin-api but not the other.
    Presence,
    /// Open/closed.
    State,
    /// Entry count of a closed ledger.
    Entries,
}

/// A value as one source reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedValue {
    pub source: WitnessSource,
    pub value: String,
}

/// One disagreement, with every source's value verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub field: ConflictField,
    pub observed: Vec<ObservedValue>,
}

/// Which listing sources answered for the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reachability {
    pub metadata: bool,
    pub admin: bool,
}

impl Reachability {
    pub const ALL: Reachability = Reachability {
        metadata: true,
        admin: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: RecordStatus,
    pub conflicts: Vec<Conflict>,
}

fn find(witnesses: &[LedgerWitness], source: WitnessSource) -> Option<&LedgerWitness> {
    witnesses.iter().find(|w| w.source == source)
}

/// Classify one ledger.
///
/// `replication_factor` overrides the ledger's own write quorum when set.
pub fn classify(
    witnesses: &[LedgerWitness],
    reach: Reachability,
    replication_factor: Option<u32>,
) -> Classification {
    let metadata = find(witnesses, WitnessSource::MetadataStore);
    let admin = find(witnesses, WitnessSource::AdminApi);
    let ensemble = find(witnesses, WitnessSource::StorageEnsemble);

    let role = metadata
        .or(admin)
        .or(ensemble)
        .map(|w| w.role)
        .unwrap_or_default();
    let metadata_applies = role.tracked_by_metadata_store();
    let listed = metadata.is_some() || admin.is_some();

    let conflicts = find_conflicts(witnesses, reach, metadata_applies);
    let mut status = RecordStatus::Consistent;
    let mut raise = |candidate: RecordStatus| {
        if candidate.precedence() > status.precedence() {
            status = candidate;
        }
    };

    if listed && ensemble.is_none() {
        raise(RecordStatus::Missing);
    }
    if !listed {
        if let Some(ens) = ensemble {
            let evidence = (metadata_applies && reach.metadata) || reach.admin;
            if evidence && ens.state.is_known() {
                raise(RecordStatus::Orphaned);
            } else {
                raise(RecordStatus::Indeterminate);
            }
        }
    }
    if !conflicts.is_empty() {
        raise(RecordStatus::Divergent);
    }
    if let Some(ens) = ensemble {
        if !ens.state.is_known() {
            raise(RecordStatus::Indeterminate);
        } else if let (Some(live), Some(wanted)) =
            (ens.live_members, replication_factor.or(ens.write_quorum))
        {
            if live < wanted {
                raise(RecordStatus::UnderReplicated);
            }
        }
    }

    Classification { status, conflicts }
}

fn find_conflicts(
    witnesses: &[LedgerWitness],
    reach: Reachability,
    metadata_applies: bool,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    if metadata_applies && reach.metadata && reach.admin {
        let in_metadata = find(witnesses, WitnessSource::MetadataStore).is_some();
        let in_admin = find(witnesses, WitnessSource::AdminApi).is_some();
        if in_metadata != in_admin {
            let presence = |present: bool| if present { "listed" } else { "absent" }.to_string();
            conflicts.push(Conflict {
                field: ConflictField::Presence,
                observed: vec![
                    ObservedValue {
                        source: WitnessSource::MetadataStore,
                        value: presence(in_metadata),
                    },
                    ObservedValue {
                        source: WitnessSource::AdminApi,
                        value: presence(in_admin),
                    },
                ],
            });
        }
    }

    let known: Vec<&LedgerWitness> = witnesses.iter().filter(|w| w.state.is_known()).collect();
    let states_differ = known.windows(2).any(|pair| pair[0].state != pair[1].state);
    if states_differ {
        conflicts.push(Conflict {
            field: ConflictField::State,
            observed: known
                .iter()
                .map(|w| ObservedValue {
                    source: w.source,
                    value: w.state.to_string(),
                })
                .collect(),
        });
    } else if known.iter().all(|w| w.state == LedgerState::Closed) {
        let counted: Vec<(WitnessSource, u64)> = known
            .iter()
            .filter_map(|w| w.entry_count.map(|c| (w.source, c)))
            .collect();
        if counted.windows(2).any(|pair| pair[0].1 != pair[1].1) {
            conflicts.push(Conflict {
                field: ConflictField::Entries,
                observed: counted
                    .into_iter()
                    .map(|(source, count)| ObservedValue {
                        source,
                        value: count.to_string(),
                    })
                    .collect(),
            });
        }
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn listed(source: WitnessSource, state: LedgerState) -> LedgerWitness {
        LedgerWitness {
            state,
            ..LedgerWitness::unknown(source, LedgerRole::Data, now())
        }
    }

    fn ensemble(state: LedgerState, live: u32, quorum: u32) -> LedgerWitness {
        LedgerWitness {
            state,
            live_members: Some(live),
            write_quorum: Some(quorum),
            ensemble: Some(vec!["b1".into(), "b2".into()]),
            ..LedgerWitness::unknown(WitnessSource::StorageEnsemble, LedgerRole::Data, now())
        }
    }

    fn md(state: LedgerState) -> LedgerWitness {
        listed(WitnessSource::MetadataStore, state)
    }

    fn admin(state: LedgerState) -> LedgerWitness {
        listed(WitnessSource::AdminApi, state)
    }

    use LedgerState::{Closed, Open, Unknown};

    #[test]
    fn test_consistent() {
        let c = classify(
            &[md(Closed), ensemble(Closed, 2, 2), admin(Closed)],
            Reachability::ALL,
            None,
        );
        assert_eq!(c.status, RecordStatus::Consistent);
        assert!(c.conflicts.is_empty());
    }

    #[test]
    fn test_ensemble_only_is_orphaned() {
        let c = classify(&[ensemble(Closed, 2, 2)], Reachability::ALL, None);
        assert_eq!(c.status, RecordStatus::Orphaned);
    }

    #[test]
    fn test_orphan_needs_a_reachable_listing_source() {
        let blind = Reachability {
            metadata: false,
            admin: false,
        };
        let c = classify(&[ensemble(Closed, 2, 2)], blind, None);
        assert_eq!(c.status, RecordStatus::Indeterminate);

        let admin_only = Reachability {
            metadata: false,
            admin: true,
        };
        let c = classify(&[ensemble(Closed, 2, 2)], admin_only, None);
        assert_eq!(c.status, RecordStatus::Orphaned);
    }

    #[test]
    fn test_listed_but_not_in_ensemble_is_missing() {
        let c = classify(&[md(Closed), admin(Closed)], Reachability::ALL, None);
        assert_eq!(c.status, RecordStatus::Missing);

        let c = classify(&[admin(Closed)], Reachability::ALL, None);
        assert_eq!(c.status, RecordStatus::Missing);
        assert_eq!(c.conflicts[0].field, ConflictField::Presence);
    }

    #[test]
    fn test_state_disagreement_is_divergent_with_values_verbatim() {
        let c = classify(
            &[md(Open), ensemble(Closed, 2, 2), admin(Closed)],
            Reachability::ALL,
            None,
        );
        assert_eq!(c.status, RecordStatus::Divergent);
        assert_eq!(c.conflicts.len(), 1);
        let conflict = &c.conflicts[0];
        assert_eq!(conflict.field, ConflictField::State);
        let values: Vec<(WitnessSource, &str)> = conflict
            .observed
            .iter()
            .map(|o| (o.source, o.value.as_str()))
            .collect();
        assert_eq!(
            values,
            vec![
                (WitnessSource::MetadataStore, "open"),
                (WitnessSource::StorageEnsemble, "closed"),
                (WitnessSource::AdminApi, "closed"),
            ]
        );
    }

    #[test]
    fn test_presence_disagreement_only_when_both_reachable() {
        let witnesses = [md(Closed), ensemble(Closed, 2, 2)];
        let c = classify(&witnesses, Reachability::ALL, None);
        assert_eq!(c.status, RecordStatus::Divergent);

        let admin_down = Reachability {
            metadata: true,
            admin: false,
        };
        let c = classify(&witnesses, admin_down, None);
        assert_eq!(c.status, RecordStatus::Consistent);
    }

    #[test]
    fn test_schema_ledgers_ignore_metadata_store() {
        let mut admin_w = admin(Closed);
        admin_w.role = LedgerRole::Schema;
        let mut ens = ensemble(Closed, 2, 2);
        ens.role = LedgerRole::Schema;
        let c = classify(&[ens, admin_w], Reachability::ALL, None);
        assert_eq!(c.status, RecordStatus::Consistent);
    }

    #[test]
    fn test_entry_count_conflict_for_closed_ledgers() {
        let mut m = md(Closed);
        m.entry_count = Some(10);
        let mut e = ensemble(Closed, 2, 2);
        e.entry_count = Some(12);
        let c = classify(&[m, e, admin(Closed)], Reachability::ALL, None);
        assert_eq!(c.status, RecordStatus::Divergent);
        assert_eq!(c.conflicts[0].field, ConflictField::Entries);
        assert_eq!(c.conflicts[0].observed.len(), 2);
    }

    #[test]
    fn test_unknown_ensemble_is_indeterminate() {
        let e = LedgerWitness::unknown(WitnessSource::StorageEnsemble, LedgerRole::Data, now());
        let c = classify(&[md(Closed), e, admin(Closed)], Reachability::ALL, None);
        assert_eq!(c.status, RecordStatus::Indeterminate);
    }

    #[test]
    fn test_under_replication() {
        let witnesses = [md(Closed), ensemble(Closed, 1, 2), admin(Closed)];
        assert_eq!(
            classify(&witnesses, Reachability::ALL, None).status,
            RecordStatus::UnderReplicated
        );

        let healthy = [md(Closed), ensemble(Closed, 2, 2), admin(Closed)];
        assert_eq!(
            classify(&healthy, Reachability::ALL, Some(3)).status,
            RecordStatus::UnderReplicated
        );
    }

    #[test]
    fn test_precedence() {
        // divergent beats under-replicated
        let c = classify(
            &[md(Open), ensemble(Closed, 1, 3), admin(Closed)],
            Reachability::ALL,
            None,
        );
        assert_eq!(c.status, RecordStatus::Divergent);

        // missing beats divergent, conflicts are still kept
        let c = classify(&[md(Open), admin(Closed)], Reachability::ALL, None);
        assert_eq!(c.status, RecordStatus::Missing);
        assert_eq!(c.conflicts.len(), 1);

        // unknown states never conflict
        let c = classify(
            &[md(Closed), listed(WitnessSource::AdminApi, Unknown), ensemble(Closed, 2, 2)],
            Reachability::ALL,
            None,
        );
        assert_eq!(c.status, RecordStatus::Consistent);
    }
}
