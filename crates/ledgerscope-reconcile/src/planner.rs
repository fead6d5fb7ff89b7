//! Repair planning and guarded execution.
//!
//! A plan is derived from a report without touching any system. Executing
//! it is sequential, and every action is re-validated against a fresh read
//! of the ledger first: if the ledger changed since the report was taken the
//! action is skipped as stale.

use chrono::{DateTime, Duration, Utc};
use ledgerscope_connector::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::classify::RecordStatus;
use crate::clock::Clock;
use crate::config::RepairConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::report::{LedgerRecord, ReconciliationReport, TopicSummary};
use crate::witness::LedgerWitness;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairKind {
    /// Delete a ledger no topic references.
    DeleteOrphan,
    /// Drop a ledger the ensemble no longer has from the managed-ledger list.
    RepointMetadata,
    /// Ask the auditor to re-replicate.
    FlagUnderReplicated,
    /// Delete one of the oldest ledgers to free space.
    TrimExpired,
}

impl RepairKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairKind::DeleteOrphan => "delete-orphan",
            RepairKind::RepointMetadata => "repoint-metadata",
            RepairKind::FlagUnderReplicated => "flag-under-replicated",
            RepairKind::TrimExpired => "trim-expired",
        }
    }
}

impl fmt::Display for RepairKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionOutcome {
    Success,
    Failure,
    /// The ledger changed after planning; nothing was applied.
    SkippedStale,
    /// Orphan younger than the minimum age.
    Deferred,
}

impl ActionOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Success => "success",
            ActionOutcome::Failure => "failure",
            ActionOutcome::SkippedStale => "skipped-stale",
            ActionOutcome::Deferred => "deferred",
        }
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One planned repair and, once executed, its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairAction {
    pub ledger_id: u64,
    /// Absent for ledgers attributed to no topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicRef>,
    pub kind: RepairKind,
    /// The record the action was computed from.
    pub precondition: LedgerRecord,
    #[serde(default)]
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ActionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RepairAction {
    pub(crate) fn new(topic: Option<&TopicRef>, record: &LedgerRecord, kind: RepairKind) -> Self {
        Self {
            ledger_id: record.ledger_id,
            topic: topic.cloned(),
            kind,
            precondition: record.clone(),
            applied: false,
            outcome: None,
            message: None,
        }
    }

    /// The topic name, or `-` when there is none.
    pub fn topic_label(&self) -> String {
        self.topic
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string)
    }

    fn finish(&mut self, outcome: ActionOutcome, message: Option<String>) {
        self.applied = outcome == ActionOutcome::Success;
        self.outcome = Some(outcome);
        self.message = message;
    }
}

/// A finding that needs an operator rather than an automatic action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicRef>,
    pub ledger_id: u64,
    pub status: RecordStatus,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPlan {
    pub actions: Vec<RepairAction>,
    pub alerts: Vec<Alert>,
}

impl RepairPlan {
    /// Actions that would be applied on execution.
    pub fn pending(&self) -> impl Iterator<Item = &RepairAction> {
        self.actions.iter().filter(|a| a.outcome.is_none())
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.alerts.is_empty()
    }
}

/// Turns reports into repair plans and executes them.
pub struct RepairPlanner {
    metadata: Arc<dyn MetadataReader>,
    inspector: Arc<dyn LedgerInspector>,
    clock: Arc<dyn Clock>,
    config: RepairConfig,
}

impl RepairPlanner {
    pub fn new(
        metadata: Arc<dyn MetadataReader>,
        inspector: Arc<dyn LedgerInspector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            metadata,
            inspector,
            clock,
            config: RepairConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RepairConfig) -> Self {
        self.config = config;
        self
    }

    /// Delete `record`, deferred while it is younger than the minimum age.
    fn orphan_action(
        &self,
        topic: Option<&TopicRef>,
        record: &LedgerRecord,
        now: DateTime<Utc>,
        min_age: Duration,
    ) -> RepairAction {
        let mut action = RepairAction::new(topic, record, RepairKind::DeleteOrphan);
        let ctime = record
            .witness(WitnessSource::StorageEnsemble)
            .and_then(|w| w.ctime);
        if let Some(ctime) = ctime.filter(|c| now - *c < min_age) {
            action.outcome = Some(ActionOutcome::Deferred);
            action.message = Some(format!(
                "created {}, younger than {} days",
                ctime.to_rfc3339(),
                self.config.min_orphan_age_days
            ));
        }
        action
    }

    /// Derive actions and alerts from `report`. Unreachable topics are skipped.
    pub fn plan(&self, report: &ReconciliationReport) -> RepairPlan {
        let now = self.clock.now();
        let min_age = self.config.min_orphan_age();
        let mut plan = RepairPlan::default();

        for (topic, topic_report) in &report.topics {
            if topic_report.summary == TopicSummary::Unreachable {
                continue;
            }
            for record in &topic_report.ledgers {
                match record.status {
                    RecordStatus::Orphaned => {
                        plan.actions
                            .push(self.orphan_action(Some(topic), record, now, min_age));
                    }
                    RecordStatus::UnderReplicated => {
                        plan.actions.push(RepairAction::new(
                            Some(topic),
                            record,
                            RepairKind::FlagUnderReplicated,
                        ));
                    }
                    RecordStatus::Missing => {
                        plan.alerts.push(Alert {
                            topic: Some(topic.clone()),
                            ledger_id: record.ledger_id,
                            status: record.status,
                            message: "ledger is referenced but absent from the storage ensemble"
                                .to_string(),
                        });
                        let repointable = record.role() == LedgerRole::Data
                            && record.witness(WitnessSource::MetadataStore).is_some();
                        if self.config.repoint_missing && repointable {
                            plan.actions.push(RepairAction::new(
                                Some(topic),
                                record,
                                RepairKind::RepointMetadata,
                            ));
                        }
                    }
                    _ => {}
                }
            }
        }

        for record in &report.unattributed {
            if record.status == RecordStatus::Orphaned {
                plan.actions.push(self.orphan_action(None, record, now, min_age));
            }
        }

        info!(
            actions = plan.actions.len(),
            pending = plan.pending().count(),
            alerts = plan.alerts.len(),
            "Repair plan computed"
        );
        plan
    }

    /// Execute the plan one action at a time.
    ///
    /// Deferred actions are passed through untouched.
    pub async fn execute(&self, plan: RepairPlan) -> Vec<RepairAction> {
        let mut executed = Vec::with_capacity(plan.actions.len());
        for mut action in plan.actions {
            if action.outcome.is_none() {
                self.execute_one(&mut action).await;
            }
            executed.push(action);
        }
        executed
    }

    #[instrument(skip(self, action), fields(ledger_id = action.ledger_id, topic = %action.topic_label(), kind = %action.kind))]
    async fn execute_one(&self, action: &mut RepairAction) {
        match self.revalidate(action).await {
            Ok(()) => {}
            Err(ReconcileError::StalePlan { reason, .. }) => {
                warn!(reason = %reason, "Skipping stale repair action");
                action.finish(ActionOutcome::SkippedStale, Some(reason));
                return;
            }
            Err(e) => {
                warn!(error = %e, "Could not re-validate repair action");
                action.finish(ActionOutcome::Failure, Some(e.to_string()));
                return;
            }
        }

        let result = match action.kind {
            RepairKind::DeleteOrphan | RepairKind::TrimExpired => {
                self.inspector.delete_ledger(action.ledger_id).await
            }
            RepairKind::FlagUnderReplicated => {
                self.inspector.flag_under_replicated(action.ledger_id).await
            }
            RepairKind::RepointMetadata => match &action.topic {
                Some(topic) => self.metadata.remove_ledger(topic, action.ledger_id).await,
                None => Err(SourceError::not_found(format!(
                    "managed ledger listing ledger {}",
                    action.ledger_id
                ))),
            },
        };

        match result {
            Ok(()) => {
                info!("Repair action applied");
                action.finish(ActionOutcome::Success, None);
            }
            Err(e @ SourceError::VersionConflict { .. }) => {
                warn!(error = %e, "Metadata changed while applying repair action");
                action.finish(ActionOutcome::SkippedStale, Some(e.to_string()));
            }
            Err(e) => {
                warn!(error = %e, "Repair action failed");
                action.finish(ActionOutcome::Failure, Some(e.to_string()));
            }
        }
    }

    /// Re-read the metadata-store and ensemble witnesses and compare them
    /// with the action's precondition, ignoring observation times.
    ///
    /// Ledgers without a topic have no managed ledger to re-read.
    async fn revalidate(&self, action: &RepairAction) -> ReconcileResult<()> {
        let snapshot = &action.precondition;
        let ledger_id = action.ledger_id;
        let now = self.clock.now();

        if let Some(topic) = &action.topic {
            let listed = self.metadata.get_ledger_list(topic).await?;
            let fresh_metadata = listed
                .iter()
                .find(|l| l.ledger_id == ledger_id)
                .map(|l| LedgerWitness::listed(WitnessSource::MetadataStore, l, now));
            if !same(snapshot.witness(WitnessSource::MetadataStore), fresh_metadata.as_ref()) {
                return Err(stale(ledger_id, "metadata-store witness changed"));
            }
        }

        let snapshot_ensemble = snapshot.witness(WitnessSource::StorageEnsemble);
        let fresh_ensemble = match self.inspector.get_ledger_metadata(ledger_id).await {
            Ok(ledger) => {
                let available = match snapshot_ensemble.and_then(|w| w.live_members) {
                    Some(_) => Some(
                        self.inspector
                            .list_available_bookies()
                            .await?
                            .into_iter()
                            .collect::<BTreeSet<_>>(),
                    ),
                    None => None,
                };
                Some(LedgerWitness::from_ensemble(&ledger, available.as_ref(), now))
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        if !same(snapshot_ensemble, fresh_ensemble.as_ref()) {
            return Err(stale(ledger_id, "storage-ensemble witness changed"));
        }
        Ok(())
    }
}

fn same(snapshot: Option<&LedgerWitness>, fresh: Option<&LedgerWitness>) -> bool {
    match (snapshot, fresh) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_observation(b),
        _ => false,
    }
}

fn stale(ledger_id: u64, reason: &str) -> ReconcileError {
    ReconcileError::StalePlan {
        ledger_id,
        reason: reason.to_string(),
    }
}
