//! Retention-driven trimming of the oldest ledgers.
//!
//! Frees space by deleting the oldest Pulsar ledgers, by count or by
//! creation date. Unless forced, a ledger is only planned when its topic's
//! retention (the topic policy, else the namespace policy) has expired. The
//! result is an ordinary [`RepairPlan`], so execution goes through
//! [`crate::RepairPlanner::execute`] and its staleness guard.

use chrono::{DateTime, Utc};
use ledgerscope_connector::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::classify::{classify, Reachability, RecordStatus};
use crate::clock::Clock;
use crate::config::ReconcileConfig;
use crate::error::ReconcileResult;
use crate::planner::{Alert, RepairAction, RepairKind, RepairPlan};
use crate::pool::{LookupOutcome, LookupPool};
use crate::report::LedgerRecord;
use crate::witness::LedgerWitness;

/// Which ledgers are considered for trimming, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimSelection {
    /// The `n` oldest.
    Oldest(usize),
    /// Every ledger created strictly before the instant.
    CreatedBefore(DateTime<Utc>),
}

impl fmt::Display for TrimSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrimSelection::Oldest(n) => write!(f, "oldest {n}"),
            TrimSelection::CreatedBefore(at) => write!(f, "created before {}", at.to_rfc3339()),
        }
    }
}

/// Why a ledger may be trimmed.
enum Expiry {
    Topic(i64),
    Namespace(i64),
    Live,
}

/// Plans trimming of the oldest ledgers.
pub struct LedgerTrimmer {
    metadata: Arc<dyn MetadataReader>,
    inspector: Arc<dyn LedgerInspector>,
    admin: Arc<dyn AdminBridge>,
    clock: Arc<dyn Clock>,
    config: ReconcileConfig,
}

impl LedgerTrimmer {
    pub fn new(
        metadata: Arc<dyn MetadataReader>,
        inspector: Arc<dyn LedgerInspector>,
        admin: Arc<dyn AdminBridge>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            metadata,
            inspector,
            admin,
            clock,
            config: ReconcileConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReconcileConfig) -> Self {
        self.config = config;
        self
    }

    /// Plan deleting the selected ledgers whose owner is in `scope`, or any
    /// Pulsar ledger when `scope` is `None`.
    ///
    /// With `force` retention is not consulted. Ledgers that name no topic
    /// or whose retention cannot be read become alerts.
    #[instrument(skip(self, scope, cancel))]
    pub async fn plan(
        &self,
        selection: TrimSelection,
        scope: Option<&Scope>,
        force: bool,
        cancel: &CancellationToken,
    ) -> ReconcileResult<RepairPlan> {
        self.config.validate()?;
        let timeout = self.config.call_timeout();
        let ids = with_timeout(
            WitnessSource::StorageEnsemble,
            timeout,
            self.inspector.list_ledger_ids(),
        )
        .await?;

        let pool = LookupPool::new(self.inspector.clone(), self.config.concurrency, timeout);
        let outcomes = pool.lookup_all(&ids, cancel).await;
        let uninspected = outcomes
            .iter()
            .filter(|o| !matches!(o, LookupOutcome::Found(_) | LookupOutcome::NotFound))
            .count();
        if uninspected > 0 {
            warn!(count = uninspected, "Some ledgers could not be inspected and are not considered");
        }

        let mut dated: Vec<(DateTime<Utc>, EnsembleLedger)> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                LookupOutcome::Found(ledger) => Some(ledger),
                _ => None,
            })
            .filter(|ledger| ledger.pulsar)
            .filter(|ledger| match (scope, &ledger.owner) {
                (None, _) => true,
                (Some(scope), Some(owner)) => scope.contains(&owner.topic),
                (Some(_), None) => false,
            })
            .filter_map(|ledger| ledger.ctime.map(|ctime| (ctime, ledger)))
            .collect();
        dated.sort_by_key(|(ctime, ledger)| (*ctime, ledger.ledger_id));

        let selected: Vec<EnsembleLedger> = match selection {
            TrimSelection::Oldest(n) => dated.into_iter().take(n).map(|(_, l)| l).collect(),
            TrimSelection::CreatedBefore(at) => dated
                .into_iter()
                .take_while(|(ctime, _)| *ctime < at)
                .map(|(_, l)| l)
                .collect(),
        };

        let available: Option<BTreeSet<String>> = match with_timeout(
            WitnessSource::StorageEnsemble,
            timeout,
            self.inspector.list_available_bookies(),
        )
        .await
        {
            Ok(bookies) => Some(bookies.into_iter().collect()),
            Err(e) => {
                warn!(error = %e, "Bookie listing failed");
                None
            }
        };

        let now = self.clock.now();
        let mut plan = RepairPlan::default();
        let mut topic_policies: BTreeMap<TopicRef, Option<RetentionPolicy>> = BTreeMap::new();
        let mut namespace_policies: BTreeMap<String, Option<RetentionPolicy>> = BTreeMap::new();

        for ledger in selected {
            let Some(owner) = ledger.owner.clone() else {
                plan.alerts.push(alert(&ledger, None, "no topic can be inferred from the ledger"));
                continue;
            };
            let ctime = ledger.ctime.unwrap_or(now);

            let expiry = if force {
                None
            } else {
                match self
                    .expiry(&owner.topic, ctime, now, &mut topic_policies, &mut namespace_policies)
                    .await
                {
                    Ok(Expiry::Live) => continue,
                    Ok(expiry) => Some(expiry),
                    Err(e) => {
                        warn!(ledger_id = ledger.ledger_id, topic = %owner.topic, error = %e, "Retention could not be read");
                        plan.alerts.push(alert(
                            &ledger,
                            Some(&owner.topic),
                            &format!("retention could not be read: {e}"),
                        ));
                        continue;
                    }
                }
            };

            let record = match self
                .precondition(&ledger, &owner.topic, available.as_ref())
                .await
            {
                Ok(record) => record,
                Err(e) => {
                    warn!(ledger_id = ledger.ledger_id, topic = %owner.topic, error = %e, "Managed ledger could not be read");
                    plan.alerts.push(alert(
                        &ledger,
                        Some(&owner.topic),
                        &format!("managed ledger could not be read: {e}"),
                    ));
                    continue;
                }
            };
            let mut action = RepairAction::new(Some(&owner.topic), &record, RepairKind::TrimExpired);
            action.message = Some(match expiry {
                Some(Expiry::Topic(minutes)) => format!("topic retention of {minutes} minutes expired"),
                Some(Expiry::Namespace(minutes)) => {
                    format!("namespace retention of {minutes} minutes expired")
                }
                _ => "forced".to_string(),
            });
            plan.actions.push(action);
        }

        info!(
            actions = plan.actions.len(),
            alerts = plan.alerts.len(),
            "Trim plan computed"
        );
        Ok(plan)
    }

    /// Topic policy first; the namespace policy only when the topic's has
    /// not expired the ledger.
    async fn expiry(
        &self,
        topic: &TopicRef,
        ctime: DateTime<Utc>,
        now: DateTime<Utc>,
        topic_policies: &mut BTreeMap<TopicRef, Option<RetentionPolicy>>,
        namespace_policies: &mut BTreeMap<String, Option<RetentionPolicy>>,
    ) -> SourceResult<Expiry> {
        let timeout = self.config.call_timeout();
        let policy = match topic_policies.get(topic) {
            Some(policy) => *policy,
            None => {
                let policy = match with_timeout(
                    WitnessSource::AdminApi,
                    timeout,
                    self.admin.get_topic_retention(topic),
                )
                .await
                {
                    Ok(policy) => policy,
                    Err(e) if e.is_not_found() => None,
                    Err(e) => return Err(e),
                };
                topic_policies.insert(topic.clone(), policy);
                policy
            }
        };
        if let Some(policy) = policy.filter(|p| p.expired(ctime, now)) {
            return Ok(Expiry::Topic(policy.retention_time_in_minutes));
        }

        let namespace = topic.namespace();
        let policy = match namespace_policies.get(namespace) {
            Some(policy) => *policy,
            None => {
                let policy = with_timeout(
                    WitnessSource::AdminApi,
                    timeout,
                    self.admin.get_namespace_retention(namespace),
                )
                .await?;
                namespace_policies.insert(namespace.to_string(), policy);
                policy
            }
        };
        Ok(match policy.filter(|p| p.expired(ctime, now)) {
            Some(policy) => Expiry::Namespace(policy.retention_time_in_minutes),
            None => Expiry::Live,
        })
    }

    /// The ledger as the managed ledger and the ensemble see it now.
    async fn precondition(
        &self,
        ledger: &EnsembleLedger,
        topic: &TopicRef,
        available: Option<&BTreeSet<String>>,
    ) -> SourceResult<LedgerRecord> {
        let now = self.clock.now();
        let listed = with_timeout(
            WitnessSource::MetadataStore,
            self.config.call_timeout(),
            self.metadata.get_ledger_list(topic),
        )
        .await?;

        let mut witnesses: Vec<LedgerWitness> = listed
            .iter()
            .find(|l| l.ledger_id == ledger.ledger_id)
            .map(|l| LedgerWitness::listed(WitnessSource::MetadataStore, l, now))
            .into_iter()
            .collect();
        witnesses.push(LedgerWitness::from_ensemble(ledger, available, now));

        let reach = Reachability {
            metadata: true,
            admin: false,
        };
        let classification = classify(&witnesses, reach, self.config.replication_factor);
        Ok(LedgerRecord {
            ledger_id: ledger.ledger_id,
            status: classification.status,
            witnesses,
            conflicts: classification.conflicts,
        })
    }
}

fn alert(ledger: &EnsembleLedger, topic: Option<&TopicRef>, message: &str) -> Alert {
    Alert {
        topic: topic.cloned(),
        ledger_id: ledger.ledger_id,
        status: RecordStatus::Indeterminate,
        message: message.to_string(),
    }
}
