//! Reconciliation engine.
//!
//! Merges the coordination store, the storage ensemble and the admin API
//! into one record per ledger and classifies each record. The engine only
//! reads; it never changes any of the three systems.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use ledgerscope_connector::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::classify::{classify, Reachability};
use crate::clock::Clock;
use crate::config::ReconcileConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::pool::{LookupOutcome, LookupPool};
use crate::report::{
    LedgerRecord, ReconciliationReport, SourceFailure, StorageSizeEntry, StorageSizeReport,
    TopicReport,
};
use crate::witness::LedgerWitness;

/// One listing source's answer for a topic.
struct Listing {
    result: Result<Vec<ListedLedger>, SourceFailure>,
    /// The source answered NotFound.
    absent: bool,
    observed_at: DateTime<Utc>,
}

struct TopicViews {
    metadata: Listing,
    admin: Listing,
}

impl TopicViews {
    fn reachability(&self) -> Reachability {
        Reachability {
            metadata: self.metadata.result.is_ok(),
            admin: self.admin.result.is_ok(),
        }
    }

    fn failures(&self) -> Vec<SourceFailure> {
        [&self.metadata.result, &self.admin.result]
            .into_iter()
            .filter_map(|r| r.as_ref().err().cloned())
            .collect()
    }

    fn listed(&self) -> impl Iterator<Item = (WitnessSource, &ListedLedger, DateTime<Utc>)> {
        let metadata_at = self.metadata.observed_at;
        let admin_at = self.admin.observed_at;
        let metadata = self
            .metadata
            .result
            .iter()
            .flatten()
            .map(move |l| (WitnessSource::MetadataStore, l, metadata_at));
        let admin = self
            .admin
            .result
            .iter()
            .flatten()
            .map(move |l| (WitnessSource::AdminApi, l, admin_at));
        metadata.chain(admin)
    }
}

/// Ensemble lookups for every ledger id that was looked at.
struct EnsembleView {
    lookups: BTreeMap<u64, LookupOutcome>,
    available: Option<BTreeSet<String>>,
    observed_at: DateTime<Utc>,
}

impl EnsembleView {
    fn witness(&self, ledger_id: u64, role: LedgerRole) -> Option<LedgerWitness> {
        match self.lookups.get(&ledger_id) {
            Some(LookupOutcome::Found(ledger)) => Some(LedgerWitness::from_ensemble(
                ledger,
                self.available.as_ref(),
                self.observed_at,
            )),
            Some(LookupOutcome::NotFound) => None,
            _ => Some(LedgerWitness::unknown(
                WitnessSource::StorageEnsemble,
                role,
                self.observed_at,
            )),
        }
    }
}

/// Which topic each in-scope pulsar ledger belongs to, per the ensemble.
#[derive(Default)]
struct Ownership {
    by_topic: BTreeMap<TopicRef, Vec<u64>>,
    /// Ledgers named after a partitioned topic, homed on one partition.
    shared: BTreeMap<u64, TopicRef>,
}

impl Ownership {
    /// Attribute every owned ledger to a topic.
    ///
    /// A ledger whose owner is the base name of a partitioned topic (schema
    /// ledgers are) is homed on the lowest listed partition, and every
    /// partition's admin view decides its verdict.
    fn resolve(
        lookups: &BTreeMap<u64, LookupOutcome>,
        scope: &Scope,
        partitions: &BTreeMap<TopicRef, Vec<TopicRef>>,
    ) -> Self {
        let mut ownership = Self::default();
        for outcome in lookups.values() {
            let LookupOutcome::Found(ledger) = outcome else {
                continue;
            };
            let Some(owner) = ledger.owner.as_ref().filter(|_| ledger.pulsar) else {
                continue;
            };
            if !scope.contains(&owner.topic) {
                continue;
            }
            let home = match owner.topic.partition() {
                None => partitions.get(&owner.topic).and_then(|family| family.first()),
                Some(_) => None,
            };
            let topic = match home {
                Some(home) => {
                    ownership.shared.insert(ledger.ledger_id, owner.topic.clone());
                    home.clone()
                }
                None => owner.topic.clone(),
            };
            ownership.by_topic.entry(topic).or_default().push(ledger.ledger_id);
        }
        ownership
    }
}

/// Drives one reconciliation run over a scope.
pub struct ReconciliationEngine {
    metadata: Arc<dyn MetadataReader>,
    inspector: Arc<dyn LedgerInspector>,
    admin: Arc<dyn AdminBridge>,
    clock: Arc<dyn Clock>,
    config: ReconcileConfig,
}

impl ReconciliationEngine {
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

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Reconcile every topic in `scope`.
    ///
    /// Only an unreachable coordination store while listing topics is an
    /// error; every other failure ends up in the report.
    #[instrument(skip(self, scope, cancel), fields(scope = %scope))]
    pub async fn reconcile(
        &self,
        scope: &Scope,
        cancel: &CancellationToken,
    ) -> ReconcileResult<ReconciliationReport> {
        self.config.validate()?;
        let generated_at = self.clock.now();
        let timeout = self.config.call_timeout();
        let mut failures = Vec::new();

        let (metadata_topics, admin_topics) = tokio::join!(
            with_timeout(WitnessSource::MetadataStore, timeout, self.metadata.list_topics(scope)),
            with_timeout(WitnessSource::AdminApi, timeout, self.admin.list_topics(scope)),
        );
        let mut topics: BTreeSet<TopicRef> = metadata_topics
            .map_err(ReconcileError::MetadataUnavailable)?
            .into_iter()
            .filter(|t| scope.contains(t))
            .collect();
        let admin_listed = match admin_topics {
            Ok(listed) => {
                topics.extend(listed.into_iter().filter(|t| scope.contains(t)));
                true
            }
            Err(e) => {
                warn!(error = %e, "Admin API topic listing failed");
                failures.push(SourceFailure::from_error(WitnessSource::AdminApi, &e));
                false
            }
        };
        let listed_topics = topics.clone();
        let mut partitions: BTreeMap<TopicRef, Vec<TopicRef>> = BTreeMap::new();
        for topic in listed_topics.iter().filter(|t| t.partition().is_some()) {
            partitions.entry(topic.base()).or_default().push(topic.clone());
        }

        let (ledger_ids, bookies) = tokio::join!(
            with_timeout(WitnessSource::StorageEnsemble, timeout, self.inspector.list_ledger_ids()),
            with_timeout(
                WitnessSource::StorageEnsemble,
                timeout,
                self.inspector.list_available_bookies()
            ),
        );
        let ledger_ids = ledger_ids.unwrap_or_else(|e| {
            warn!(error = %e, "Ensemble ledger listing failed");
            failures.push(SourceFailure::from_error(WitnessSource::StorageEnsemble, &e));
            Vec::new()
        });
        let available = match bookies {
            Ok(bookies) => Some(bookies.into_iter().collect::<BTreeSet<_>>()),
            Err(e) => {
                warn!(error = %e, "Bookie listing failed");
                failures.push(SourceFailure::from_error(WitnessSource::StorageEnsemble, &e));
                None
            }
        };

        let pool = LookupPool::new(self.inspector.clone(), self.config.concurrency, timeout);
        let outcomes = pool.lookup_all(&ledger_ids, cancel).await;
        let mut lookups: BTreeMap<u64, LookupOutcome> =
            ledger_ids.iter().copied().zip(outcomes).collect();

        let owned = Ownership::resolve(&lookups, scope, &partitions);
        topics.extend(owned.by_topic.keys().cloned());
        info!(
            topics = topics.len(),
            ensemble_ledgers = lookups.len(),
            "Gathering topic views"
        );

        let views: Vec<(TopicRef, TopicViews)> = stream::iter(topics)
            .map(|topic| async move {
                let views = self.gather(&topic, cancel).await;
                (topic, views)
            })
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let referenced: BTreeSet<u64> = views
            .iter()
            .flat_map(|(_, v)| v.listed().map(|(_, l, _)| l.ledger_id))
            .collect();
        let unchecked: Vec<u64> = referenced
            .iter()
            .copied()
            .filter(|id| !lookups.contains_key(id))
            .collect();
        if !unchecked.is_empty() {
            debug!(count = unchecked.len(), "Looking up referenced ledgers not listed by the ensemble");
            let outcomes = pool.lookup_all(&unchecked, cancel).await;
            lookups.extend(unchecked.into_iter().zip(outcomes));
        }

        let uninspected = lookups
            .iter()
            .filter(|(id, outcome)| {
                !referenced.contains(*id)
                    && matches!(outcome, LookupOutcome::Failed { .. } | LookupOutcome::Cancelled)
            })
            .count();
        if uninspected > 0 {
            failures.push(SourceFailure {
                source: WitnessSource::StorageEnsemble,
                error_code: "INCOMPLETE".to_string(),
                message: format!(
                    "{uninspected} ensemble ledgers could not be inspected; orphans among them are not reported"
                ),
            });
        }

        let ensemble = EnsembleView {
            lookups,
            available,
            observed_at: self.clock.now(),
        };

        // admin reachability of every partitioned topic, over all its partitions
        let family_admin: BTreeMap<TopicRef, Vec<TopicRef>> = partitions
            .iter()
            .map(|(base, family)| {
                let failed = views
                    .iter()
                    .filter(|(t, v)| family.contains(t) && v.admin.result.is_err())
                    .map(|(t, _)| t.clone())
                    .collect();
                (base.clone(), failed)
            })
            .collect();

        let mut reports = BTreeMap::new();
        for (topic, topic_views) in views {
            let mut reach = topic_views.reachability();
            if topic_views.admin.absent && !admin_listed && !listed_topics.contains(&topic) {
                // NotFound for a topic nobody listed proves nothing on its own
                reach.admin = false;
            }

            let mut extra_failures = Vec::new();
            let mut candidates = Vec::new();
            for id in owned.by_topic.get(&topic).into_iter().flatten() {
                if referenced.contains(id) {
                    continue;
                }
                let mut candidate_reach = reach;
                if let Some(base) = owned.shared.get(id) {
                    let failed = family_admin.get(base).map(Vec::as_slice).unwrap_or_default();
                    if !failed.is_empty() {
                        candidate_reach.admin = false;
                        let failure = partition_failure(base, failed);
                        if !extra_failures.contains(&failure) {
                            extra_failures.push(failure);
                        }
                    }
                }
                candidates.push((*id, candidate_reach));
            }

            let report =
                self.build_topic(&topic_views, reach, &candidates, extra_failures, &ensemble);
            debug!(topic = %topic, summary = %report.summary, ledgers = report.ledgers.len(), "Topic reconciled");
            reports.insert(topic, report);
        }

        let unattributed = self.unattributed(&ensemble, &referenced);
        if !unattributed.is_empty() {
            info!(count = unattributed.len(), "Pulsar ledgers attributed to no topic");
        }

        let report = ReconciliationReport::new(
            generated_at,
            scope,
            reports,
            failures,
            cancel.is_cancelled(),
        )
        .with_unattributed(unattributed);
        info!(
            topics = report.statistics.topics,
            ledgers = report.statistics.ledgers,
            divergent_topics = report.statistics.divergent_topics,
            unreachable_topics = report.statistics.unreachable_topics,
            unattributed = report.statistics.unattributed,
            cancelled = report.cancelled,
            "Reconciliation complete"
        );
        Ok(report)
    }

    /// Storage size of every topic the admin API lists in `scope`.
    #[instrument(skip(self, scope), fields(scope = %scope))]
    pub async fn storage_sizes(&self, scope: &Scope) -> ReconcileResult<StorageSizeReport> {
        self.config.validate()?;
        let generated_at = self.clock.now();
        let timeout = self.config.call_timeout();

        let topics: Vec<TopicRef> =
            with_timeout(WitnessSource::AdminApi, timeout, self.admin.list_topics(scope))
                .await?
                .into_iter()
                .filter(|t| scope.contains(t))
                .collect();

        let entries: Vec<StorageSizeEntry> = stream::iter(topics)
            .map(|topic| async move {
                let result =
                    with_timeout(WitnessSource::AdminApi, timeout, self.admin.get_storage_size(&topic))
                        .await;
                match result {
                    Ok(size) => StorageSizeEntry {
                        topic,
                        size_bytes: Some(size),
                        failure: None,
                    },
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Storage size read failed");
                        StorageSizeEntry {
                            failure: Some(SourceFailure::from_error(WitnessSource::AdminApi, &e)),
                            topic,
                            size_bytes: None,
                        }
                    }
                }
            })
            .buffered(self.config.concurrency)
            .collect()
            .await;

        Ok(StorageSizeReport::new(generated_at, scope, entries))
    }

    /// Metadata and admin views of one topic, read concurrently.
    async fn gather(&self, topic: &TopicRef, cancel: &CancellationToken) -> TopicViews {
        if cancel.is_cancelled() {
            let observed_at = self.clock.now();
            return TopicViews {
                metadata: Listing {
                    result: Err(SourceFailure::cancelled(WitnessSource::MetadataStore)),
                    absent: false,
                    observed_at,
                },
                admin: Listing {
                    result: Err(SourceFailure::cancelled(WitnessSource::AdminApi)),
                    absent: false,
                    observed_at,
                },
            };
        }

        let timeout = self.config.call_timeout();
        let (metadata, admin) = tokio::join!(
            async {
                let result = with_timeout(
                    WitnessSource::MetadataStore,
                    timeout,
                    self.metadata.get_ledger_list(topic),
                )
                .await;
                self.listing(topic, WitnessSource::MetadataStore, result)
            },
            async {
                let result = with_timeout(
                    WitnessSource::AdminApi,
                    timeout,
                    self.admin.get_topic_internal_stats(topic),
                )
                .await;
                self.listing(topic, WitnessSource::AdminApi, result)
            },
        );
        TopicViews { metadata, admin }
    }

    fn listing(
        &self,
        topic: &TopicRef,
        source: WitnessSource,
        result: SourceResult<Vec<ListedLedger>>,
    ) -> Listing {
        let absent = matches!(&result, Err(e) if e.is_not_found());
        let result = match result {
            Ok(ledgers) => Ok(ledgers),
            // the source answered and knows nothing about the topic
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => {
                warn!(topic = %topic, source = %source, error = %e, "Topic read failed");
                Err(SourceFailure::from_error(source, &e))
            }
        };
        Listing {
            result,
            absent,
            observed_at: self.clock.now(),
        }
    }

    /// Pulsar ledgers that name no topic and that no listing references.
    fn unattributed(&self, ensemble: &EnsembleView, referenced: &BTreeSet<u64>) -> Vec<LedgerRecord> {
        ensemble
            .lookups
            .iter()
            .filter_map(|(id, outcome)| match outcome {
                LookupOutcome::Found(ledger)
                    if ledger.pulsar && ledger.owner.is_none() && !referenced.contains(id) =>
                {
                    Some(ledger)
                }
                _ => None,
            })
            .map(|ledger| {
                let witnesses = vec![LedgerWitness::from_ensemble(
                    ledger,
                    ensemble.available.as_ref(),
                    ensemble.observed_at,
                )];
                let classification =
                    classify(&witnesses, Reachability::ALL, self.config.replication_factor);
                LedgerRecord {
                    ledger_id: ledger.ledger_id,
                    status: classification.status,
                    witnesses,
                    conflicts: classification.conflicts,
                }
            })
            .collect()
    }

    /// `candidates` are unreferenced owned ledgers, each with the
    /// reachability that decides whether it can be called orphaned.
    fn build_topic(
        &self,
        views: &TopicViews,
        reach: Reachability,
        candidates: &[(u64, Reachability)],
        extra_failures: Vec<SourceFailure>,
        ensemble: &EnsembleView,
    ) -> TopicReport {
        let mut witnesses: BTreeMap<u64, Vec<LedgerWitness>> = BTreeMap::new();
        for (source, ledger, observed_at) in views.listed() {
            let entry = witnesses.entry(ledger.ledger_id).or_default();
            if entry.iter().all(|w| w.source != source) {
                entry.push(LedgerWitness::listed(source, ledger, observed_at));
            }
        }
        for (id, _) in candidates {
            witnesses.entry(*id).or_default();
        }

        let ledgers = witnesses
            .into_iter()
            .map(|(ledger_id, mut observed)| {
                let role = observed.first().map(|w| w.role).unwrap_or_default();
                if let Some(witness) = ensemble.witness(ledger_id, role) {
                    observed.push(witness);
                }
                observed.sort_by_key(|w| w.source);
                let reach = candidates
                    .iter()
                    .find(|(id, _)| *id == ledger_id)
                    .map_or(reach, |(_, r)| *r);
                let classification = classify(&observed, reach, self.config.replication_factor);
                LedgerRecord {
                    ledger_id,
                    status: classification.status,
                    witnesses: observed,
                    conflicts: classification.conflicts,
                }
            })
            .collect();

        let mut failures = views.failures();
        failures.extend(extra_failures);
        TopicReport::new(ledgers, failures)
    }
}

fn partition_failure(base: &TopicRef, failed: &[TopicRef]) -> SourceFailure {
    let names: Vec<String> = failed.iter().map(TopicRef::local_name).collect();
    SourceFailure {
        source: WitnessSource::AdminApi,
        error_code: "PARTITION_UNREACHABLE".to_string(),
        message: format!(
            "ledgers shared by {base} are unverified; could not read {}",
            names.join(", ")
        ),
    }
}
