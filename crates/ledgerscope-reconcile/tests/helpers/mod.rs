//! In-memory cluster for engine and planner tests.
//!
//! - the coordination store is a `MemoryStore` behind the real
//!   `ManagedLedgerReader`, so managed-ledger nodes are protobuf-encoded
//! - the ensemble and the admin API are fakes with failure injection

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ledgerscope_connector::prelude::*;
use ledgerscope_connector_zookeeper::proto::{LedgerInfo, ManagedLedgerInfo, NestedPositionInfo};
use ledgerscope_connector_zookeeper::{ManagedLedgerReader, MemoryStore};
use ledgerscope_reconcile::{
    FixedClock, LedgerTrimmer, ReconcileConfig, ReconciliationEngine, RepairPlanner,
};
use prost::Message;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

pub const BOOKIES: [&str; 2] = ["bookie-1:3181", "bookie-2:3181"];

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn long_ago() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn topic(namespace: &str, name: &str) -> TopicRef {
    TopicRef::new(namespace, name).unwrap()
}

// =============================================================================
// Storage ensemble
// =============================================================================

#[derive(Default)]
pub struct FakeEnsemble {
    ledgers: Mutex<BTreeMap<u64, EnsembleLedger>>,
    bookies: Mutex<Vec<String>>,
    failing: Mutex<BTreeSet<u64>>,
    pub deleted: Mutex<Vec<u64>>,
    pub flagged: Mutex<Vec<u64>>,
}

impl FakeEnsemble {
    pub fn new() -> Self {
        let ensemble = Self::default();
        *ensemble.bookies.lock().unwrap() = BOOKIES.iter().map(|b| b.to_string()).collect();
        ensemble
    }

    /// A closed pulsar data ledger of `owner`, replicated on both bookies.
    pub fn add(&self, ledger_id: u64, owner: &TopicRef) {
        self.add_with(ledger_id, owner, LedgerRole::Data, LedgerState::Closed, Some(long_ago()));
    }

    pub fn add_with(
        &self,
        ledger_id: u64,
        owner: &TopicRef,
        role: LedgerRole,
        state: LedgerState,
        ctime: Option<DateTime<Utc>>,
    ) {
        let ledger = EnsembleLedger {
            ledger_id,
            state,
            entry_count: (state == LedgerState::Closed).then_some(10),
            length: Some(1024),
            ensemble: BOOKIES.iter().map(|b| b.to_string()).collect(),
            write_quorum: Some(2),
            ctime,
            owner: Some(LedgerOwner {
                topic: owner.clone(),
                role,
            }),
            pulsar: true,
        };
        self.ledgers.lock().unwrap().insert(ledger_id, ledger);
    }

    /// A closed ledger whose metadata names no topic.
    pub fn add_unowned(&self, ledger_id: u64, pulsar: bool, ctime: Option<DateTime<Utc>>) {
        let ledger = EnsembleLedger {
            ledger_id,
            state: LedgerState::Closed,
            entry_count: Some(10),
            length: Some(1024),
            ensemble: BOOKIES.iter().map(|b| b.to_string()).collect(),
            write_quorum: Some(2),
            ctime,
            owner: None,
            pulsar,
        };
        self.ledgers.lock().unwrap().insert(ledger_id, ledger);
    }

    /// Delete behind the reconciler's back.
    pub fn remove(&self, ledger_id: u64) {
        self.ledgers.lock().unwrap().remove(&ledger_id);
    }

    pub fn fail(&self, ledger_id: u64) {
        self.failing.lock().unwrap().insert(ledger_id);
    }

    pub fn set_bookies(&self, bookies: &[&str]) {
        *self.bookies.lock().unwrap() = bookies.iter().map(|b| b.to_string()).collect();
    }

    pub fn contains(&self, ledger_id: u64) -> bool {
        self.ledgers.lock().unwrap().contains_key(&ledger_id)
    }
}

#[async_trait]
impl LedgerInspector for FakeEnsemble {
    async fn list_ledger_ids(&self) -> SourceResult<Vec<u64>> {
        Ok(self.ledgers.lock().unwrap().keys().copied().collect())
    }

    async fn get_ledger_metadata(&self, ledger_id: u64) -> SourceResult<EnsembleLedger> {
        if self.failing.lock().unwrap().contains(&ledger_id) {
            return Err(SourceError::unreachable(
                WitnessSource::StorageEnsemble,
                "bookie http 503",
            ));
        }
        self.ledgers
            .lock()
            .unwrap()
            .get(&ledger_id)
            .cloned()
            .ok_or_else(|| SourceError::not_found(format!("ledger {ledger_id}")))
    }

    async fn list_available_bookies(&self) -> SourceResult<Vec<String>> {
        Ok(self.bookies.lock().unwrap().clone())
    }

    async fn delete_ledger(&self, ledger_id: u64) -> SourceResult<()> {
        if self.ledgers.lock().unwrap().remove(&ledger_id).is_none() {
            return Err(SourceError::not_found(format!("ledger {ledger_id}")));
        }
        self.deleted.lock().unwrap().push(ledger_id);
        Ok(())
    }

    async fn flag_under_replicated(&self, ledger_id: u64) -> SourceResult<()> {
        self.flagged.lock().unwrap().push(ledger_id);
        Ok(())
    }
}

// =============================================================================
// Admin API
// =============================================================================

#[derive(Default)]
pub struct FakeAdmin {
    topics: Mutex<BTreeMap<TopicRef, Vec<ListedLedger>>>,
    unreachable: Mutex<BTreeSet<TopicRef>>,
    listing_down: Mutex<bool>,
    topic_retention: Mutex<BTreeMap<TopicRef, RetentionPolicy>>,
    namespace_retention: Mutex<BTreeMap<String, RetentionPolicy>>,
}

impl FakeAdmin {
    /// Closed data ledgers, as for an unloaded or terminated topic.
    pub fn set_topic(&self, topic: &TopicRef, ids: &[u64]) {
        let ledgers = ids
            .iter()
            .map(|id| ListedLedger::new(*id, LedgerState::Closed, LedgerRole::Data))
            .collect();
        self.set_ledgers(topic, ledgers);
    }

    pub fn set_ledgers(&self, topic: &TopicRef, ledgers: Vec<ListedLedger>) {
        self.topics.lock().unwrap().insert(topic.clone(), ledgers);
    }

    pub fn fail(&self, topic: &TopicRef) {
        self.unreachable.lock().unwrap().insert(topic.clone());
    }

    pub fn set_topic_retention(&self, topic: &TopicRef, minutes: i64) {
        self.topic_retention
            .lock()
            .unwrap()
            .insert(topic.clone(), RetentionPolicy::minutes(minutes));
    }

    pub fn set_namespace_retention(&self, namespace: &str, minutes: i64) {
        self.namespace_retention
            .lock()
            .unwrap()
            .insert(namespace.to_string(), RetentionPolicy::minutes(minutes));
    }

    /// Topic listing fails; per-topic reads still answer.
    pub fn fail_listing(&self) {
        *self.listing_down.lock().unwrap() = true;
    }
}

#[async_trait]
impl AdminBridge for FakeAdmin {
    async fn list_topics(&self, scope: &Scope) -> SourceResult<Vec<TopicRef>> {
        if *self.listing_down.lock().unwrap() {
            return Err(SourceError::unreachable(WitnessSource::AdminApi, "broker http 503"));
        }
        Ok(self
            .topics
            .lock()
            .unwrap()
            .keys()
            .filter(|t| scope.contains(t))
            .cloned()
            .collect())
    }

    async fn get_topic_internal_stats(&self, topic: &TopicRef) -> SourceResult<Vec<ListedLedger>> {
        if self.unreachable.lock().unwrap().contains(topic) {
            return Err(SourceError::unreachable(WitnessSource::AdminApi, "broker http 503"));
        }
        self.topics
            .lock()
            .unwrap()
            .get(topic)
            .cloned()
            .ok_or_else(|| SourceError::not_found(topic.to_string()))
    }

    async fn get_storage_size(&self, topic: &TopicRef) -> SourceResult<u64> {
        if self.unreachable.lock().unwrap().contains(topic) {
            return Err(SourceError::unreachable(WitnessSource::AdminApi, "broker http 503"));
        }
        let ledgers = self.topics.lock().unwrap().get(topic).cloned();
        ledgers
            .map(|l| l.len() as u64 * 1024)
            .ok_or_else(|| SourceError::not_found(topic.to_string()))
    }

    async fn get_topic_retention(&self, topic: &TopicRef) -> SourceResult<Option<RetentionPolicy>> {
        if self.unreachable.lock().unwrap().contains(topic) {
            return Err(SourceError::unreachable(WitnessSource::AdminApi, "broker http 503"));
        }
        Ok(self.topic_retention.lock().unwrap().get(topic).copied())
    }

    async fn get_namespace_retention(
        &self,
        namespace: &str,
    ) -> SourceResult<Option<RetentionPolicy>> {
        Ok(self.namespace_retention.lock().unwrap().get(namespace).copied())
    }
}

// =============================================================================
// Cluster
// =============================================================================

pub struct Cluster {
    pub metadata: Arc<ManagedLedgerReader<MemoryStore>>,
    pub ensemble: Arc<FakeEnsemble>,
    pub admin: Arc<FakeAdmin>,
}

impl Cluster {
    pub fn new() -> Self {
        Self {
            metadata: Arc::new(ManagedLedgerReader::new(MemoryStore::new())),
            ensemble: Arc::new(FakeEnsemble::new()),
            admin: Arc::new(FakeAdmin::default()),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        self.metadata.store()
    }

    /// Write a terminated managed ledger, so every ledger reads as closed.
    pub async fn put_metadata(&self, topic: &TopicRef, ids: &[u64]) {
        self.put_managed_ledger(topic, ids, true).await;
    }

    pub async fn put_managed_ledger(&self, topic: &TopicRef, ids: &[u64], terminated: bool) {
        let info = ManagedLedgerInfo {
            ledger_info: ids
                .iter()
                .map(|id| LedgerInfo {
                    ledger_id: *id as i64,
                    entries: None,
                    size: None,
                    timestamp: None,
                })
                .collect(),
            terminated_position: terminated.then(|| NestedPositionInfo {
                ledger_id: ids.last().copied().unwrap_or(0) as i64,
                entry_id: 9,
            }),
        };
        self.store()
            .insert(topic.managed_ledger_path(), info.encode_to_vec())
            .await;
    }

    /// The same closed ledgers in all three witnesses.
    pub async fn healthy_topic(&self, topic: &TopicRef, ids: &[u64]) {
        self.put_metadata(topic, ids).await;
        self.admin.set_topic(topic, ids);
        for id in ids {
            self.ensemble.add(*id, topic);
        }
    }

    /// Partitions `0..count` of `base`, each healthy with one data ledger,
    /// all listing `schema_id` through the admin API.
    pub async fn partitioned_topic(&self, base: &TopicRef, count: u32, schema_id: u64) -> Vec<TopicRef> {
        let mut partitions = Vec::new();
        for p in 0..count {
            let partition = TopicRef::new(base.namespace(), format!("{}-partition-{p}", base.name())).unwrap();
            let data_id = schema_id + 1 + u64::from(p);
            self.healthy_topic(&partition, &[data_id]).await;
            self.admin.set_ledgers(
                &partition,
                vec![
                    ListedLedger::new(data_id, LedgerState::Closed, LedgerRole::Data),
                    ListedLedger::new(schema_id, LedgerState::Closed, LedgerRole::Schema),
                ],
            );
            partitions.push(partition);
        }
        self.ensemble
            .add_with(schema_id, base, LedgerRole::Schema, LedgerState::Closed, Some(long_ago()));
        partitions
    }

    pub fn engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(
            self.metadata.clone(),
            self.ensemble.clone(),
            self.admin.clone(),
            Arc::new(FixedClock(now())),
        )
        .with_config(ReconcileConfig::default().with_concurrency(4))
    }

    pub fn trimmer(&self) -> LedgerTrimmer {
        LedgerTrimmer::new(
            self.metadata.clone(),
            self.ensemble.clone(),
            self.admin.clone(),
            Arc::new(FixedClock(now())),
        )
        .with_config(ReconcileConfig::default().with_concurrency(4))
    }

    pub fn planner(&self) -> RepairPlanner {
        RepairPlanner::new(
            self.metadata.clone(),
            self.ensemble.clone(),
            Arc::new(FixedClock(now())),
        )
    }
}
