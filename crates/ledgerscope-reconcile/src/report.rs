//! Reconciliation report model.

use chrono::{DateTime, Utc};
use ledgerscope_connector::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::classify::{Conflict, RecordStatus};
use crate::error::ReconcileResult;
use crate::planner::{Alert, RepairAction};
use crate::witness::LedgerWitness;

/// Every witness observed for one ledger and the status derived from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub ledger_id: u64,
    pub status: RecordStatus,
    /// At most one per source, in source order.
    pub witnesses: Vec<LedgerWitness>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<Conflict>,
}

impl LedgerRecord {
    pub fn witness(&self, source: WitnessSource) -> Option<&LedgerWitness> {
        self.witnesses.iter().find(|w| w.source == source)
    }

    /// Role as reported by the listing sources, else by the ensemble.
    pub fn role(&self) -> LedgerRole {
        self.witness(WitnessSource::MetadataStore)
            .or_else(|| self.witness(WitnessSource::AdminApi))
            .or_else(|| self.witness(WitnessSource::StorageEnsemble))
            .map(|w| w.role)
            .unwrap_or_default()
    }
}

/// Per-topic classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicSummary {
    Consistent,
    Divergent,
    Unreachable,
}

impl TopicSummary {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicSummary::Consistent => "consistent",
            TopicSummary::Divergent => "divergent",
            TopicSummary::Unreachable => "unreachable",
        }
    }

    /// Summarize a topic from its records and the sources that failed for it.
    pub fn from_records(ledgers: &[LedgerRecord], failures: &[SourceFailure]) -> Self {
        let indeterminate = ledgers
            .iter()
            .any(|r| r.status == RecordStatus::Indeterminate);
        if !failures.is_empty() || indeterminate {
            TopicSummary::Unreachable
        } else if ledgers.iter().any(|r| r.status != RecordStatus::Consistent) {
            TopicSummary::Divergent
        } else {
            TopicSummary::Consistent
        }
    }
}

impl fmt::Display for TopicSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A source that could not be consulted, kept as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: WitnessSource,
    pub error_code: String,
    pub message: String,
}

impl SourceFailure {
    pub fn from_error(source: WitnessSource, error: &SourceError) -> Self {
        Self {
            source,
            error_code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }

    pub fn cancelled(source: WitnessSource) -> Self {
        Self {
            source,
            error_code: "CANCELLED".to_string(),
            message: "run cancelled before the source was consulted".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicReport {
    pub summary: TopicSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SourceFailure>,
    /// Ascending ledger id.
    pub ledgers: Vec<LedgerRecord>,
}

impl TopicReport {
    pub fn new(mut ledgers: Vec<LedgerRecord>, failures: Vec<SourceFailure>) -> Self {
        ledgers.sort_by_key(|r| r.ledger_id);
        Self {
            summary: TopicSummary::from_records(&ledgers, &failures),
            failures,
            ledgers,
        }
    }
}

/// Counters over the whole report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStatistics {
    pub topics: usize,
    pub consistent_topics: usize,
    pub divergent_topics: usize,
    pub unreachable_topics: usize,
    pub ledgers: usize,
    pub consistent: usize,
    pub divergent: usize,
    pub orphaned: usize,
    pub missing: usize,
    pub under_replicated: usize,
    pub indeterminate: usize,
    /// Pulsar ledgers that name no topic; not counted in `ledgers`.
    #[serde(default)]
    pub unattributed: usize,
}

impl ReportStatistics {
    pub fn collect<'a>(topics: impl IntoIterator<Item = &'a TopicReport>) -> Self {
        let mut stats = Self::default();
        for topic in topics {
            stats.topics += 1;
            match topic.summary {
                TopicSummary::Consistent => stats.consistent_topics += 1,
                TopicSummary::Divergent => stats.divergent_topics += 1,
                TopicSummary::Unreachable => stats.unreachable_topics += 1,
            }
            for record in &topic.ledgers {
                stats.ledgers += 1;
                match record.status {
                    RecordStatus::Consistent => stats.consistent += 1,
                    RecordStatus::Divergent => stats.divergent += 1,
                    RecordStatus::Orphaned => stats.orphaned += 1,
                    RecordStatus::Missing => stats.missing += 1,
                    RecordStatus::UnderReplicated => stats.under_replicated += 1,
                    RecordStatus::Indeterminate => stats.indeterminate += 1,
                }
            }
        }
        stats
    }
}

/// Outcome of a reconciliation run over a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub generated_at: DateTime<Utc>,
    pub scope: String,
    #[serde(default)]
    pub cancelled: bool,
    /// Failures not tied to one topic, e.g. listing the ensemble.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SourceFailure>,
    pub topics: BTreeMap<TopicRef, TopicReport>,
    /// Pulsar ledgers whose metadata links them to no topic.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unattributed: Vec<LedgerRecord>,
    pub statistics: ReportStatistics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repairs: Vec<RepairAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<Alert>,
}

/// Overall result of a report, as the CLI exit status sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Consistent,
    Divergent,
    PartialFailure,
}

impl ReconciliationReport {
    pub fn new(
        generated_at: DateTime<Utc>,
        scope: &Scope,
        topics: BTreeMap<TopicRef, TopicReport>,
        failures: Vec<SourceFailure>,
        cancelled: bool,
    ) -> Self {
        let statistics = ReportStatistics::collect(topics.values());
        Self {
            generated_at,
            scope: scope.to_string(),
            cancelled,
            failures,
            topics,
            unattributed: Vec::new(),
            statistics,
            repairs: Vec::new(),
            alerts: Vec::new(),
        }
    }

    pub fn with_unattributed(mut self, mut records: Vec<LedgerRecord>) -> Self {
        records.sort_by_key(|r| r.ledger_id);
        self.statistics.unattributed = records.len();
        self.unattributed = records;
        self
    }

    /// The report as JSON without observation times, so that two runs over
    /// an unchanged cluster produce identical text.
    ///
    /// The result is for comparison only; [`Self::from_json`] rejects it.
    pub fn to_canonical_json(&self) -> ReconcileResult<String> {
        let mut value = serde_json::to_value(self)?;
        strip_times(&mut value);
        Ok(serde_json::to_string_pretty(&value)?)
    }

    pub fn to_json_pretty(&self) -> ReconcileResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> ReconcileResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// All records with the given status, in topic then ledger order.
    pub fn records_with_status(
        &self,
        status: RecordStatus,
    ) -> impl Iterator<Item = (&TopicRef, &LedgerRecord)> {
        self.topics.iter().flat_map(move |(topic, report)| {
            report
                .ledgers
                .iter()
                .filter(move |r| r.status == status)
                .map(move |r| (topic, r))
        })
    }

    /// Unreachable beats divergent beats consistent.
    pub fn verdict(&self) -> Verdict {
        let unreachable = self.cancelled
            || !self.failures.is_empty()
            || self
                .topics
                .values()
                .any(|t| t.summary == TopicSummary::Unreachable)
            || self
                .unattributed
                .iter()
                .any(|r| r.status == RecordStatus::Indeterminate);
        if unreachable {
            Verdict::PartialFailure
        } else if !self.unattributed.is_empty()
            || self
                .topics
                .values()
                .any(|t| t.summary == TopicSummary::Divergent)
        {
            Verdict::Divergent
        } else {
            Verdict::Consistent
        }
    }
}

fn strip_times(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.remove("generated_at");
            map.remove("observed_at");
            map.values_mut().for_each(strip_times);
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(strip_times),
        _ => {}
    }
}

/// Storage size of one topic, or why it could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSizeEntry {
    pub topic: TopicRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<SourceFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSizeReport {
    pub generated_at: DateTime<Utc>,
    pub scope: String,
    /// Sum over the topics that answered.
    pub total_bytes: u64,
    pub topics: Vec<StorageSizeEntry>,
}

impl StorageSizeReport {
    pub fn new(generated_at: DateTime<Utc>, scope: &Scope, mut topics: Vec<StorageSizeEntry>) -> Self {
        topics.sort_by(|a, b| a.topic.cmp(&b.topic));
        let total_bytes = topics
            .iter()
            .filter_map(|t| t.size_bytes)
            .fold(0u64, u64::saturating_add);
        Self {
            generated_at,
            scope: scope.to_string(),
            total_bytes,
            topics,
        }
    }

    /// Whether any topic could not be read.
    pub fn is_partial(&self) -> bool {
        self.topics.iter().any(|t| t.failure.is_some())
    }

    pub fn to_json_pretty(&self) -> ReconcileResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn record(ledger_id: u64, status: RecordStatus) -> LedgerRecord {
        LedgerRecord {
            ledger_id,
            status,
            witnesses: vec![LedgerWitness::unknown(
                WitnessSource::StorageEnsemble,
                LedgerRole::Data,
                at(),
            )],
            conflicts: Vec::new(),
        }
    }

    fn topic(name: &str) -> TopicRef {
        TopicRef::new("public/default", name).unwrap()
    }

    #[test]
    fn test_topic_summary() {
        let consistent = TopicReport::new(vec![record(2, RecordStatus::Consistent)], vec![]);
        assert_eq!(consistent.summary, TopicSummary::Consistent);

        let missing = TopicReport::new(
            vec![record(3, RecordStatus::Missing), record(1, RecordStatus::Consistent)],
            vec![],
        );
        assert_eq!(missing.summary, TopicSummary::Divergent);
        assert_eq!(missing.ledgers[0].ledger_id, 1);

        let failed = TopicReport::new(
            vec![record(3, RecordStatus::Missing)],
            vec![SourceFailure::cancelled(WitnessSource::AdminApi)],
        );
        assert_eq!(failed.summary, TopicSummary::Unreachable);

        let indeterminate = TopicReport::new(vec![record(4, RecordStatus::Indeterminate)], vec![]);
        assert_eq!(indeterminate.summary, TopicSummary::Unreachable);
    }

    #[test]
    fn test_verdict_precedence() {
        let scope: Scope = "public".parse().unwrap();
        let mut topics = BTreeMap::new();
        topics.insert(
            topic("a"),
            TopicReport::new(vec![record(1, RecordStatus::Consistent)], vec![]),
        );
        let report = ReconciliationReport::new(at(), &scope, topics.clone(), vec![], false);
        assert_eq!(report.verdict(), Verdict::Consistent);

        topics.insert(
            topic("b"),
            TopicReport::new(vec![record(2, RecordStatus::Orphaned)], vec![]),
        );
        let report = ReconciliationReport::new(at(), &scope, topics.clone(), vec![], false);
        assert_eq!(report.verdict(), Verdict::Divergent);
        assert_eq!(report.statistics.orphaned, 1);
        assert_eq!(report.statistics.topics, 2);

        topics.insert(
            topic("c"),
            TopicReport::new(vec![], vec![SourceFailure::cancelled(WitnessSource::MetadataStore)]),
        );
        let report = ReconciliationReport::new(at(), &scope, topics, vec![], false);
        assert_eq!(report.verdict(), Verdict::PartialFailure);
    }

    #[test]
    fn test_json_keys_are_topic_names_in_order() {
        let scope: Scope = "public/default".parse().unwrap();
        let mut topics = BTreeMap::new();
        topics.insert(topic("b"), TopicReport::new(vec![], vec![]));
        topics.insert(topic("a"), TopicReport::new(vec![], vec![]));
        let report = ReconciliationReport::new(at(), &scope, topics, vec![], false);

        let json = report.to_json_pretty().unwrap();
        let a = json.find("persistent://public/default/a").unwrap();
        let b = json.find("persistent://public/default/b").unwrap();
        assert!(a < b);
        assert!(!json.contains("\"repairs\""));

        let parsed = ReconciliationReport::from_json(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_unattributed_ledgers_make_the_report_divergent() {
        let scope: Scope = "public".parse().unwrap();
        let report = ReconciliationReport::new(at(), &scope, BTreeMap::new(), vec![], false)
            .with_unattributed(vec![record(9, RecordStatus::Orphaned), record(4, RecordStatus::Orphaned)]);
        assert_eq!(report.verdict(), Verdict::Divergent);
        assert_eq!(report.statistics.unattributed, 2);
        assert_eq!(report.statistics.ledgers, 0);
        assert_eq!(report.unattributed[0].ledger_id, 4);

        let parsed = ReconciliationReport::from_json(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(parsed, report);

        let unknown = ReconciliationReport::new(at(), &scope, BTreeMap::new(), vec![], false)
            .with_unattributed(vec![record(5, RecordStatus::Indeterminate)]);
        assert_eq!(unknown.verdict(), Verdict::PartialFailure);
    }

    #[test]
    fn test_canonical_json_has_no_observation_times() {
        let scope: Scope = "public/default".parse().unwrap();
        let mut topics = BTreeMap::new();
        topics.insert(
            topic("a"),
            TopicReport::new(vec![record(1, RecordStatus::Consistent)], vec![]),
        );
        let report = ReconciliationReport::new(at(), &scope, topics, vec![], false);
        let later = Utc::now();
        let mut moved = record(1, RecordStatus::Consistent);
        moved.witnesses[0].observed_at = later;
        let mut later_topics = BTreeMap::new();
        later_topics.insert(topic("a"), TopicReport::new(vec![moved], vec![]));
        let rerun = ReconciliationReport::new(later, &scope, later_topics, vec![], false);

        let canonical = report.to_canonical_json().unwrap();
        assert!(!canonical.contains("observed_at"));
        assert!(!canonical.contains("generated_at"));
        assert!(canonical.contains("persistent://public/default/a"));
        assert_eq!(canonical, rerun.to_canonical_json().unwrap());
        assert_ne!(report.to_json_pretty().unwrap(), rerun.to_json_pretty().unwrap());
    }

    #[test]
    fn test_records_with_status() {
        let scope: Scope = "public".parse().unwrap();
        let mut topics = BTreeMap::new();
        topics.insert(
            topic("a"),
            TopicReport::new(
                vec![record(1, RecordStatus::Orphaned), record(2, RecordStatus::Consistent)],
                vec![],
            ),
        );
        let report = ReconciliationReport::new(at(), &scope, topics, vec![], false);
        let orphans: Vec<u64> = report
            .records_with_status(RecordStatus::Orphaned)
            .map(|(_, r)| r.ledger_id)
            .collect();
        assert_eq!(orphans, vec![1]);
    }
}
