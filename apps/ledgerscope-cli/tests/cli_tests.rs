//! End-to-end command runs.
//!
//! The coordination store is in memory behind the real managed-ledger
//! reader; the bookie and admin HTTP services are wiremock servers.

use base64::{engine::general_purpose::STANDARD, Engine};
use ledgerscope_cli::commands::{reconcile, repair, storage_size};
use ledgerscope_cli::error::{EXIT_CONSISTENT, EXIT_DIVERGENT, EXIT_PARTIAL_FAILURE};
use ledgerscope_cli::output::OutputFormat;
use ledgerscope_connector::prelude::*;
use ledgerscope_connector_admin::{AdminConfig, PulsarAdminBridge};
use ledgerscope_connector_bookie::{BookieConfig, BookieInspector};
use ledgerscope_connector_zookeeper::proto::{LedgerInfo, ManagedLedgerInfo, NestedPositionInfo};
use ledgerscope_connector_zookeeper::{ManagedLedgerReader, MemoryStore};
use ledgerscope_reconcile::{
    CancellationToken, ReconcileConfig, ReconciliationEngine, ReconciliationReport, RepairConfig,
    RepairPlanner, SystemClock,
};
use prost::Message;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ML_NAME: &str = "public/default/persistent/orders";

fn orders() -> TopicRef {
    TopicRef::new("public/default", "orders").unwrap()
}

fn connection() -> ConnectionSettings {
    ConnectionSettings::new()
        .with_max_retries(1)
        .with_retry_delay_ms(1)
        .with_request_timeout_ms(2_000)
}

struct Harness {
    metadata: Arc<ManagedLedgerReader<MemoryStore>>,
    bookie: MockServer,
    admin: MockServer,
}

impl Harness {
    /// `orders` has ledgers 1..=3 in the coordination store and the admin
    /// API; the bookies only know 1 and 2.
    async fn start() -> Self {
        let harness = Self {
            metadata: Arc::new(ManagedLedgerReader::new(MemoryStore::new())),
            bookie: MockServer::start().await,
            admin: MockServer::start().await,
        };
        harness.put_ledger_list(&[1, 2, 3]).await;
        harness.mount_admin(&[1, 2, 3]).await;
        harness.mount_bookies(&[1, 2]).await;
        harness
    }

    async fn put_ledger_list(&self, ids: &[u64]) {
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
            terminated_position: Some(NestedPositionInfo {
                ledger_id: ids.last().copied().unwrap_or(0) as i64,
                entry_id: 99,
            }),
        };
        self.metadata
            .store()
            .insert(orders().managed_ledger_path(), info.encode_to_vec())
            .await;
    }

    async fn mount_admin(&self, ids: &[u64]) {
        Mock::given(method("GET"))
            .and(path("/admin/v2/persistent/public/default"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!(["persistent://public/default/orders"])),
            )
            .mount(&self.admin)
            .await;
        let ledgers: Vec<_> = ids
            .iter()
            .map(|id| json!({"ledgerId": id, "entries": 100, "size": 2048}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/admin/v2/persistent/public/default/orders/internalStats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": "Terminated",
                "ledgers": ledgers,
                "cursors": {},
                "schemaLedgers": [],
                "compactedLedger": {"ledgerId": -1, "entries": -1, "size": -1}
            })))
            .mount(&self.admin)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/v2/persistent/public/default/orders/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "storageSize": 2048 * ids.len()
            })))
            .mount(&self.admin)
            .await;
    }

    async fn mount_bookies(&self, ids: &[u64]) {
        let listed: serde_json::Map<String, serde_json::Value> = ids
            .iter()
            .map(|id| (id.to_string(), serde_json::Value::Null))
            .collect();
        Mock::given(method("GET"))
            .and(path("/api/v1/ledger/list/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listed))
            .mount(&self.bookie)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/bookie/list_bookies/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bookie-1:3181": null,
                "bookie-2:3181": null
            })))
            .mount(&self.bookie)
            .await;
        for id in ids {
            let ledger = json!({
                "state": "CLOSED",
                "lastEntryId": 99,
                "length": 2048,
                "writeQuorumSize": 2,
                "ensembleSize": 2,
                "ctime": 1_700_000_000_000_i64,
                "allEnsembles": {"0": ["bookie-1:3181", "bookie-2:3181"]},
                "customMetadata": {
                    "application": STANDARD.encode("pulsar"),
                    "component": STANDARD.encode("managed-ledger"),
                    "pulsar/managed-ledger": STANDARD.encode(ML_NAME)
                }
            });
            let mut body = serde_json::Map::new();
            body.insert(id.to_string(), ledger);
            Mock::given(method("GET"))
                .and(path("/api/v1/ledger/metadata/"))
                .and(query_param("ledger_id", id.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(&self.bookie)
                .await;
        }
        // anything else is unknown to the ensemble
        Mock::given(method("GET"))
            .and(path("/api/v1/ledger/metadata/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.bookie)
            .await;
    }

    fn inspector(&self) -> Arc<BookieInspector> {
        Arc::new(
            BookieInspector::new(BookieConfig::new(self.bookie.uri()).with_connection(connection()))
                .unwrap(),
        )
    }

    fn engine(&self) -> ReconciliationEngine {
        let admin = PulsarAdminBridge::new(
            AdminConfig::new(self.admin.uri()).with_connection(connection()),
        )
        .unwrap();
        ReconciliationEngine::new(
            self.metadata.clone(),
            self.inspector(),
            Arc::new(admin),
            Arc::new(SystemClock),
        )
        .with_config(ReconcileConfig::default().with_concurrency(2))
    }

    fn planner(&self, config: RepairConfig) -> RepairPlanner {
        RepairPlanner::new(self.metadata.clone(), self.inspector(), Arc::new(SystemClock))
            .with_config(config)
    }
}

fn scope() -> Scope {
    "public/default".parse().unwrap()
}

async fn reconcile_to_file(harness: &Harness, dir: &tempfile::TempDir) -> (i32, ReconciliationReport) {
    let report_path = dir.path().join("report.json");
    let code = reconcile::run(
        &harness.engine(),
        &scope(),
        OutputFormat::Json,
        Some(&report_path),
        false,
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    let report = repair::load_report(&report_path).unwrap();
    (code, report)
}

#[tokio::test]
async fn test_missing_ledger_exits_divergent() {
    let harness = Harness::start().await;
    let dir = tempfile::tempdir().unwrap();

    let (code, report) = reconcile_to_file(&harness, &dir).await;

    assert_eq!(code, EXIT_DIVERGENT);
    assert_eq!(report.statistics.ledgers, 3);
    assert_eq!(report.statistics.consistent, 2);
    assert_eq!(report.statistics.missing, 1);
    let missing: Vec<u64> = report
        .records_with_status(ledgerscope_reconcile::RecordStatus::Missing)
        .map(|(_, r)| r.ledger_id)
        .collect();
    assert_eq!(missing, vec![3]);
}

#[tokio::test]
async fn test_consistent_cluster_exits_zero() {
    let harness = Harness::start().await;
    harness.put_ledger_list(&[1, 2]).await;
    harness.admin.reset().await;
    harness.mount_admin(&[1, 2]).await;
    let dir = tempfile::tempdir().unwrap();

    let (code, report) = reconcile_to_file(&harness, &dir).await;

    assert_eq!(code, EXIT_CONSISTENT);
    assert_eq!(report.statistics.consistent, 2);
}

#[tokio::test]
async fn test_admin_outage_exits_partial() {
    let harness = Harness::start().await;
    harness.admin.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&harness.admin)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let (code, report) = reconcile_to_file(&harness, &dir).await;

    assert_eq!(code, EXIT_PARTIAL_FAILURE);
    assert!(!report.failures.is_empty());
}

#[tokio::test]
async fn test_repair_dry_run_changes_nothing() {
    let harness = Harness::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (_, report) = reconcile_to_file(&harness, &dir).await;

    let plan_path = dir.path().join("plan.json");
    let code = repair::run(
        &harness.planner(RepairConfig::default().with_repoint_missing(true)),
        report,
        false,
        OutputFormat::Json,
        Some(&plan_path),
    )
    .await
    .unwrap();

    assert_eq!(code, EXIT_CONSISTENT);
    let plan: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&plan_path).unwrap()).unwrap();
    assert_eq!(plan["actions"][0]["kind"], "repoint-metadata");
    assert_eq!(plan["alerts"][0]["ledger_id"], 3);

    let ids: Vec<u64> = harness
        .metadata
        .get_ledger_list(&orders())
        .await
        .unwrap()
        .iter()
        .map(|l| l.ledger_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_repair_repoints_missing_ledger() {
    let harness = Harness::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (_, report) = reconcile_to_file(&harness, &dir).await;

    let repaired_path = dir.path().join("repaired.json");
    let code = repair::run(
        &harness.planner(RepairConfig::default().with_repoint_missing(true)),
        report,
        true,
        OutputFormat::Json,
        Some(&repaired_path),
    )
    .await
    .unwrap();

    assert_eq!(code, EXIT_CONSISTENT);
    let repaired = repair::load_report(&repaired_path).unwrap();
    assert_eq!(repaired.repairs.len(), 1);
    assert_eq!(
        repaired.repairs[0].outcome,
        Some(ledgerscope_reconcile::ActionOutcome::Success)
    );
    assert_eq!(repaired.alerts.len(), 1);

    let ids: Vec<u64> = harness
        .metadata
        .get_ledger_list(&orders())
        .await
        .unwrap()
        .iter()
        .map(|l| l.ledger_id)
        .collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_text_report() {
    let harness = Harness::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.txt");

    reconcile::run(
        &harness.engine(),
        &scope(),
        OutputFormat::Text,
        Some(&path),
        false,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("persistent://public/default/orders [divergent]"));
    assert!(text.contains("missing"));
    assert!(text.contains("Topics: 1 (0 consistent, 1 divergent, 0 unreachable)"));
}

#[tokio::test]
async fn test_canonical_reports_are_identical_across_runs() {
    let harness = Harness::start().await;
    let dir = tempfile::tempdir().unwrap();
    let engine = harness.engine();

    let mut outputs = Vec::new();
    for name in ["first.json", "second.json"] {
        let path = dir.path().join(name);
        let code = reconcile::run(
            &engine,
            &scope(),
            OutputFormat::Json,
            Some(&path),
            true,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(code, EXIT_DIVERGENT);
        outputs.push(std::fs::read_to_string(&path).unwrap());
    }

    assert_eq!(outputs[0], outputs[1]);
    assert!(!outputs[0].contains("observed_at"));
    assert!(!outputs[0].contains("generated_at"));
    let value: serde_json::Value = serde_json::from_str(&outputs[0]).unwrap();
    assert_eq!(value["statistics"]["missing"], 1);
}

#[tokio::test]
async fn test_storage_size() {
    let harness = Harness::start().await;
    let code = storage_size::run(&harness.engine(), &scope(), OutputFormat::Json)
        .await
        .unwrap();
    assert_eq!(code, EXIT_CONSISTENT);
}
