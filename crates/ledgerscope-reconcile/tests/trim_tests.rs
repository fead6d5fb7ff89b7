//! Trimming the oldest ledgers by retention.

mod helpers;

use chrono::Duration;
use helpers::{long_ago, now, topic, Cluster};
use ledgerscope_connector::prelude::*;
use ledgerscope_reconcile::{ActionOutcome, CancellationToken, RepairKind, TrimSelection};

/// `events` with ledgers 1..=3 created one day apart starting `long_ago()`,
/// and ledger 4 created an hour ago.
async fn cluster_with_history() -> (Cluster, TopicRef) {
    let cluster = Cluster::new();
    let events = topic("tenant/ns1", "events");
    cluster.healthy_topic(&events, &[1, 2, 3, 4]).await;
    for (i, id) in [1u64, 2, 3].into_iter().enumerate() {
        cluster.ensemble.add_with(
            id,
            &events,
            LedgerRole::Data,
            LedgerState::Closed,
            Some(long_ago() + Duration::days(i as i64)),
        );
    }
    cluster.ensemble.add_with(
        4,
        &events,
        LedgerRole::Data,
        LedgerState::Closed,
        Some(now() - Duration::hours(1)),
    );
    (cluster, events)
}

fn planned(plan: &ledgerscope_reconcile::RepairPlan) -> Vec<u64> {
    plan.actions.iter().map(|a| a.ledger_id).collect()
}

#[tokio::test]
async fn test_oldest_expired_ledgers_are_trimmed() {
    let (cluster, events) = cluster_with_history().await;
    cluster.admin.set_namespace_retention("tenant/ns1", 24 * 60);

    let plan = cluster
        .trimmer()
        .plan(TrimSelection::Oldest(2), None, false, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(planned(&plan), vec![1, 2]);
    assert!(plan.actions.iter().all(|a| a.kind == RepairKind::TrimExpired));
    assert_eq!(plan.actions[0].topic.as_ref(), Some(&events));
    assert_eq!(
        plan.actions[0].message.as_deref(),
        Some("namespace retention of 1440 minutes expired")
    );

    let executed = cluster.planner().execute(plan).await;
    assert!(executed
        .iter()
        .all(|a| a.outcome == Some(ActionOutcome::Success)));
    assert_eq!(*cluster.ensemble.deleted.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_created_before_stops_at_the_cutoff() {
    let (cluster, _) = cluster_with_history().await;
    cluster.admin.set_namespace_retention("tenant/ns1", 0);

    let plan = cluster
        .trimmer()
        .plan(
            TrimSelection::CreatedBefore(now() - Duration::days(1)),
            None,
            false,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(planned(&plan), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_infinite_retention_keeps_ledgers_unless_forced() {
    let (cluster, events) = cluster_with_history().await;
    cluster.admin.set_topic_retention(&events, -1);
    cluster.admin.set_namespace_retention("tenant/ns1", -1);
    let trimmer = cluster.trimmer();

    let plan = trimmer
        .plan(TrimSelection::Oldest(10), None, false, &CancellationToken::new())
        .await
        .unwrap();
    assert!(plan.is_empty());

    let forced = trimmer
        .plan(TrimSelection::Oldest(10), None, true, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(planned(&forced), vec![1, 2, 3, 4]);
    assert_eq!(forced.actions[0].message.as_deref(), Some("forced"));
}

#[tokio::test]
async fn test_topic_retention_is_consulted_first() {
    let (cluster, events) = cluster_with_history().await;
    let other = topic("tenant/ns1", "other");
    cluster.healthy_topic(&other, &[9]).await;
    cluster.admin.set_topic_retention(&events, 60);
    cluster.admin.set_namespace_retention("tenant/ns1", -1);

    let plan = cluster
        .trimmer()
        .plan(TrimSelection::Oldest(10), None, false, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(planned(&plan), vec![1, 2, 3]);
    assert_eq!(
        plan.actions[0].message.as_deref(),
        Some("topic retention of 60 minutes expired")
    );
}

#[tokio::test]
async fn test_scope_limits_the_candidates() {
    let (cluster, _) = cluster_with_history().await;
    let elsewhere = topic("tenant/ns2", "audit");
    cluster.healthy_topic(&elsewhere, &[20]).await;
    cluster.admin.set_namespace_retention("tenant/ns1", 0);
    cluster.admin.set_namespace_retention("tenant/ns2", 0);

    let scope: Scope = "tenant/ns2".parse().unwrap();
    let plan = cluster
        .trimmer()
        .plan(TrimSelection::Oldest(10), Some(&scope), false, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(planned(&plan), vec![20]);
}

#[tokio::test]
async fn test_unreadable_retention_and_unowned_ledgers_become_alerts() {
    let (cluster, events) = cluster_with_history().await;
    cluster.admin.fail(&events);
    cluster.ensemble.add_unowned(30, true, Some(long_ago() - Duration::days(1)));

    let plan = cluster
        .trimmer()
        .plan(TrimSelection::Oldest(2), None, false, &CancellationToken::new())
        .await
        .unwrap();

    assert!(plan.actions.is_empty());
    let alerted: Vec<(u64, Option<TopicRef>)> = plan
        .alerts
        .iter()
        .map(|a| (a.ledger_id, a.topic.clone()))
        .collect();
    assert_eq!(alerted, vec![(30, None), (1, Some(events))]);
}

#[tokio::test]
async fn test_trim_of_changed_ledger_is_skipped_stale() {
    let (cluster, _) = cluster_with_history().await;
    cluster.admin.set_namespace_retention("tenant/ns1", 0);

    let plan = cluster
        .trimmer()
        .plan(TrimSelection::Oldest(1), None, false, &CancellationToken::new())
        .await
        .unwrap();
    cluster.ensemble.remove(1);

    let executed = cluster.planner().execute(plan).await;
    assert_eq!(executed[0].outcome, Some(ActionOutcome::SkippedStale));
    assert!(cluster.ensemble.deleted.lock().unwrap().is_empty());
}
