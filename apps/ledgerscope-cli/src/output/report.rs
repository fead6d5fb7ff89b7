//! Text rendering of reports and plans.
//!
//! Only findings are listed line by line; consistent ledgers are counted.

use ledgerscope_reconcile::{
    LedgerRecord, ReconciliationReport, RecordStatus, RepairAction, RepairPlan, StorageSizeReport,
};

fn describe_record(record: &LedgerRecord) -> String {
    let mut line = format!("  ledger {:<10} {:<16}", record.ledger_id, record.status.as_str());
    if record.conflicts.is_empty() {
        let seen: Vec<String> = record
            .witnesses
            .iter()
            .map(|w| format!("{}={}", w.source, w.state))
            .collect();
        line.push_str(&seen.join(" "));
    } else {
        let conflicts: Vec<String> = record
            .conflicts
            .iter()
            .map(|c| {
                let values: Vec<String> = c
                    .observed
                    .iter()
                    .map(|o| format!("{}={}", o.source, o.value))
                    .collect();
                format!("{:?}: {}", c.field, values.join(" ")).to_lowercase()
            })
            .collect();
        line.push_str(&conflicts.join("; "));
    }
    if record.status == RecordStatus::UnderReplicated {
        if let Some(ensemble) = record
            .witnesses
            .iter()
            .find(|w| w.live_members.is_some())
        {
            line.push_str(&format!(
                " live={}/{}",
                ensemble.live_members.unwrap_or_default(),
                ensemble.write_quorum.unwrap_or_default()
            ));
        }
    }
    line.trim_end().to_string()
}

fn describe_action(action: &RepairAction) -> String {
    let outcome = action
        .outcome
        .map(|o| o.as_str().to_string())
        .unwrap_or_else(|| "pending".to_string());
    let mut line = format!(
        "  {:<22} ledger {:<10} {:<14} {}",
        action.kind.as_str(),
        action.ledger_id,
        outcome,
        action.topic_label()
    );
    if let Some(message) = &action.message {
        line.push_str(&format!(" ({message})"));
    }
    line
}

pub fn render_report(report: &ReconciliationReport) -> String {
    let mut lines = vec![format!(
        "Reconciliation of {} at {}",
        report.scope,
        report.generated_at.to_rfc3339()
    )];
    if report.cancelled {
        lines.push("Run was cancelled; unvisited ledgers are reported as unknown.".to_string());
    }
    for failure in &report.failures {
        lines.push(format!(
            "! {} {}: {}",
            failure.source, failure.error_code, failure.message
        ));
    }

    for (topic, topic_report) in &report.topics {
        let findings: Vec<&LedgerRecord> = topic_report
            .ledgers
            .iter()
            .filter(|r| r.status != RecordStatus::Consistent)
            .collect();
        if findings.is_empty() && topic_report.failures.is_empty() {
            continue;
        }
        lines.push(String::new());
        lines.push(format!("{} [{}]", topic, topic_report.summary));
        for failure in &topic_report.failures {
            lines.push(format!(
                "  ! {} {}: {}",
                failure.source, failure.error_code, failure.message
            ));
        }
        lines.extend(findings.into_iter().map(describe_record));
    }

    if !report.unattributed.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "Ledgers attributed to no topic ({}):",
            report.unattributed.len()
        ));
        lines.extend(report.unattributed.iter().map(describe_record));
    }

    if !report.repairs.is_empty() {
        lines.push(String::new());
        lines.push("Repairs:".to_string());
        lines.extend(report.repairs.iter().map(describe_action));
    }

    let stats = &report.statistics;
    lines.push(String::new());
    lines.push(format!(
        "Topics: {} ({} consistent, {} divergent, {} unreachable)",
        stats.topics, stats.consistent_topics, stats.divergent_topics, stats.unreachable_topics
    ));
    lines.push(format!(
        "Ledgers: {} ({} consistent, {} divergent, {} orphaned, {} missing, {} under-replicated, {} indeterminate)",
        stats.ledgers,
        stats.consistent,
        stats.divergent,
        stats.orphaned,
        stats.missing,
        stats.under_replicated,
        stats.indeterminate
    ));
    lines.join("\n")
}

pub fn render_plan(plan: &RepairPlan) -> String {
    if plan.is_empty() {
        return "Nothing to repair.".to_string();
    }
    let mut lines = Vec::new();
    if !plan.actions.is_empty() {
        lines.push(format!("Planned actions ({}):", plan.actions.len()));
        lines.extend(plan.actions.iter().map(describe_action));
    }
    if !plan.alerts.is_empty() {
        lines.push(format!("Alerts ({}):", plan.alerts.len()));
        lines.extend(plan.alerts.iter().map(|a| {
            format!(
                "  ledger {:<10} {:<16} {}: {}",
                a.ledger_id,
                a.status.as_str(),
                a.topic.as_ref().map_or_else(|| "-".to_string(), ToString::to_string),
                a.message
            )
        }));
    }
    lines.join("\n")
}

pub fn render_storage(report: &StorageSizeReport) -> String {
    let mut lines: Vec<String> = report
        .topics
        .iter()
        .map(|entry| match (&entry.size_bytes, &entry.failure) {
            (Some(size), _) => format!("{size:>16}  {}", entry.topic),
            (None, Some(failure)) => format!(
                "{:>16}  {} ({})",
                "?", entry.topic, failure.error_code
            ),
            (None, None) => format!("{:>16}  {}", "?", entry.topic),
        })
        .collect();
    lines.push(format!("{:>16}  total", report.total_bytes));
    lines.join("\n")
}
