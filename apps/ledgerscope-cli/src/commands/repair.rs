//! Repair command
//!
//! Plans repairs from a saved reconciliation report. Without `--yes` the plan
//! is only printed. With `--yes` each action is re-validated against a fresh
//! read and applied, and the report is written back out with the outcomes.

use crate::commands::{ConnectionArgs, Witnesses};
use crate::config::Settings;
use crate::error::{CliResult, EXIT_CONSISTENT, EXIT_PARTIAL_FAILURE};
use crate::output::{
    emit, print_info, print_key_value, print_warning,
    report::{render_plan, render_report},
    OutputFormat,
};
use clap::Args;
use ledgerscope_reconcile::{
    ActionOutcome, ReconciliationReport, RepairAction, RepairConfig, RepairPlanner, SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Plan and apply repairs from a reconciliation report
#[derive(Args, Debug)]
#[command(after_help = "EXIT CODES:
    0  Plan printed, or every action succeeded, was skipped as stale or deferred
    1  Tool error (bad report file, configuration, connectivity)
    3  At least one action failed

EXAMPLES:
    # Show what would be done
    ledgerscope repair report.json

    # Apply, and also drop missing ledgers from managed-ledger lists
    ledgerscope repair report.json --yes --repoint-missing --output repaired.json
")]
pub struct RepairArgs {
    /// Report produced by `ledgerscope reconcile`
    #[arg(value_name = "REPORT")]
    pub report: PathBuf,

    /// Apply the plan; without this only a dry run is printed
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Plan removing missing ledgers from managed-ledger lists
    #[arg(long)]
    pub repoint_missing: bool,

    /// Defer deleting orphans younger than this many days
    #[arg(long)]
    pub min_orphan_age_days: Option<u64>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Write the updated report to a file instead of stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl RepairArgs {
    fn repair_config(&self, base: &RepairConfig) -> RepairConfig {
        let mut config = base.clone();
        if self.repoint_missing {
            config.repoint_missing = true;
        }
        if let Some(days) = self.min_orphan_age_days {
            config.min_orphan_age_days = days;
        }
        config
    }
}

/// Read a report written by the reconcile command.
pub fn load_report(path: &Path) -> CliResult<ReconciliationReport> {
    let content = std::fs::read_to_string(path)?;
    Ok(ReconciliationReport::from_json(&content)?)
}

/// Execute the repair command
pub async fn execute(args: RepairArgs) -> CliResult<i32> {
    let report = load_report(&args.report)?;
    let settings = Settings::resolve(&args.connection)?;
    let config = args.repair_config(&settings.repair);

    let (metadata, inspector) = Witnesses::connect_writable(&settings).await?;
    let planner =
        RepairPlanner::new(metadata, inspector, Arc::new(SystemClock)).with_config(config);

    run(
        &planner,
        report,
        args.yes,
        args.format,
        args.output.as_deref(),
    )
    .await
}

/// Plan, and when `apply` is set execute, repairs for `report`.
pub async fn run(
    planner: &RepairPlanner,
    mut report: ReconciliationReport,
    apply: bool,
    format: OutputFormat,
    output: Option<&Path>,
) -> CliResult<i32> {
    let plan = planner.plan(&report);
    info!(
        actions = plan.actions.len(),
        alerts = plan.alerts.len(),
        "Repair plan ready"
    );

    if !apply {
        let content = match format {
            OutputFormat::Json => serde_json::to_string_pretty(&plan)?,
            OutputFormat::Text => render_plan(&plan),
        };
        emit(&content, output)?;
        if plan.pending().next().is_some() {
            print_info("Dry run; pass --yes to apply");
        }
        return Ok(EXIT_CONSISTENT);
    }

    report.alerts = plan.alerts.clone();
    let executed = planner.execute(plan).await;
    summarize(&executed);
    let failed = executed
        .iter()
        .any(|a| a.outcome == Some(ActionOutcome::Failure));
    report.repairs = executed;

    let content = match format {
        OutputFormat::Json => report.to_json_pretty()?,
        OutputFormat::Text => render_report(&report),
    };
    emit(&content, output)?;

    Ok(if failed {
        EXIT_PARTIAL_FAILURE
    } else {
        EXIT_CONSISTENT
    })
}

fn summarize(actions: &[RepairAction]) {
    for outcome in [
        ActionOutcome::Success,
        ActionOutcome::SkippedStale,
        ActionOutcome::Deferred,
        ActionOutcome::Failure,
    ] {
        let count = actions
            .iter()
            .filter(|a| a.outcome == Some(outcome))
            .count();
        if count > 0 {
            print_key_value(outcome.as_str(), &count.to_string());
        }
    }
    if actions.iter().any(|a| a.outcome == Some(ActionOutcome::Failure)) {
        print_warning("Some repairs failed; re-run reconcile before retrying");
    }
}
