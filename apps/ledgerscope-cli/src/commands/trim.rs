//! Trim-ledgers command
//!
//! Deletes the oldest Pulsar ledgers once their topic's retention has
//! expired. Without `--yes` the plan is only printed.

use crate::commands::{cancel_on_interrupt, ConnectionArgs, Witnesses};
use crate::config::Settings;
use crate::error::{CliResult, EXIT_CONSISTENT, EXIT_PARTIAL_FAILURE};
use crate::output::{emit, print_info, print_warning, report::render_plan, OutputFormat};
use chrono::{DateTime, Utc};
use clap::Args;
use ledgerscope_connector::Scope;
use ledgerscope_reconcile::{
    ActionOutcome, CancellationToken, LedgerTrimmer, RepairPlan, RepairPlanner, SystemClock,
    TrimSelection,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Delete the oldest ledgers whose retention has expired
#[derive(Args, Debug)]
#[command(after_help = "EXIT CODES:
    0  Plan printed, or every ledger was deleted or skipped as stale
    1  Tool error
    3  At least one deletion failed

EXAMPLES:
    # Show the ten oldest ledgers that retention allows deleting
    ledgerscope trim-ledgers --amount 10

    # Delete everything in a namespace created before 2024, ignoring retention
    ledgerscope trim-ledgers tenant/ns1 --before 2024-01-01T00:00:00Z --force --yes
")]
pub struct TrimArgs {
    /// Limit to a tenant, tenant/namespace, or topic
    #[arg(value_name = "SCOPE")]
    pub scope: Option<Scope>,

    /// Consider the N oldest ledgers
    #[arg(short = 'n', long, group = "selection", required_unless_present = "before")]
    pub amount: Option<usize>,

    /// Consider ledgers created before this RFC 3339 instant
    #[arg(long, group = "selection")]
    pub before: Option<DateTime<Utc>>,

    /// Skip the retention check
    #[arg(long)]
    pub force: bool,

    /// Delete; without this only a dry run is printed
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Write the plan or outcomes to a file instead of stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl TrimArgs {
    pub fn selection(&self) -> TrimSelection {
        match (self.before, self.amount) {
            (Some(at), _) => TrimSelection::CreatedBefore(at),
            (None, amount) => TrimSelection::Oldest(amount.unwrap_or_default()),
        }
    }
}

/// Execute the trim-ledgers command
pub async fn execute(args: TrimArgs) -> CliResult<i32> {
    let settings = Settings::resolve(&args.connection)?;
    let witnesses = Witnesses::connect(&settings).await?;
    let clock = Arc::new(SystemClock);
    let trimmer = LedgerTrimmer::new(
        witnesses.metadata.clone(),
        witnesses.inspector.clone(),
        witnesses.admin,
        clock.clone(),
    )
    .with_config(settings.reconcile.clone());
    let planner = RepairPlanner::new(witnesses.metadata, witnesses.inspector, clock)
        .with_config(settings.repair.clone());

    let cancel = cancel_on_interrupt();
    run(&trimmer, &planner, &args, &cancel).await
}

/// Plan, and with `--yes` execute, the trim selected by `args`.
pub async fn run(
    trimmer: &LedgerTrimmer,
    planner: &RepairPlanner,
    args: &TrimArgs,
    cancel: &CancellationToken,
) -> CliResult<i32> {
    let selection = args.selection();
    let output = args.output.as_deref();
    let plan = trimmer
        .plan(selection, args.scope.as_ref(), args.force, cancel)
        .await?;
    info!(
        selection = %selection,
        actions = plan.actions.len(),
        alerts = plan.alerts.len(),
        "Trim plan ready"
    );

    if !args.yes {
        emit(&render(&plan, args.format)?, output)?;
        if !plan.actions.is_empty() {
            print_info("Dry run; pass --yes to delete");
        }
        return Ok(EXIT_CONSISTENT);
    }

    let alerts = plan.alerts.clone();
    let executed = RepairPlan {
        actions: planner.execute(plan).await,
        alerts,
    };
    emit(&render(&executed, args.format)?, output)?;

    if executed
        .actions
        .iter()
        .any(|a| a.outcome == Some(ActionOutcome::Failure))
    {
        print_warning("Some ledgers could not be deleted");
        return Ok(EXIT_PARTIAL_FAILURE);
    }
    Ok(EXIT_CONSISTENT)
}

fn render(plan: &RepairPlan, format: OutputFormat) -> CliResult<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(plan)?,
        OutputFormat::Text => render_plan(plan),
    })
}
