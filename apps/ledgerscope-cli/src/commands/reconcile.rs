//! Reconcile command
//!
//! Reads all three witnesses for the given scope and reports every ledger
//! they disagree on. Never writes to the cluster.
//!
//! ```bash
//! ledgerscope reconcile tenant/ns1 --output report.json
//! ```

use crate::commands::{cancel_on_interrupt, ConnectionArgs, Witnesses};
use crate::config::Settings;
use crate::error::{verdict_exit_code, CliResult};
use crate::output::{emit, print_info, print_warning, report::render_report, OutputFormat};
use clap::Args;
use ledgerscope_connector::Scope;
use ledgerscope_reconcile::{CancellationToken, ReconciliationEngine, SystemClock, Verdict};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Compare the coordination store, the bookies and the admin API
#[derive(Args, Debug)]
#[command(after_help = "EXIT CODES:
    0  All witnesses agree
    1  Tool error (configuration, coordination store unreachable)
    2  At least one ledger diverges
    3  Partial result (a topic or source could not be read, or the run was interrupted)

EXAMPLES:
    # Whole tenant, JSON report on stdout
    ledgerscope reconcile tenant

    # One namespace, human readable
    ledgerscope reconcile tenant/ns1 --format text

    # One topic and its partitions
    ledgerscope reconcile persistent://tenant/ns1/orders

    # Diff two runs
    ledgerscope reconcile tenant --canonical > before.json
")]
pub struct ReconcileArgs {
    /// Tenant, tenant/namespace, or a topic name
    #[arg(value_name = "SCOPE")]
    pub scope: Scope,

    /// Report format
    #[arg(short = 'f', long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Leave observation times out of the JSON report so that runs over an
    /// unchanged cluster are byte-identical (not readable by `repair`)
    #[arg(long)]
    pub canonical: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Execute the reconcile command
pub async fn execute(args: ReconcileArgs) -> CliResult<i32> {
    let settings = Settings::resolve(&args.connection)?;
    let witnesses = Witnesses::connect(&settings).await?;
    let engine = ReconciliationEngine::new(
        witnesses.metadata,
        witnesses.inspector,
        witnesses.admin,
        Arc::new(SystemClock),
    )
    .with_config(settings.reconcile.clone());

    let cancel = cancel_on_interrupt();
    run(
        &engine,
        &args.scope,
        args.format,
        args.output.as_deref(),
        args.canonical,
        &cancel,
    )
    .await
}

/// Run a reconciliation and emit its report; returns the exit code.
pub async fn run(
    engine: &ReconciliationEngine,
    scope: &Scope,
    format: OutputFormat,
    output: Option<&Path>,
    canonical: bool,
    cancel: &CancellationToken,
) -> CliResult<i32> {
    let report = engine.reconcile(scope, cancel).await?;
    info!(
        topics = report.statistics.topics,
        ledgers = report.statistics.ledgers,
        "Reconciliation finished"
    );

    let content = match format {
        OutputFormat::Json if canonical => report.to_canonical_json()?,
        OutputFormat::Json => report.to_json_pretty()?,
        OutputFormat::Text => render_report(&report),
    };
    emit(&content, output)?;

    let verdict = report.verdict();
    match verdict {
        Verdict::Consistent => print_info("All witnesses agree"),
        Verdict::Divergent => print_warning(&format!(
            "{} of {} ledgers diverge",
            report.statistics.ledgers - report.statistics.consistent,
            report.statistics.ledgers
        )),
        Verdict::PartialFailure => {
            print_warning("Report is partial; some sources could not be read")
        }
    }
    Ok(verdict_exit_code(verdict))
}
