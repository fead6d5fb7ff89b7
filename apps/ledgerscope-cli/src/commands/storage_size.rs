//! Storage size command

use crate::commands::{ConnectionArgs, Witnesses};
use crate::config::Settings;
use crate::error::{CliResult, EXIT_CONSISTENT, EXIT_PARTIAL_FAILURE};
use crate::output::{emit, print_warning, report::render_storage, OutputFormat};
use clap::Args;
use ledgerscope_connector::Scope;
use ledgerscope_reconcile::{ReconciliationEngine, SystemClock};
use std::sync::Arc;

/// Report the storage used by every topic in scope, as the admin API sees it
#[derive(Args, Debug)]
#[command(after_help = "EXIT CODES:
    0  Every topic's size was read
    1  Tool error
    3  Some topics could not be read
")]
pub struct StorageSizeArgs {
    /// Tenant, tenant/namespace, or a topic name
    #[arg(value_name = "SCOPE")]
    pub scope: Scope,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Execute the storage-size command
pub async fn execute(args: StorageSizeArgs) -> CliResult<i32> {
    let settings = Settings::resolve(&args.connection)?;
    let witnesses = Witnesses::connect(&settings).await?;
    let engine = ReconciliationEngine::new(
        witnesses.metadata,
        witnesses.inspector,
        witnesses.admin,
        Arc::new(SystemClock),
    )
    .with_config(settings.reconcile.clone());
    run(&engine, &args.scope, args.format).await
}

pub async fn run(
    engine: &ReconciliationEngine,
    scope: &Scope,
    format: OutputFormat,
) -> CliResult<i32> {
    let report = engine.storage_sizes(scope).await?;
    let content = match format {
        OutputFormat::Json => report.to_json_pretty()?,
        OutputFormat::Text => render_storage(&report),
    };
    emit(&content, None)?;

    if report.is_partial() {
        print_warning("Some topic sizes could not be read; the total is a lower bound");
        return Ok(EXIT_PARTIAL_FAILURE);
    }
    Ok(EXIT_CONSISTENT)
}
