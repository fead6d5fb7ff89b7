//! ledgerscope - find and repair ledgers the cluster's witnesses disagree on
//!
//! - Reconcile the coordination store, the bookies and the admin API
//! - Plan and apply repairs from a saved report
//! - Report per-topic storage usage
//! - Trim the oldest ledgers once retention allows

use clap::{ArgAction, Parser, Subcommand};
use ledgerscope_cli::commands;
use ledgerscope_cli::error::CliResult;
use ledgerscope_cli::logging::{directive, init_logging, LogFormat};

/// ledgerscope - Pulsar ledger reconciliation
#[derive(Parser)]
#[command(name = "ledgerscope")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log filter, e.g. `info` or `ledgerscope_reconcile=debug` (overridden by RUST_LOG)
    #[arg(long, global = true, env = "LEDGERSCOPE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare all witnesses and report disagreements
    Reconcile(commands::reconcile::ReconcileArgs),

    /// Plan and apply repairs from a report
    Repair(commands::repair::RepairArgs),

    /// Report storage size per topic
    StorageSize(commands::storage_size::StorageSizeArgs),

    /// Delete the oldest ledgers whose retention has expired
    TrimLedgers(commands::trim::TrimArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(
        &directive(cli.log_level.as_deref(), cli.verbose),
        cli.log_format,
    );

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<i32> {
    match cli.command {
        Commands::Reconcile(args) => commands::reconcile::execute(args).await,
        Commands::Repair(args) => commands::repair::execute(args).await,
        Commands::StorageSize(args) => commands::storage_size::execute(args).await,
        Commands::TrimLedgers(args) => commands::trim::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reconcile() {
        let cli = Cli::try_parse_from([
            "ledgerscope",
            "-vv",
            "reconcile",
            "tenant/ns1",
            "--format",
            "text",
            "--zookeeper",
            "zk:2181",
            "--concurrency",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Reconcile(args) => {
                assert_eq!(args.scope.to_string(), "tenant/ns1");
                assert!(!args.canonical);
                assert_eq!(args.connection.zookeeper.as_deref(), Some("zk:2181"));
                assert_eq!(args.connection.concurrency, Some(4));
            }
            _ => panic!("expected reconcile"),
        }
    }

    #[test]
    fn test_parse_reconcile_canonical() {
        let cli = Cli::try_parse_from(["ledgerscope", "reconcile", "tenant", "--canonical"]).unwrap();
        match cli.command {
            Commands::Reconcile(args) => assert!(args.canonical),
            _ => panic!("expected reconcile"),
        }
    }

    #[test]
    fn test_parse_repair_defaults_to_dry_run() {
        let cli = Cli::try_parse_from(["ledgerscope", "repair", "report.json"]).unwrap();
        match cli.command {
            Commands::Repair(args) => {
                assert!(!args.yes);
                assert!(!args.repoint_missing);
            }
            _ => panic!("expected repair"),
        }
    }

    #[test]
    fn test_parse_trim_ledgers() {
        let cli = Cli::try_parse_from([
            "ledgerscope",
            "trim-ledgers",
            "tenant/ns1",
            "--before",
            "2024-01-01T00:00:00Z",
            "--force",
        ])
        .unwrap();
        match cli.command {
            Commands::TrimLedgers(args) => {
                assert_eq!(args.scope.map(|s| s.to_string()).as_deref(), Some("tenant/ns1"));
                assert!(args.before.is_some());
                assert!(args.force);
                assert!(!args.yes);
            }
            _ => panic!("expected trim-ledgers"),
        }
    }

    #[test]
    fn test_trim_ledgers_needs_exactly_one_selection() {
        assert!(Cli::try_parse_from(["ledgerscope", "trim-ledgers"]).is_err());
        assert!(Cli::try_parse_from([
            "ledgerscope",
            "trim-ledgers",
            "-n",
            "3",
            "--before",
            "2024-01-01T00:00:00Z",
        ])
        .is_err());
    }

    #[test]
    fn test_bad_scope_is_rejected() {
        assert!(Cli::try_parse_from(["ledgerscope", "storage-size", "a/b/c/d"]).is_err());
    }
}
