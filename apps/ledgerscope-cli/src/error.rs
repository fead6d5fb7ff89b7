//! CLI error types and exit codes

use ledgerscope_connector::SourceError;
use ledgerscope_reconcile::{ReconcileError, Verdict};
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Everything consistent
/// - 1: Tool error (configuration, connectivity, bad input)
/// - 2: Divergence found
/// - 3: Partial failure (some topic unreachable, or a repair failed)
pub const EXIT_CONSISTENT: i32 = 0;
pub const EXIT_TOOL_ERROR: i32 = 1;
pub const EXIT_DIVERGENT: i32 = 2;
pub const EXIT_PARTIAL_FAILURE: i32 = 3;

/// Exit code for a report's overall verdict.
pub fn verdict_exit_code(verdict: Verdict) -> i32 {
    match verdict {
        Verdict::Consistent => EXIT_CONSISTENT,
        Verdict::Divergent => EXIT_DIVERGENT,
        Verdict::PartialFailure => EXIT_PARTIAL_FAILURE,
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Connection failed: {0}\n\nTroubleshooting:\n  - Check that the endpoint is reachable from this host\n  - Verify the address and port\n  - Check TLS and authentication settings")]
    ConnectionFailed(String),

    #[error("{0}")]
    Source(SourceError),

    #[error("{0}")]
    Reconcile(ReconcileError),

    #[error("I/O error: {0}")]
    Io(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        EXIT_TOOL_ERROR
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(_) => Some(
                "Pass --zookeeper, --bookie-url and --admin-url, or set them in config.json.",
            ),
            CliError::Reconcile(ReconcileError::MetadataUnavailable(_)) => {
                Some("The coordination store must be reachable to list topics.")
            }
            CliError::Source(SourceError::AuthenticationFailed { .. }) => {
                Some("Check --auth-token or LEDGERSCOPE_AUTH_TOKEN.")
            }
            _ => None,
        }
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::InvalidConfiguration { message } => CliError::Config(message),
            SourceError::Unreachable { .. } | SourceError::Timeout { .. } => {
                CliError::ConnectionFailed(e.to_string())
            }
            other => CliError::Source(other),
        }
    }
}

impl From<ReconcileError> for CliError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::InvalidConfiguration(message) => CliError::Config(message),
            other => CliError::Reconcile(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Validation(format!("JSON error: {}", e))
    }
}
