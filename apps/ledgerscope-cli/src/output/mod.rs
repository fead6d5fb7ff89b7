//! Terminal and file output

mod printer;
pub mod report;

use crate::error::CliResult;
use clap::ValueEnum;
use std::io::Write;
use std::path::Path;

pub use printer::{print_info, print_key_value, print_success, print_warning};

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON, stable key order
    #[default]
    Json,
    /// Human readable summary of the findings
    Text,
}

/// Write `content` to `path`, or to stdout when no path is given.
pub fn emit(content: &str, path: Option<&Path>) -> CliResult<()> {
    match path {
        Some(path) => {
            std::fs::write(path, format!("{content}\n"))?;
            print_success(&format!("Report written to {}", path.display()));
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{content}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_to_file_appends_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        emit("{}", Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
    }
}
