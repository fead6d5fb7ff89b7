//! Engine and planner configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ReconcileError, ReconcileResult};

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Maximum concurrent ledger lookups and topic reads.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Expected live ensemble members; falls back to each ledger's write quorum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<u32>,

    /// Outer deadline for one witness call in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_concurrency() -> usize {
    16
}

fn default_call_timeout_ms() -> u64 {
    120_000
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            replication_factor: None,
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl ReconcileConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_replication_factor(mut self, factor: u32) -> Self {
        self.replication_factor = Some(factor);
        self
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn validate(&self) -> ReconcileResult<()> {
        if self.concurrency == 0 {
            return Err(ReconcileError::InvalidConfiguration(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.replication_factor == Some(0) {
            return Err(ReconcileError::InvalidConfiguration(
                "replication factor must be at least 1".to_string(),
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(ReconcileError::InvalidConfiguration(
                "call timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the repair planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Orphans created more recently than this are deferred.
    #[serde(default = "default_min_orphan_age_days")]
    pub min_orphan_age_days: u64,

    /// Also plan removing missing ledgers from the managed-ledger list.
    #[serde(default)]
    pub repoint_missing: bool,
}

fn default_min_orphan_age_days() -> u64 {
    10
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            min_orphan_age_days: default_min_orphan_age_days(),
            repoint_missing: false,
        }
    }
}

impl RepairConfig {
    pub fn with_min_orphan_age_days(mut self, days: u64) -> Self {
        self.min_orphan_age_days = days;
        self
    }

    pub fn with_repoint_missing(mut self, enabled: bool) -> Self {
        self.repoint_missing = enabled;
        self
    }

    pub fn min_orphan_age(&self) -> chrono::Duration {
        // clamped well inside chrono's range
        chrono::Duration::days(self.min_orphan_age_days.min(1_000_000) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: ReconcileConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.concurrency, 16);
        assert_eq!(config.replication_factor, None);
        assert!(config.validate().is_ok());

        let repair = RepairConfig::default();
        assert_eq!(repair.min_orphan_age(), chrono::Duration::days(10));
        assert!(!repair.repoint_missing);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = ReconcileConfig::default()
            .with_concurrency(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_zero_replication_factor_rejected() {
        assert!(ReconcileConfig::default()
            .with_replication_factor(0)
            .validate()
            .is_err());
    }
}
