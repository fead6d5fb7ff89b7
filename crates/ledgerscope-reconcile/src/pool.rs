//! Bounded ledger lookups against the storage ensemble.

use ledgerscope_connector::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Result of looking up one ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(EnsembleLedger),
    /// The ensemble has no such ledger.
    NotFound,
    /// Retries and the deadline were exhausted.
    Failed { error_code: String, message: String },
    /// Never dispatched because the run was cancelled.
    Cancelled,
}

impl LookupOutcome {
    fn from_result(ledger_id: u64, result: SourceResult<EnsembleLedger>) -> Self {
        match result {
            Ok(ledger) => LookupOutcome::Found(ledger),
            Err(e) if e.is_not_found() => LookupOutcome::NotFound,
            Err(e) => {
                warn!(ledger_id, error = %e, "Ledger lookup failed");
                LookupOutcome::Failed {
                    error_code: e.error_code().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Worker pool for `get_ledger_metadata` calls.
///
/// At most `concurrency` lookups are in flight. Each task writes into the
/// slot of its input index, so the output order matches the input order.
#[derive(Clone)]
pub struct LookupPool {
    inspector: Arc<dyn LedgerInspector>,
    concurrency: usize,
    call_timeout: Duration,
}

impl LookupPool {
    pub fn new(inspector: Arc<dyn LedgerInspector>, concurrency: usize, call_timeout: Duration) -> Self {
        Self {
            inspector,
            concurrency: concurrency.max(1),
            call_timeout,
        }
    }

    /// Look up every id. After `cancel` fires no further lookup is started;
    /// in-flight ones run to completion and the rest come back `Cancelled`.
    pub async fn lookup_all(&self, ids: &[u64], cancel: &CancellationToken) -> Vec<LookupOutcome> {
        let mut slots: Vec<Option<LookupOutcome>> = (0..ids.len()).map(|_| None).collect();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut dispatched = 0;

        for (idx, &ledger_id) in ids.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(dispatched, remaining = ids.len() - idx, "Cancelled, no further lookups");
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let inspector = self.inspector.clone();
            let timeout = self.call_timeout;
            tasks.spawn(async move {
                let _permit = permit;
                let result = with_timeout(
                    WitnessSource::StorageEnsemble,
                    timeout,
                    inspector.get_ledger_metadata(ledger_id),
                )
                .await;
                (idx, LookupOutcome::from_result(ledger_id, result))
            });
            dispatched += 1;
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => error!(error = %e, "Ledger lookup task failed"),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| match slot {
                Some(outcome) => outcome,
                None if idx >= dispatched => LookupOutcome::Cancelled,
                None => LookupOutcome::Failed {
                    error_code: "TASK_FAILED".to_string(),
                    message: "lookup task did not complete".to_string(),
                },
            })
            .collect()
    }
}
