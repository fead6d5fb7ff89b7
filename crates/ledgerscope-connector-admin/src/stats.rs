//! Wire format of persistent-topic internal stats.

use ledgerscope_connector::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;

const LEDGER_OPENED: &str = "LedgerOpened";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalStats {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub ledgers: Vec<LedgerStats>,
    #[serde(default)]
    pub cursors: BTreeMap<String, CursorStats>,
    #[serde(default)]
    pub schema_ledgers: Vec<LedgerStats>,
    #[serde(default)]
    pub compacted_ledger: Option<LedgerStats>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub ledger_id: i64,
    #[serde(default)]
    pub entries: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorStats {
    #[serde(default)]
    pub cursor_ledger: Option<i64>,
    #[serde(default)]
    pub mark_delete_position: Option<String>,
}

fn non_negative(value: Option<i64>) -> Option<u64> {
    value.and_then(|v| u64::try_from(v).ok())
}

impl LedgerStats {
    fn to_listed(&self, state: LedgerState, role: LedgerRole) -> Option<ListedLedger> {
        let ledger_id = u64::try_from(self.ledger_id).ok()?;
        let mut listed = ListedLedger::new(ledger_id, state, role);
        listed.entries = non_negative(self.entries);
        listed.size = non_negative(self.size);
        Some(listed)
    }
}

impl InternalStats {
    /// Flatten into the ledgers the serving layer holds for the topic.
    ///
    /// Ids below zero mean "no ledger" and are dropped.
    pub fn into_listed(self) -> Vec<ListedLedger> {
        let open_tail = self.state.as_deref() == Some(LEDGER_OPENED);
        let count = self.ledgers.len();

        let mut listed: Vec<ListedLedger> = self
            .ledgers
            .iter()
            .enumerate()
            .filter_map(|(idx, ledger)| {
                let state = if open_tail && idx + 1 == count {
                    LedgerState::Open
                } else {
                    LedgerState::Closed
                };
                ledger.to_listed(state, LedgerRole::Data)
            })
            .collect();

        for (name, cursor) in &self.cursors {
            let Some(ledger_id) = non_negative(cursor.cursor_ledger) else {
                continue;
            };
            let mark_delete = cursor
                .mark_delete_position
                .as_deref()
                .and_then(|p| p.parse::<Position>().ok());
            listed.push(
                ListedLedger::new(ledger_id, LedgerState::Open, LedgerRole::Cursor)
                    .with_cursor(name.clone(), mark_delete),
            );
        }

        listed.extend(
            self.schema_ledgers
                .iter()
                .filter_map(|l| l.to_listed(LedgerState::Closed, LedgerRole::Schema)),
        );
        if let Some(compacted) = &self.compacted_ledger {
            listed.extend(compacted.to_listed(LedgerState::Closed, LedgerRole::Compacted));
        }

        listed
    }
}
