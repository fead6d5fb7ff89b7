//! Decoding of the bookie HTTP ledger metadata format.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use ledgerscope_connector::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

pub const MANAGED_LEDGER_KEY: &str = "pulsar/managed-ledger";
pub const SCHEMA_ID_KEY: &str = "pulsar/schemaId";
pub const CURSOR_KEY: &str = "pulsar/cursor";
pub const COMPACTED_TOPIC_KEY: &str = "pulsar/compactedTopic";
pub const APPLICATION_KEY: &str = "application";

/// Ledger metadata as serialized by the bookie HTTP service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerMetadataJson {
    pub state: String,
    #[serde(default)]
    pub last_entry_id: Option<i64>,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default)]
    pub write_quorum_size: Option<u32>,
    #[serde(default)]
    pub ensemble_size: Option<u32>,
    /// Creation time in epoch milliseconds.
    #[serde(default)]
    pub ctime: Option<i64>,
    /// First entry id of each ensemble change to the bookies of that ensemble.
    #[serde(default)]
    pub all_ensembles: BTreeMap<String, Vec<String>>,
    /// Values are base64 encoded.
    #[serde(default)]
    pub custom_metadata: BTreeMap<String, String>,
}

impl LedgerMetadataJson {
    /// Convert into the connector-neutral view of ledger `ledger_id`.
    pub fn into_ensemble_ledger(self, ledger_id: u64) -> SourceResult<EnsembleLedger> {
        let state = match self.state.to_ascii_uppercase().as_str() {
            "OPEN" | "IN_RECOVERY" => LedgerState::Open,
            "CLOSED" => LedgerState::Closed,
            other => {
                return Err(SourceError::invalid_data(format!(
                    "ledger {ledger_id} has unknown state '{other}'"
                )))
            }
        };

        let entry_count = match state {
            LedgerState::Closed => self
                .last_entry_id
                .and_then(|last| last.checked_add(1))
                .and_then(|n| u64::try_from(n).ok()),
            _ => None,
        };

        let ensemble = self
            .all_ensembles
            .iter()
            .filter_map(|(first_entry, bookies)| first_entry.parse::<i64>().ok().map(|e| (e, bookies)))
            .max_by_key(|(first_entry, _)| *first_entry)
            .map(|(_, bookies)| bookies.clone())
            .unwrap_or_default();

        let ctime = self
            .ctime
            .filter(|ms| *ms > 0)
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        let custom = decode_custom_metadata(ledger_id, &self.custom_metadata);
        let pulsar = is_pulsar_ledger(&custom);
        let owner = if pulsar {
            attribute_owner(ledger_id, &custom)
        } else {
            None
        };

        Ok(EnsembleLedger {
            ledger_id,
            state,
            entry_count,
            length: self.length,
            ensemble,
            write_quorum: self.write_quorum_size.or(self.ensemble_size),
            ctime,
            owner,
            pulsar,
        })
    }
}

fn decode_custom_metadata(
    ledger_id: u64,
    raw: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    raw.iter()
        .filter_map(|(key, value)| {
            let decoded = STANDARD
                .decode(value)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok());
            if decoded.is_none() {
                debug!(ledger_id, key = %key, "Ignoring undecodable custom metadata value");
            }
            decoded.map(|v| (key.clone(), v))
        })
        .collect()
}

/// Whether the serving layer created this ledger.
pub fn is_pulsar_ledger(custom: &BTreeMap<String, String>) -> bool {
    custom.get(APPLICATION_KEY).map(String::as_str) == Some("pulsar")
        || custom.contains_key(CURSOR_KEY)
}

/// Topic and role a ledger belongs to, from its custom metadata.
pub fn attribute_owner(ledger_id: u64, custom: &BTreeMap<String, String>) -> Option<LedgerOwner> {
    let parsed = if let Some(ml_name) = custom.get(MANAGED_LEDGER_KEY) {
        let role = if custom.contains_key(CURSOR_KEY) {
            LedgerRole::Cursor
        } else {
            LedgerRole::Data
        };
        TopicRef::from_managed_ledger_name(ml_name).map(|topic| LedgerOwner { topic, role })
    } else if let Some(topic) = custom.get(COMPACTED_TOPIC_KEY) {
        topic.parse().map(|topic| LedgerOwner {
            topic,
            role: LedgerRole::Compacted,
        })
    } else if let Some(schema_id) = custom.get(SCHEMA_ID_KEY) {
        schema_id.parse().map(|topic| LedgerOwner {
            topic,
            role: LedgerRole::Schema,
        })
    } else {
        return None;
    };

    match parsed {
        Ok(owner) => Some(owner),
        Err(e) => {
            debug!(ledger_id, error = %e, "Ledger names no usable topic");
            None
        }
    }
}
