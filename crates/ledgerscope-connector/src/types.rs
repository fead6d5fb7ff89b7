//! Witness type definitions
//!
//! Enums and value types produced by the metadata store, storage ensemble
//! and admin API connectors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::topic::TopicRef;

/// One of the three independent sources of truth.
///
/// The declaration order is the order witnesses are sorted in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WitnessSource {
    /// Topic/ledger metadata in the coordination store.
    MetadataStore,
    /// Ledger metadata held by the bookies.
    StorageEnsemble,
    /// The serving layer's view through the admin REST API.
    AdminApi,
}

impl WitnessSource {
    /// Get all witness sources in record order.
    #[must_use]
    pub fn all() -> &'static [WitnessSource] {
        &[
            WitnessSource::MetadataStore,
            WitnessSource::StorageEnsemble,
            WitnessSource::AdminApi,
        ]
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WitnessSource::MetadataStore => "metadata-store",
            WitnessSource::StorageEnsemble => "storage-ensemble",
            WitnessSource::AdminApi => "admin-api",
        }
    }
}

impl fmt::Display for WitnessSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WitnessSource {
    type Err = ParseWitnessSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "metadata-store" => Ok(WitnessSource::MetadataStore),
            "storage-ensemble" => Ok(WitnessSource::StorageEnsemble),
            "admin-api" => Ok(WitnessSource::AdminApi),
            _ => Err(ParseWitnessSourceError(s.to_string())),
        }
    }
}

/// Error parsing a witness source from string.
#[derive(Debug, Clone)]
pub struct ParseWitnessSourceError(String);

impl fmt::Display for ParseWitnessSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid witness source '{}', expected one of: metadata-store, storage-ensemble, admin-api",
            self.0
        )
    }
}

impl std::error::Error for ParseWitnessSourceError {}

/// Open/closed state of a ledger as seen by one witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerState {
    Open,
    Closed,
    /// The witness could not be consulted.
    Unknown,
}

impl LedgerState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerState::Open => "open",
            LedgerState::Closed => "closed",
            LedgerState::Unknown => "unknown",
        }
    }

    /// Whether the state is an actual observation.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, LedgerState::Unknown)
    }
}

impl fmt::Display for LedgerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a ledger stores for its topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerRole {
    /// Message data of the managed ledger.
    #[default]
    Data,
    /// Persisted position of a subscription cursor.
    Cursor,
    /// Schema registry storage.
    Schema,
    /// Output of topic compaction.
    Compacted,
}

impl LedgerRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerRole::Data => "data",
            LedgerRole::Cursor => "cursor",
            LedgerRole::Schema => "schema",
            LedgerRole::Compacted => "compacted",
        }
    }

    /// Whether the coordination store's managed-ledger node tracks this role.
    ///
    /// Schema and compacted ledgers are referenced elsewhere and are only
    /// witnessed by the admin API and the ensemble.
    #[must_use]
    pub fn tracked_by_metadata_store(&self) -> bool {
        matches!(self, LedgerRole::Data | LedgerRole::Cursor)
    }
}

impl fmt::Display for LedgerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A `ledger:entry` position, e.g. a cursor's mark-delete position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub ledger_id: i64,
    pub entry_id: i64,
}

impl Position {
    #[must_use]
    pub fn new(ledger_id: i64, entry_id: i64) -> Self {
        Self {
            ledger_id,
            entry_id,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ledger_id, self.entry_id)
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ledger, entry) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid position '{s}', expected ledger:entry"))?;
        let ledger_id = ledger
            .trim()
            .parse()
            .map_err(|_| format!("invalid ledger id in position '{s}'"))?;
        let entry_id = entry
            .trim()
            .parse()
            .map_err(|_| format!("invalid entry id in position '{s}'"))?;
        Ok(Self::new(ledger_id, entry_id))
    }
}

/// A ledger listed for a topic by the metadata store or the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedLedger {
    pub ledger_id: u64,
    pub state: LedgerState,
    pub role: LedgerRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Cursor owning the ledger, for cursor ledgers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark_delete: Option<Position>,
}

impl ListedLedger {
    /// A ledger with only an id, state and role.
    #[must_use]
    pub fn new(ledger_id: u64, state: LedgerState, role: LedgerRole) -> Self {
        Self {
            ledger_id,
            state,
            role,
            entries: None,
            size: None,
            cursor: None,
            mark_delete: None,
        }
    }

    #[must_use]
    pub fn with_entries(mut self, entries: u64) -> Self {
        self.entries = Some(entries);
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_cursor(mut self, name: impl Into<String>, mark_delete: Option<Position>) -> Self {
        self.cursor = Some(name.into());
        self.mark_delete = mark_delete;
        self
    }
}

/// Which topic a ledger belongs to according to its own custom metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerOwner {
    pub topic: TopicRef,
    pub role: LedgerRole,
}

/// Ledger metadata as reported by the storage ensemble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsembleLedger {
    pub ledger_id: u64,
    pub state: LedgerState,
    /// `lastEntryId + 1`; absent while the ledger is still open.
    pub entry_count: Option<u64>,
    pub length: Option<u64>,
    /// Bookies of the most recent ensemble.
    pub ensemble: Vec<String>,
    pub write_quorum: Option<u32>,
    pub ctime: Option<DateTime<Utc>>,
    /// Topic attribution from the ledger's custom metadata.
    pub owner: Option<LedgerOwner>,
    /// Whether the ledger was written by the serving layer at all.
    pub pulsar: bool,
}

/// Retention configured for a topic or namespace.
///
/// `-1` minutes keeps data forever; `0` keeps nothing once acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub retention_time_in_minutes: i64,
    #[serde(default, rename = "retentionSizeInMB")]
    pub retention_size_in_mb: i64,
}

impl RetentionPolicy {
    pub fn minutes(retention_time_in_minutes: i64) -> Self {
        Self {
            retention_time_in_minutes,
            retention_size_in_mb: 0,
        }
    }

    /// Whether data created at `ctime` is past retention at `now`.
    pub fn expired(&self, ctime: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.retention_time_in_minutes {
            -1 => false,
            0 => true,
            minutes => now - ctime > chrono::Duration::minutes(minutes),
        }
    }
}

/// A coordination-store value with its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub data: Vec<u8>,
    pub version: i32,
}
