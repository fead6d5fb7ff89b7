//! Binary formats of the managed-ledger and cursor nodes.
//!
//! Only the fields the reconciler reads are declared; unknown fields are
//! skipped on decode and dropped on re-encode, so a rewritten
//! `ManagedLedgerInfo` keeps ledger list and termination marker only.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct ManagedLedgerInfo {
    #[prost(message, repeated, tag = "1")]
    pub ledger_info: Vec<LedgerInfo>,
    #[prost(message, optional, tag = "2")]
    pub terminated_position: Option<NestedPositionInfo>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LedgerInfo {
    #[prost(int64, required, tag = "1")]
    pub ledger_id: i64,
    #[prost(int64, optional, tag = "2")]
    pub entries: Option<i64>,
    #[prost(int64, optional, tag = "3")]
    pub size: Option<i64>,
    #[prost(int64, optional, tag = "4")]
    pub timestamp: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NestedPositionInfo {
    #[prost(int64, required, tag = "1")]
    pub ledger_id: i64,
    #[prost(int64, required, tag = "2")]
    pub entry_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ManagedCursorInfo {
    /// `-1` when the cursor has no ledger of its own.
    #[prost(int64, required, tag = "1")]
    pub cursors_ledger_id: i64,
    #[prost(int64, optional, tag = "2")]
    pub mark_delete_ledger_id: Option<i64>,
    #[prost(int64, optional, tag = "3")]
    pub mark_delete_entry_id: Option<i64>,
}
