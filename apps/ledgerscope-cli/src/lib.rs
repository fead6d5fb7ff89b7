//! ledgerscope CLI library
//!
//! Exposes the command modules so integration tests can drive a run against
//! in-memory and mocked witnesses. The binary lives in main.rs.

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
