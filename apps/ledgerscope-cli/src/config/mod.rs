//! Configuration management for the ledgerscope CLI
//!
//! Settings are layered, lowest priority first: built-in defaults, the
//! optional `config.json`, environment variables, then command-line flags.

mod paths;
mod settings;

pub use paths::ConfigPaths;
pub use settings::Settings;
