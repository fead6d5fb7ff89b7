//! Where the optional config file lives

use crate::error::{CliError, CliResult};
use std::path::{Path, PathBuf};

const CONFIG_DIR_ENV: &str = "LEDGERSCOPE_CONFIG_DIR";

/// Location of `config.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
}

impl ConfigPaths {
    /// `$LEDGERSCOPE_CONFIG_DIR`, else `ledgerscope/` under the platform
    /// config dir (`~/.config` on Linux, `~/Library/Application Support` on
    /// macOS, `%APPDATA%` on Windows).
    pub fn new() -> CliResult<Self> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return Ok(Self::from_dir(PathBuf::from(dir)));
        }
        dirs::config_dir()
            .map(|base| Self::from_dir(base.join("ledgerscope")))
            .ok_or_else(|| {
                CliError::Config(format!(
                    "no platform config directory; set {CONFIG_DIR_ENV}"
                ))
            })
    }

    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let config_dir = dir.as_ref().to_path_buf();
        let config_file = config_dir.join("config.json");
        Self {
            config_dir,
            config_file,
        }
    }
}
