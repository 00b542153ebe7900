use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{TulumError, TulumResult};

/// Top-level configuration (loaded from tulum.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TulumConfig {
    pub key: KeyConfig,
    pub staging: StagingConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Key file written on encrypt and read on decrypt (default: key.asc)
    pub path: PathBuf,
}

/// Where ciphertext is staged while it is authenticated
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Scratch directory for staging files (default: the OS temp dir)
    pub scratch_dir: Option<PathBuf>,
    /// File name prefix for staging files
    pub prefix: String,
    /// I/O buffer size in bytes for every streaming copy
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("key.asc"),
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            prefix: "tulum-".into(),
            chunk_size: 64 * 1024,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl StagingConfig {
    /// Resolve the scratch directory, falling back to the OS temp dir.
    pub fn resolved_scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl TulumConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> TulumResult<()> {
        if self.staging.chunk_size == 0 {
            return Err(TulumError::Config("staging.chunk_size must be > 0".into()));
        }
        if self.staging.prefix.contains(std::path::is_separator) {
            return Err(TulumError::Config(format!(
                "staging.prefix must not contain a path separator: {:?}",
                self.staging.prefix
            )));
        }
        if !matches!(self.log.format.as_str(), "text" | "json") {
            return Err(TulumError::Config(format!(
                "log.format must be \"text\" or \"json\", got {:?}",
                self.log.format
            )));
        }
        Ok(())
    }
}
