use std::path::PathBuf;

use thiserror::Error;

pub type TulumResult<T> = Result<T, TulumError>;

#[derive(Debug, Error)]
pub enum TulumError {
    #[error("key file already exists: {}", .0.display())]
    KeyConflict(PathBuf),

    #[error("key file not found: {}", .0.display())]
    KeyNotFound(PathBuf),

    #[error("key file is malformed: {0}")]
    KeyFormat(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("authentication failed: MAC does not match ciphertext")]
    Authentication,

    #[error("malformed envelope: {0}")]
    Format(String),

    #[error("staging error: {0}")]
    Resource(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TulumError {
    /// True for failures caused by the ciphertext itself (tampering or
    /// truncation) rather than by the local environment.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::Authentication | Self::Format(_))
    }
}
