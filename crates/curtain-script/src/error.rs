//! Error types for curtain-script

use curtain_core::ConfigError;
use thiserror::Error;

/// Preset loading error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid preset {name}: {source}")]
    InvalidPreset { name: String, source: ConfigError },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Duplicate preset: {0}")]
    DuplicatePreset(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
