//! Domain-level error taxonomy for the V&V pipeline.

use std::path::PathBuf;

/// V&V domain errors.
#[derive(Debug, thiserror::Error)]
pub enum VandvError {
    #[error("invalid validation case: {0}")]
    InvalidCase(String),

    #[error("invalid configuration name: {0:?}")]
    InvalidConfigurationName(String),

    #[error("invalid author name: {0:?}")]
    InvalidAuthor(String),

    #[error("invalid configuration pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("invalid option override {0:?} (expected KEY=VALUE)")]
    InvalidOverride(String),

    #[error("config option {key} not present in {}", file.display())]
    UnknownConfigOption { key: String, file: PathBuf },

    #[error("settings error: {0}")]
    Settings(String),

    #[error("git error: {0}")]
    GitError(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for V&V domain operations.
pub type Result<T> = std::result::Result<T, VandvError>;
