//! Error types for trimming sessions and adapter auto-detection

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrimError {
    /// The trim engine still failed after its single retry
    #[error("atropos {command} failed with status {status}: {diagnostics}")]
    EngineFailure {
        command: String,
        status: i32,
        diagnostics: String,
    },

    /// Invalid combination of inputs, detected before any engine call
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The downsampling tool could not be run or exited non-zero
    #[error("subsampling with {program} failed: {diagnostics}")]
    Subsample { program: String, diagnostics: String },

    /// The engine report could not be interpreted
    #[error("malformed engine report: {0}")]
    Report(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrimError>;
