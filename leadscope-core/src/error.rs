//! Error types for leadscope-core

use thiserror::Error;

/// Main error type for the leadscope-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// LLM error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Snapshot transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Lead not found
    #[error("lead not found: {0}")]
    LeadNotFound(String),
}

/// Result type alias for leadscope-core
pub type Result<T> = std::result::Result<T, Error>;
