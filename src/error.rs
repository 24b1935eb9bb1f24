//! Error types for jobtrack

use thiserror::Error;

/// Result type for jobtrack operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Jobtrack error types
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("GitHub error: {0}")]
    GitHub(String),

    #[error("Airtable error: {0}")]
    Airtable(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Invalid LLM output: {0}")]
    LlmOutput(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Stack error: {0}")]
    Stack(String),

    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
