//! Error types for the room dispatcher.

use std::path::PathBuf;

/// Top-level error type for the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Configuration-related errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse {}: {reason}", path.display())]
    ParseError { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport errors. Recoverable: the poll loop logs and retries.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Channel API returned {status}: {errcode} {message}")]
    Api {
        status: u16,
        errcode: String,
        message: String,
    },

    #[error("Invalid response from channel: {0}")]
    InvalidResponse(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Failed to send message: {0}")]
    SendFailed(String),
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Session registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Session {session_id} not found")]
    NotFound { session_id: String },

    #[error("Session {session_id} already exists")]
    AlreadyExists { session_id: String },

    #[error("Session {session_id} already completed")]
    AlreadyCompleted { session_id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry task is no longer running")]
    Closed,
}

/// Worker launch errors. Only ever observed through a session's terminal state.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Failed to spawn worker {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Worker pool at capacity ({max} sessions)")]
    Rejected { max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the dispatcher.
pub type Result<T> = std::result::Result<T, Error>;
