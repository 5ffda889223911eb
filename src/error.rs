//! Error types for the relay.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fixed responses error: {0}")]
    Responses(#[from] ResponsesError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
///
/// These are the only errors that stop the process: they are evaluated once
/// at startup, before the relay loop exists.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from loading the fixed-responses corpus.
#[derive(Debug, thiserror::Error)]
pub enum ResponsesError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a JSON object of string keys to string replies: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Generative-collaborator errors.
///
/// The resolver absorbs all of these into the static fallback reply; they
/// never reach the supervisor.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Generation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Generation command exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
