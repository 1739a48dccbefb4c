//! Error types for pipeline reconfiguration

use thiserror::Error;

/// Errors that can occur while planning or executing a reconfiguration
#[derive(Debug, Error)]
pub enum ReconfigError {
    /// Malformed primitive or user intent (unknown action, arity, slot range)
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Flex-name or human-readable name violates the naming format
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Pipeline JSON missing required shape, or contains `action_calls`
    #[error("malformed pipeline: {0}")]
    MalformedPipeline(String),

    /// A table or conditional lacks an expected flex-name tag
    #[error("missing flex-name tag: {0}")]
    MissingTag(String),

    /// Session state machine violation
    #[error("precondition unmet: {0}")]
    PreconditionUnmet(String),

    /// The external compiler failed or produced no artifact
    #[error("compile failed: {0}")]
    CompileFailed(String),

    /// RPC failure surfaced from the transport
    #[error("transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for reconfiguration operations
pub type Result<T> = std::result::Result<T, ReconfigError>;
