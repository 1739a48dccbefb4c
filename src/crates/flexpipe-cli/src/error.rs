//! Shell error split: warnings keep the session alive, errors end it

use flexpipe_core::ReconfigError;
use thiserror::Error;

/// Errors surfaced by the operator shell
#[derive(Debug, Error)]
pub enum ShellError {
    /// Recoverable misuse — the shell prints it and re-prompts
    #[error("{0}")]
    Warning(String),

    /// Hard reconfiguration failure — the shell stops
    #[error(transparent)]
    Reconfig(#[from] ReconfigError),

    /// Configuration problem
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    pub fn is_warning(&self) -> bool {
        matches!(self, ShellError::Warning(_))
    }
}

/// Result type for shell operations
pub type Result<T> = std::result::Result<T, ShellError>;
