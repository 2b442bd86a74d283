//! Error types for the execution engine.

use thiserror::Error;

/// Errors that can occur while starting, running or talking to a session.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Pseudo-terminal (or pipe) creation failed.
    #[error("Failed to allocate terminal: {0}")]
    Allocation(String),

    /// The program or shell could not be started.
    #[error("Failed to start '{command}': {reason}")]
    Launch { command: String, reason: String },

    /// Unexpected read/write failure during an active session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller misuse, e.g. input for a session that is not interactive.
    #[error("{0}")]
    Precondition(String),
}

impl EngineError {
    pub(crate) fn launch(command: &str, reason: impl ToString) -> Self {
        EngineError::Launch {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        EngineError::Precondition(message.into())
    }

    /// Short machine-readable tag, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Allocation(_) => "allocation",
            EngineError::Launch { .. } => "launch",
            EngineError::Io(_) => "io",
            EngineError::Precondition(_) => "precondition",
        }
    }
}
