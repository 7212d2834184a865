//! Error handling for the saga orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Main error type for the saga orchestrator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("{service} rejected pending data: {message}")]
    VerificationRejected { service: String, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("workflow failed and compensation also failed: execution error: {original}; compensation error: {compensation}")]
    Compensation {
        original: Box<OrchestratorError>,
        compensation: Box<OrchestratorError>,
    },

    #[error("workflow host error: {0}")]
    Host(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl OrchestratorError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Transport(_) | OrchestratorError::Timeout(_)
        )
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            OrchestratorError::Transport(_) => "transport",
            OrchestratorError::Encoding(_) => "encoding",
            OrchestratorError::VerificationRejected { .. } => "verification",
            OrchestratorError::Timeout(_) => "timeout",
            OrchestratorError::Cancelled(_) => "cancelled",
            OrchestratorError::Compensation { .. } => "compensation",
            OrchestratorError::Host(_) => "host",
            OrchestratorError::NotFound(_) => "not_found",
            OrchestratorError::Conflict(_) => "conflict",
            OrchestratorError::Config(_) => "config",
        }
    }

    /// The phase error that triggered compensation, if this is a combined error
    pub fn original(&self) -> &OrchestratorError {
        match self {
            OrchestratorError::Compensation { original, .. } => original,
            other => other,
        }
    }
}
