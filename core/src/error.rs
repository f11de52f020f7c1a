//! Structured error types for the agent core
//!
//! Type-safe errors for mode dispatch, planning, persistence and the
//! collaborator boundaries, with retryability classification for the
//! background loops.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for agent operations
#[derive(Error, Debug)]
pub enum AgentError {
    // =========================================================================
    // Mode / Dispatch Errors
    // =========================================================================
    /// Mode kind was never registered with the manager
    #[error("mode not registered: {kind}")]
    ModeNotRegistered { kind: String },

    /// An operation needed an active mode and none was set
    #[error("no active mode")]
    NoActiveMode,

    /// A mode's execute step failed
    #[error("mode execution failed: {mode} - {message}")]
    ModeExecution { mode: String, message: String },

    // =========================================================================
    // Planning Errors
    // =========================================================================
    /// Goal id not present in the registry
    #[error("goal not found: {0}")]
    GoalNotFound(String),

    /// Plan id not present in the registry
    #[error("plan not found: {0}")]
    PlanNotFound(String),

    /// A generated plan contained nothing usable
    #[error("plan rejected: {reason}")]
    PlanRejected { reason: String },

    /// An operation needed a current goal and none was set
    #[error("no current goal")]
    NoCurrentGoal,

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    /// State file failed to parse
    #[error("state file corrupted: {path}")]
    StateCorrupted { path: PathBuf },

    /// State write failed (possibly transient IO)
    #[error("state write failed: {path}")]
    StateWriteFailed { path: PathBuf },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Missing required config
    #[error("missing required configuration: {key}")]
    MissingConfig { key: String },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// A game action was dispatched and the world rejected it
    #[error("game action failed: {action} - {message}")]
    GameAction { action: String, message: String },

    /// The game connection could not produce a snapshot
    #[error("snapshot unavailable: {message}")]
    SnapshotUnavailable { message: String },

    /// LLM endpoint unreachable or over capacity
    #[error("llm unavailable: {message}")]
    LlmUnavailable { message: String },

    // =========================================================================
    // External Error Wrappers
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal invariant violation
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AgentError {
    /// Check if error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SnapshotUnavailable { .. } => true,
            Self::LlmUnavailable { .. } => true,
            Self::StateWriteFailed { .. } => true,

            Self::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),

            Self::ModeNotRegistered { .. }
            | Self::NoActiveMode
            | Self::ModeExecution { .. }
            | Self::GoalNotFound(_)
            | Self::PlanNotFound(_)
            | Self::PlanRejected { .. }
            | Self::NoCurrentGoal
            | Self::StateCorrupted { .. }
            | Self::InvalidConfig { .. }
            | Self::MissingConfig { .. }
            | Self::GameAction { .. }
            | Self::Json(_)
            | Self::Internal { .. } => false,
        }
    }

    /// Internal error from any displayable value
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return Self::Io(std::io::Error::new(io_err.kind(), io_err.to_string()));
        }
        Self::Internal {
            message: err.to_string(),
        }
    }
}

/// Result type alias using AgentError
pub type Result<T> = std::result::Result<T, AgentError>;
