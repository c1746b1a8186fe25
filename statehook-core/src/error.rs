//! Core error types.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Lifecycle phase a hook runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// `on_exit` hooks of the source state.
    Exit,
    /// Effects attached to the transition itself.
    Transition,
    /// `on_enter` hooks of the target state.
    Enter,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookPhase::Exit => "exit",
            HookPhase::Transition => "transition",
            HookPhase::Enter => "enter",
        };
        f.write_str(s)
    }
}

/// Errors from the state machine engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no workflow definition provided")]
    NoDefinition,

    #[error(
        "{phase} hook '{action}' failed during '{event}' ({from} -> {to}, committed: {committed}): {source}"
    )]
    HookFailed {
        phase: HookPhase,
        action: String,
        from: String,
        to: String,
        event: String,
        /// Whether `current_state` already points at `to`.
        committed: bool,
        #[source]
        source: ActionError,
    },

    #[error("invalid schema: {reason}")]
    InvalidSchema { reason: String },

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CoreError {
    /// Returns an error code suitable for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::NoDefinition => "NO_DEFINITION",
            CoreError::HookFailed { .. } => "HOOK_FAILED",
            CoreError::InvalidSchema { .. } => "BAD_REQUEST",
            CoreError::Io { .. } => "IO_ERROR",
            CoreError::Json(_) => "BAD_REQUEST",
            CoreError::Yaml(_) => "BAD_REQUEST",
        }
    }

    /// Returns true if the failure happened after the state was committed.
    pub fn is_committed(&self) -> bool {
        matches!(self, CoreError::HookFailed { committed: true, .. })
    }
}

/// Errors raised by action handlers and hooks.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid params for action '{action}': {reason}")]
    InvalidParams { action: String, reason: String },

    #[error("{0}")]
    Failed(String),

    #[error("action task panicked: {0}")]
    Panicked(String),
}

impl ActionError {
    pub fn failed(reason: impl Into<String>) -> Self {
        ActionError::Failed(reason.into())
    }
}
