//! Service error types.

use crate::config::ConfigError;
use statehook_core::CoreError;
use thiserror::Error;

/// Service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("workflow schema not found: {0}")]
    SchemaNotFound(String),

    #[error("entity {id} changed concurrently: expected status '{expected}', found '{actual}'")]
    Conflict {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("workflow schema {id} is bound to {entities} entities")]
    SchemaInUse { id: String, entities: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServiceError {
    /// Returns an error code suitable for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            ServiceError::SchemaNotFound(_) => "SCHEMA_NOT_FOUND",
            ServiceError::Conflict { .. } => "CONFLICT",
            ServiceError::SchemaInUse { .. } => "SCHEMA_IN_USE",
            ServiceError::InvalidRequest(_) => "BAD_REQUEST",
            ServiceError::Core(e) => e.error_code(),
            ServiceError::Config(_) => "CONFIG_ERROR",
            ServiceError::Json(_) => "BAD_REQUEST",
        }
    }

    /// Returns whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict { .. })
    }
}
