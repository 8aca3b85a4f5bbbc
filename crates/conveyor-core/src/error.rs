//! Conveyor error type.
//!
//! One enum for the whole workspace, mapped onto the pipeline's error
//! taxonomy: configuration errors are fatal to the current call and never
//! retried; execution errors abort the call but not the pipeline;
//! validation and routing errors are collected at element/connection
//! granularity by the router rather than surfaced through this type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConveyorError>;

#[derive(Error, Debug)]
pub enum ConveyorError {
    /// Missing or malformed configuration (assistant config file,
    /// function implementation, profile settings).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A named function has no persisted implementation.
    #[error("No implementation found for function: {0}")]
    FunctionNotImplemented(String),

    /// External process or inline handler failed (non-zero exit,
    /// unusable output).
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Data did not conform to its declared schema.
    #[error("Validation failed for schema {schema_id}: {}", errors.join("; "))]
    Validation {
        schema_id: String,
        errors: Vec<String>,
    },

    /// A port or connection referenced something that does not exist.
    #[error("Routing error: {0}")]
    Routing(String),

    /// Schema id referenced by a port or instance is unknown.
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    /// Scheduled event could not be executed or persisted.
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    /// Remote assistant API failure.
    #[error("Assistant API error: {0}")]
    Assistant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConveyorError {
    /// Whether this error belongs to the configuration class (fatal to
    /// the current call, surfaced to the user, never retried).
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ConveyorError::Config(_) | ConveyorError::FunctionNotImplemented(_)
        )
    }
}
