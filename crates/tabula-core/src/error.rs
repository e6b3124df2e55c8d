//! Error types for Tabula core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TabulaError {
    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl TabulaError {
    pub fn schema(msg: impl Into<String>) -> Self {
        TabulaError::SchemaError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        TabulaError::ConfigError(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        TabulaError::ParseError(msg.into())
    }

    /// Parse errors are absorbed by the planner; everything else aborts.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TabulaError::ParseError(_))
    }
}

pub type Result<T> = std::result::Result<T, TabulaError>;

impl From<anyhow::Error> for TabulaError {
    fn from(err: anyhow::Error) -> Self {
        TabulaError::InternalError(err.to_string())
    }
}

impl From<sqlx::Error> for TabulaError {
    fn from(err: sqlx::Error) -> Self {
        TabulaError::ExecutionError(err.to_string())
    }
}
