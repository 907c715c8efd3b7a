//! Error types for the edgeflow engine

use thiserror::Error;

/// Main error type for the edgeflow engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Circular or unresolved dependencies detected in components")]
    CircularDependency,

    #[error("Evaluation error: {0}")]
    EvaluationError(String),

    #[error("Planning error: {0}")]
    PlanningError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("State store error: {0}")]
    StateStoreError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}
