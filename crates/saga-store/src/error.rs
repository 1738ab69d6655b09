use common::SagaId;
use thiserror::Error;

use crate::{SagaStatus, SagaStep};

/// Errors that can occur when interacting with the saga store.
#[derive(Debug, Error)]
pub enum SagaStoreError {
    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    #[error("Saga already exists: {0}")]
    AlreadyExists(SagaId),

    /// The requested move would take the saga backwards or out of a terminal state.
    #[error("Invalid saga transition for {saga_id}: {from_step}/{from_status} -> {to_step}/{to_status}")]
    InvalidTransition {
        saga_id: SagaId,
        from_step: SagaStep,
        from_status: SagaStatus,
        to_step: SagaStep,
        to_status: SagaStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Saga store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for saga store operations.
pub type Result<T> = std::result::Result<T, SagaStoreError>;
