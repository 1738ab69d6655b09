//! Saga error types.

use channel::ChannelError;
use common::{ErrorKind, OrderId, SagaId};
use saga_store::{SagaStep, SagaStoreError};
use thiserror::Error;

/// Why a single forward step failed.
#[derive(Debug, Error)]
pub enum StepError {
    /// The participant rejected the command, or no reply came back in time.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The saga log could not be written around the step.
    #[error("Saga store error: {0}")]
    Store(#[from] SagaStoreError),
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::Channel(err) => err.kind(),
            StepError::Store(_) => ErrorKind::Internal,
        }
    }
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The checkout request failed shape validation. No saga was started.
    #[error("Invalid checkout request: {0}")]
    InvalidRequest(String),

    /// A forward step failed. Compensation has already been attempted.
    #[error("{source}")]
    StepFailed {
        saga_id: SagaId,
        order_id: OrderId,
        step: SagaStep,
        #[source]
        source: StepError,
    },

    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// A direct participant query failed.
    #[error("Participant error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Saga store error: {0}")]
    Store(#[from] SagaStoreError),
}

impl SagaError {
    /// Classifies the failure, looking through to the triggering error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::InvalidRequest(_) => ErrorKind::Invalid,
            SagaError::StepFailed { source, .. } => source.kind(),
            SagaError::NotFound(_) | SagaError::Store(SagaStoreError::NotFound(_)) => {
                ErrorKind::NotFound
            }
            SagaError::Channel(err) => err.kind(),
            SagaError::Store(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
