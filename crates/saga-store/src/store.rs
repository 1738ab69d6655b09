use async_trait::async_trait;
use common::SagaId;
use serde_json::Value;

use crate::{EventOutcome, Result, SagaEvent, SagaInstance, SagaStatus, SagaStep, SagaStoreError};

/// Core trait for saga store implementations.
///
/// A saga store persists the saga instance record and its append-only event
/// log. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Persists a new saga instance.
    ///
    /// Fails with `AlreadyExists` if a saga with the same id is present.
    async fn create(&self, instance: SagaInstance) -> Result<()>;

    /// Retrieves a saga instance. Returns None if it doesn't exist.
    async fn get(&self, saga_id: SagaId) -> Result<Option<SagaInstance>>;

    /// Moves a saga to a new step and status.
    ///
    /// Rejects moves that [`SagaInstance::can_advance`] refuses with
    /// `InvalidTransition`. Returns the updated instance.
    async fn advance(
        &self,
        saga_id: SagaId,
        step: SagaStep,
        status: SagaStatus,
    ) -> Result<SagaInstance>;

    /// Appends an event to the saga log.
    async fn append_event(&self, event: SagaEvent) -> Result<()>;

    /// Retrieves all events for a saga in append order.
    async fn events(&self, saga_id: SagaId) -> Result<Vec<SagaEvent>>;

    /// Retrieves all sagas currently in `status`, oldest first.
    async fn list_by_status(&self, status: SagaStatus) -> Result<Vec<SagaInstance>>;
}

/// Extension trait providing convenience methods for saga stores.
#[async_trait]
pub trait SagaStoreExt: SagaStore {
    /// Loads a saga, failing with `NotFound` if it is absent.
    async fn load(&self, saga_id: SagaId) -> Result<SagaInstance> {
        self.get(saga_id)
            .await?
            .ok_or(SagaStoreError::NotFound(saga_id))
    }

    /// Appends an event built from its parts.
    async fn record(
        &self,
        saga_id: SagaId,
        step: &str,
        outcome: EventOutcome,
        payload: Value,
    ) -> Result<()> {
        self.append_event(SagaEvent::new(saga_id, step, outcome, payload))
            .await
    }

    /// Retrieves every saga that has not reached a terminal status.
    async fn find_incomplete(&self) -> Result<Vec<SagaInstance>> {
        let mut sagas = self.list_by_status(SagaStatus::Running).await?;
        sagas.extend(self.list_by_status(SagaStatus::Compensating).await?);
        sagas.sort_by_key(|s| s.created_at);
        Ok(sagas)
    }
}

impl<T: SagaStore + ?Sized> SagaStoreExt for T {}

pub(crate) fn check_advance(
    instance: &SagaInstance,
    step: SagaStep,
    status: SagaStatus,
) -> Result<()> {
    if instance.can_advance(step, status) {
        Ok(())
    } else {
        Err(SagaStoreError::InvalidTransition {
            saga_id: instance.saga_id,
            from_step: instance.current_step,
            from_status: instance.status,
            to_step: step,
            to_status: status,
        })
    }
}
