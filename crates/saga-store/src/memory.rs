use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::SagaId;
use tokio::sync::RwLock;

use crate::store::{SagaStore, check_advance};
use crate::{Result, SagaEvent, SagaInstance, SagaStatus, SagaStep, SagaStoreError};

/// In-memory saga store for tests and single-process runs.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    sagas: Arc<RwLock<HashMap<SagaId, SagaInstance>>>,
    events: Arc<RwLock<Vec<SagaEvent>>>,
    unavailable: Arc<AtomicBool>,
    reject_compensating: Arc<AtomicBool>,
    fail_once: Arc<Mutex<Option<(SagaStep, SagaStatus)>>>,
}

impl InMemorySagaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail as if storage were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes moves into `COMPENSATING` fail while the event log keeps working.
    pub fn set_reject_compensating(&self, reject: bool) {
        self.reject_compensating.store(reject, Ordering::SeqCst);
    }

    /// Makes the next move to exactly `step`/`status` fail once.
    pub fn fail_next_advance(&self, step: SagaStep, status: SagaStatus) {
        *self.fail_once.lock().unwrap() = Some((step, status));
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Inserts or replaces a saga as-is, bypassing transition checks.
    ///
    /// Used to stage a saga left behind by a crashed worker.
    pub async fn put(&self, instance: SagaInstance) {
        self.sagas.write().await.insert(instance.saga_id, instance);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SagaStoreError::Unavailable(
                "in-memory saga store disabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn create(&self, instance: SagaInstance) -> Result<()> {
        self.check_available()?;
        let mut sagas = self.sagas.write().await;
        if sagas.contains_key(&instance.saga_id) {
            return Err(SagaStoreError::AlreadyExists(instance.saga_id));
        }
        sagas.insert(instance.saga_id, instance);
        Ok(())
    }

    async fn get(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        self.check_available()?;
        Ok(self.sagas.read().await.get(&saga_id).cloned())
    }

    async fn advance(
        &self,
        saga_id: SagaId,
        step: SagaStep,
        status: SagaStatus,
    ) -> Result<SagaInstance> {
        self.check_available()?;
        if status == SagaStatus::Compensating && self.reject_compensating.load(Ordering::SeqCst) {
            return Err(SagaStoreError::Unavailable(
                "compensating writes disabled".to_string(),
            ));
        }
        {
            let mut fail_once = self.fail_once.lock().unwrap();
            if *fail_once == Some((step, status)) {
                *fail_once = None;
                return Err(SagaStoreError::Unavailable(format!(
                    "advance to {step}/{status} dropped"
                )));
            }
        }

        let mut sagas = self.sagas.write().await;
        let instance = sagas
            .get_mut(&saga_id)
            .ok_or(SagaStoreError::NotFound(saga_id))?;
        check_advance(instance, step, status)?;

        instance.current_step = step;
        instance.status = status;
        instance.updated_at = Utc::now();
        Ok(instance.clone())
    }

    async fn append_event(&self, event: SagaEvent) -> Result<()> {
        self.check_available()?;
        self.events.write().await.push(event);
        Ok(())
    }

    async fn events(&self, saga_id: SagaId) -> Result<Vec<SagaEvent>> {
        self.check_available()?;
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.saga_id == saga_id)
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, status: SagaStatus) -> Result<Vec<SagaInstance>> {
        self.check_available()?;
        let mut sagas: Vec<SagaInstance> = self
            .sagas
            .read()
            .await
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        sagas.sort_by_key(|s| s.created_at);
        Ok(sagas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventOutcome, SagaStoreExt};
    use common::OrderId;

    fn started() -> SagaInstance {
        SagaInstance::start(SagaId::new(), OrderId::new(), Utc::now())
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let store = InMemorySagaStore::new();
        let saga = started();
        store.create(saga.clone()).await.unwrap();

        assert_eq!(store.load(saga.saga_id).await.unwrap(), saga);
        assert!(matches!(
            store.create(saga.clone()).await,
            Err(SagaStoreError::AlreadyExists(_))
        ));
        assert!(matches!(
            store.load(SagaId::new()).await,
            Err(SagaStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_advance_through_success_path() {
        let store = InMemorySagaStore::new();
        let saga = started();
        store.create(saga.clone()).await.unwrap();

        for step in SagaStep::FORWARD {
            store
                .advance(saga.saga_id, step, SagaStatus::Running)
                .await
                .unwrap();
        }
        let done = store
            .advance(saga.saga_id, SagaStep::Completed, SagaStatus::Done)
            .await
            .unwrap();

        assert_eq!(done.current_step, SagaStep::Completed);
        assert_eq!(done.status, SagaStatus::Done);
    }

    #[tokio::test]
    async fn test_advance_rejects_backward_move() {
        let store = InMemorySagaStore::new();
        let saga = started();
        store.create(saga.clone()).await.unwrap();
        store
            .advance(saga.saga_id, SagaStep::PaymentProcessed, SagaStatus::Running)
            .await
            .unwrap();

        let result = store
            .advance(saga.saga_id, SagaStep::InventoryReserved, SagaStatus::Running)
            .await;

        assert!(matches!(
            result,
            Err(SagaStoreError::InvalidTransition {
                from_step: SagaStep::PaymentProcessed,
                to_step: SagaStep::InventoryReserved,
                ..
            })
        ));
        let current = store.load(saga.saga_id).await.unwrap();
        assert_eq!(current.current_step, SagaStep::PaymentProcessed);
    }

    #[tokio::test]
    async fn test_events_in_append_order() {
        let store = InMemorySagaStore::new();
        let saga = started();
        let other = started();
        store.create(saga.clone()).await.unwrap();
        store.create(other.clone()).await.unwrap();

        store
            .record(saga.saga_id, "ORDER_CREATED", EventOutcome::Started, serde_json::json!({}))
            .await
            .unwrap();
        store
            .record(other.saga_id, "ORDER_CREATED", EventOutcome::Started, serde_json::json!({}))
            .await
            .unwrap();
        store
            .record(
                saga.saga_id,
                "ORDER_CREATED",
                EventOutcome::Failed,
                serde_json::json!({"error": "boom"}),
            )
            .await
            .unwrap();

        let events = store.events(saga.saga_id).await.unwrap();
        let outcomes: Vec<_> = events.iter().map(|e| e.outcome).collect();
        assert_eq!(outcomes, vec![EventOutcome::Started, EventOutcome::Failed]);
        assert_eq!(events[1].payload["error"], "boom");
        assert_eq!(store.event_count().await, 3);
    }

    #[tokio::test]
    async fn test_find_incomplete_skips_terminal() {
        let store = InMemorySagaStore::new();
        let running = started();
        let compensating = started();
        let done = started();
        for saga in [&running, &compensating, &done] {
            store.create(saga.clone()).await.unwrap();
        }
        store
            .advance(compensating.saga_id, SagaStep::OrderCreated, SagaStatus::Compensating)
            .await
            .unwrap();
        store
            .advance(done.saga_id, SagaStep::Completed, SagaStatus::Done)
            .await
            .unwrap();

        let ids: Vec<_> = store
            .find_incomplete()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.saga_id)
            .collect();

        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&running.saga_id));
        assert!(ids.contains(&compensating.saga_id));
    }

    #[tokio::test]
    async fn test_unavailable_and_rejected_compensation() {
        let store = InMemorySagaStore::new();
        let saga = started();
        store.create(saga.clone()).await.unwrap();

        store.set_reject_compensating(true);
        assert!(matches!(
            store
                .advance(saga.saga_id, SagaStep::OrderCreated, SagaStatus::Compensating)
                .await,
            Err(SagaStoreError::Unavailable(_))
        ));
        store
            .record(saga.saga_id, "COMPENSATION", EventOutcome::Failed, serde_json::json!({}))
            .await
            .unwrap();

        store.set_unavailable(true);
        assert!(matches!(
            store.get(saga.saga_id).await,
            Err(SagaStoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_next_advance_fires_once() {
        let store = InMemorySagaStore::new();
        let saga = started();
        store.create(saga.clone()).await.unwrap();

        store.fail_next_advance(SagaStep::InventoryReserved, SagaStatus::Running);
        assert!(matches!(
            store
                .advance(saga.saga_id, SagaStep::InventoryReserved, SagaStatus::Running)
                .await,
            Err(SagaStoreError::Unavailable(_))
        ));

        let moved = store
            .advance(saga.saga_id, SagaStep::InventoryReserved, SagaStatus::Running)
            .await
            .unwrap();
        assert_eq!(moved.current_step, SagaStep::InventoryReserved);
    }
}
