//! Checkout saga orchestrator.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use channel::CommandChannel;
use chrono::Utc;
use common::{CreateOrderCommand, ErrorKind, OrderId, OrderView, SagaId};
use saga_store::{
    EventOutcome, SagaEvent, SagaInstance, SagaStatus, SagaStep, SagaStore, SagaStoreError,
    SagaStoreExt,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::checkout::{Checkout, CheckoutRequest, CheckoutResponse};
use crate::clients::{InventoryClient, OrderClient, PaymentClient};
use crate::error::{Result, SagaError, StepError};
use crate::plan::{self, COMPENSATION, CompensationAction};

/// Where compensation starts from.
#[derive(Debug, Clone, Copy)]
enum Resume {
    /// A forward step just failed in this process.
    AfterFailure,
    /// The saga was left unfinished by a worker that is gone.
    Recovery,
}

/// Outcome of a recovery sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    pub recovered: Vec<SagaId>,
    pub failed: Vec<SagaId>,
}

/// Drives checkout sagas across the order, inventory and payment participants.
///
/// The orchestrator keeps no saga progress in memory. Each decision is read
/// back from the saga store, so a saga started here can be finished by any
/// other instance.
#[derive(Clone)]
pub struct SagaOrchestrator {
    store: Arc<dyn SagaStore>,
    orders: OrderClient,
    inventory: InventoryClient,
    payments: PaymentClient,
}

impl SagaOrchestrator {
    pub fn new(channel: Arc<dyn CommandChannel>, store: Arc<dyn SagaStore>) -> Self {
        Self {
            store,
            orders: OrderClient::new(channel.clone()),
            inventory: InventoryClient::new(channel.clone()),
            payments: PaymentClient::new(channel),
        }
    }

    /// Runs a checkout to completion or compensation.
    ///
    /// On failure the error of the step that failed is returned after
    /// compensation has been attempted, whatever the compensation outcome.
    #[tracing::instrument(skip(self, request), fields(saga_id, order_id))]
    pub async fn execute_checkout(&self, request: CheckoutRequest) -> Result<CheckoutResponse> {
        let checkout = request.validate()?;

        let saga_id = SagaId::new();
        let order_id = OrderId::new();
        let span = tracing::Span::current();
        span.record("saga_id", tracing::field::display(saga_id));
        span.record("order_id", tracing::field::display(order_id));

        self.store
            .create(SagaInstance::start(saga_id, order_id, Utc::now()))
            .await?;
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();
        info!(total = %checkout.total_amount, items = checkout.lines.len(), "Saga started");

        let result = match self.run_forward(saga_id, order_id, &checkout).await {
            Ok(()) => {
                metrics::counter!("saga_completed_total").increment(1);
                info!("Saga completed");
                Ok(CheckoutResponse::placed(order_id, checkout.total_amount))
            }
            Err((step, source)) => {
                warn!(step = step.as_str(), error = %source, "Saga step failed, compensating");
                self.compensate(saga_id).await;
                Err(SagaError::StepFailed {
                    saga_id,
                    order_id,
                    step,
                    source,
                })
            }
        };

        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
        result
    }

    async fn run_forward(
        &self,
        saga_id: SagaId,
        order_id: OrderId,
        checkout: &Checkout,
    ) -> std::result::Result<(), (SagaStep, StepError)> {
        let create = CreateOrderCommand {
            order_id,
            user_id: checkout.user_id,
            items: checkout.lines.clone(),
            total_amount: checkout.total_amount,
        };
        self.execute_step(saga_id, SagaStep::OrderCreated, || self.orders.create(&create))
            .await?;

        let lines = checkout.reservation_lines();
        self.execute_step(saga_id, SagaStep::InventoryReserved, || {
            self.inventory.reserve(order_id, lines)
        })
        .await?;

        self.execute_step(saga_id, SagaStep::PaymentProcessed, || {
            self.payments.process(order_id, checkout.total_amount)
        })
        .await?;

        self.execute_step(saga_id, SagaStep::OrderConfirmed, || {
            self.orders.confirm(order_id)
        })
        .await?;

        self.store
            .advance(saga_id, SagaStep::Completed, SagaStatus::Done)
            .await
            .map_err(|e| (SagaStep::Completed, e.into()))?;
        Ok(())
    }

    /// Runs one forward step and records it in the saga log.
    ///
    /// `STARTED` is durable before the participant is called, and
    /// `current_step` only moves once `COMPLETED` is durable.
    async fn execute_step<T, F, Fut>(
        &self,
        saga_id: SagaId,
        step: SagaStep,
        action: F,
    ) -> std::result::Result<T, (SagaStep, StepError)>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = channel::Result<T>>,
    {
        let fail = |e: StepError| (step, e);

        self.store
            .record(saga_id, step.as_str(), EventOutcome::Started, json!({}))
            .await
            .map_err(|e| fail(e.into()))?;

        match action().await {
            Ok(result) => {
                if let Err(err) = self.persist_completion(saga_id, step, &result).await {
                    metrics::counter!("saga_step_failures_total", "step" => step.as_str())
                        .increment(1);
                    // The participant already applied the step.
                    let payload = json!({
                        "error": err.to_string(),
                        "kind": ErrorKind::Internal,
                        "applied": true,
                    });
                    self.record_failure(saga_id, step, payload).await;
                    return Err(fail(err.into()));
                }
                info!(step = step.as_str(), "Saga step completed");
                Ok(result)
            }
            Err(err) => {
                metrics::counter!("saga_step_failures_total", "step" => step.as_str())
                    .increment(1);
                let payload = json!({ "error": err.to_string(), "kind": err.kind() });
                self.record_failure(saga_id, step, payload).await;
                Err(fail(err.into()))
            }
        }
    }

    async fn persist_completion<T: Serialize>(
        &self,
        saga_id: SagaId,
        step: SagaStep,
        result: &T,
    ) -> std::result::Result<(), SagaStoreError> {
        let payload = json!({ "result": result });
        self.store
            .record(saga_id, step.as_str(), EventOutcome::Completed, payload)
            .await?;
        self.store
            .advance(saga_id, step, SagaStatus::Running)
            .await?;
        Ok(())
    }

    async fn record_failure(&self, saga_id: SagaId, step: SagaStep, payload: serde_json::Value) {
        if let Err(log_err) = self
            .store
            .record(saga_id, step.as_str(), EventOutcome::Failed, payload)
            .await
        {
            error!(%saga_id, step = step.as_str(), error = %log_err, "Failed to record saga failure");
        }
    }

    /// Compensates a saga whose forward step just failed.
    ///
    /// Never fails: a breakdown of the compensation process is logged under
    /// `COMPENSATION` and left for recovery.
    async fn compensate(&self, saga_id: SagaId) {
        if let Err(err) = self.run_compensation(saga_id, Resume::AfterFailure).await {
            self.compensation_broke(saga_id, &err).await;
        }
    }

    async fn compensation_broke(&self, saga_id: SagaId, err: &SagaStoreError) {
        metrics::counter!("saga_compensation_failures_total", "action" => COMPENSATION)
            .increment(1);
        error!(%saga_id, error = %err, "Compensation process failed");
        if let Err(log_err) = self
            .store
            .record(
                saga_id,
                COMPENSATION,
                EventOutcome::Failed,
                json!({ "error": err.to_string(), "kind": ErrorKind::CompensationFailure }),
            )
            .await
        {
            error!(%saga_id, error = %log_err, "Failed to record compensation failure");
        }
    }

    #[tracing::instrument(skip(self))]
    async fn run_compensation(
        &self,
        saga_id: SagaId,
        resume: Resume,
    ) -> std::result::Result<(), SagaStoreError> {
        let saga = self.store.load(saga_id).await?;
        let reached = match resume {
            Resume::AfterFailure => {
                let events = self.store.events(saga_id).await?;
                plan::step_at_failure(&saga, &events)
            }
            Resume::Recovery => plan::step_for_recovery(&saga),
        };

        self.store
            .advance(saga_id, saga.current_step, SagaStatus::Compensating)
            .await?;

        for action in plan::compensation_plan(reached) {
            let outcome = match action {
                CompensationAction::RefundPayment => self.payments.refund(saga.order_id).await,
                CompensationAction::ReleaseInventory => {
                    self.inventory.release(saga.order_id).await
                }
                CompensationAction::CancelOrder => self.orders.cancel(saga.order_id).await,
            };

            match outcome {
                Ok(_) => {
                    self.store
                        .record(saga_id, action.as_str(), EventOutcome::Completed, json!({}))
                        .await?;
                    info!(action = action.as_str(), "Compensation completed");
                }
                Err(err) => {
                    metrics::counter!("saga_compensation_failures_total", "action" => action.as_str())
                        .increment(1);
                    warn!(action = action.as_str(), error = %err, "Compensation failed");
                    self.store
                        .record(
                            saga_id,
                            action.as_str(),
                            EventOutcome::Failed,
                            json!({ "error": err.to_string(), "kind": err.kind() }),
                        )
                        .await?;
                }
            }
        }

        self.store
            .advance(saga_id, SagaStep::Compensated, SagaStatus::Compensated)
            .await?;
        metrics::counter!("saga_compensated_total").increment(1);
        info!(from = reached.as_str(), "Saga compensated");
        Ok(())
    }

    /// Finishes a saga left `RUNNING` or `COMPENSATING` by a worker that is gone.
    ///
    /// The saga is compensated as if the step after its persisted position had
    /// completed. Terminal sagas are returned untouched.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self, saga_id: SagaId) -> Result<SagaInstance> {
        let saga = self.store.load(saga_id).await?;
        if saga.status.is_terminal() {
            return Ok(saga);
        }

        info!(
            step = saga.current_step.as_str(),
            status = saga.status.as_str(),
            "Recovering saga"
        );
        if let Err(err) = self.run_compensation(saga_id, Resume::Recovery).await {
            self.compensation_broke(saga_id, &err).await;
            return Err(err.into());
        }
        Ok(self.store.load(saga_id).await?)
    }

    /// Recovers every saga that has not reached a terminal status.
    ///
    /// Must only run while no other worker is driving those sagas, e.g. at startup.
    pub async fn recover_incomplete(&self) -> Result<RecoverySummary> {
        let mut summary = RecoverySummary::default();
        for saga in self.store.find_incomplete().await? {
            match self.recover(saga.saga_id).await {
                Ok(_) => summary.recovered.push(saga.saga_id),
                Err(err) => {
                    error!(saga_id = %saga.saga_id, error = %err, "Saga recovery failed");
                    summary.failed.push(saga.saga_id);
                }
            }
        }
        if !summary.recovered.is_empty() || !summary.failed.is_empty() {
            info!(
                recovered = summary.recovered.len(),
                failed = summary.failed.len(),
                "Recovery sweep finished"
            );
        }
        Ok(summary)
    }

    /// Loads a saga instance.
    pub async fn get_saga(&self, saga_id: SagaId) -> Result<SagaInstance> {
        self.store
            .get(saga_id)
            .await?
            .ok_or(SagaError::NotFound(saga_id))
    }

    /// Returns the saga log in append order.
    pub async fn saga_events(&self, saga_id: SagaId) -> Result<Vec<SagaEvent>> {
        Ok(self.store.events(saga_id).await?)
    }

    /// Looks an order up through the order participant.
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderView> {
        Ok(self.orders.get(order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use channel::ChannelError;
    use common::{Money, Participant, ParticipantError, PaymentId, PaymentStatus, ProductId};
    use rust_decimal::Decimal;
    use saga_store::InMemorySagaStore;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::checkout::CheckoutItem;

    /// Answers every command with a plausible reply unless told otherwise.
    #[derive(Default)]
    struct ScriptedChannel {
        calls: Mutex<Vec<String>>,
        rejections: Mutex<HashMap<String, ParticipantError>>,
        timeouts: Mutex<Vec<String>>,
        payment_status: Mutex<Option<PaymentStatus>>,
    }

    impl ScriptedChannel {
        fn reject(&self, command: &str, err: ParticipantError) {
            self.rejections
                .lock()
                .unwrap()
                .insert(command.to_string(), err);
        }

        fn time_out(&self, command: &str) {
            self.timeouts.lock().unwrap().push(command.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandChannel for ScriptedChannel {
        async fn send(
            &self,
            participant: Participant,
            command: &str,
            payload: serde_json::Value,
        ) -> channel::Result<serde_json::Value> {
            self.calls.lock().unwrap().push(command.to_string());

            if let Some(source) = self.rejections.lock().unwrap().get(command).cloned() {
                return Err(ChannelError::Rejected {
                    participant,
                    command: command.to_string(),
                    source,
                });
            }
            if self.timeouts.lock().unwrap().iter().any(|c| c == command) {
                return Err(ChannelError::Timeout {
                    participant,
                    command: command.to_string(),
                    timeout: Duration::from_millis(10),
                });
            }

            let now = Utc::now();
            Ok(match command {
                "order.create" => json!({
                    "id": payload["orderId"],
                    "totalAmount": payload["totalAmount"],
                    "status": "PENDING",
                    "sagaState": "ORDER_CREATED",
                    "items": payload["items"],
                    "createdAt": now,
                    "updatedAt": now,
                }),
                "inventory.reserve" => json!([]),
                "payment.process" => {
                    let status = self.payment_status.lock().unwrap().unwrap_or(PaymentStatus::Success);
                    json!({
                        "id": PaymentId::new(),
                        "orderId": payload["orderId"],
                        "amount": payload["amount"],
                        "status": status,
                        "transactionDate": now,
                    })
                }
                _ => json!({ "success": true }),
            })
        }
    }

    fn setup() -> (SagaOrchestrator, Arc<ScriptedChannel>, InMemorySagaStore) {
        let channel = Arc::new(ScriptedChannel::default());
        let store = InMemorySagaStore::new();
        let orchestrator = SagaOrchestrator::new(channel.clone(), Arc::new(store.clone()));
        (orchestrator, channel, store)
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            user_id: None,
            items: vec![CheckoutItem {
                product_id: ProductId::new(),
                quantity: 2,
                price: Decimal::new(1999, 2),
            }],
        }
    }

    fn step_failed(err: SagaError) -> (SagaId, SagaStep) {
        match err {
            SagaError::StepFailed { saga_id, step, .. } => (saga_id, step),
            other => panic!("expected StepFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_happy_path() {
        let (orchestrator, channel, store) = setup();

        let response = orchestrator.execute_checkout(request()).await.unwrap();

        assert!(response.success);
        assert_eq!(response.total_amount, Money::from_cents(3998));
        assert_eq!(
            channel.calls(),
            vec!["order.create", "inventory.reserve", "payment.process", "order.confirm"]
        );
        let saga = store.list_by_status(SagaStatus::Done).await.unwrap();
        assert_eq!(saga.len(), 1);
        assert_eq!(saga[0].order_id, response.order_id);
        assert_eq!(saga[0].current_step, SagaStep::Completed);
    }

    #[tokio::test]
    async fn test_order_failure_cancels_only() {
        let (orchestrator, channel, store) = setup();
        channel.reject("order.create", ParticipantError::internal("db down"));

        let err = orchestrator.execute_checkout(request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        let (saga_id, step) = step_failed(err);

        assert_eq!(step, SagaStep::OrderCreated);
        assert_eq!(channel.calls(), vec!["order.create", "order.cancel"]);
        let saga = store.load(saga_id).await.unwrap();
        assert_eq!(saga.status, SagaStatus::Compensated);
    }

    #[tokio::test]
    async fn test_payment_decline_releases_and_cancels() {
        let (orchestrator, channel, _store) = setup();
        channel.reject(
            "payment.process",
            ParticipantError::PaymentDeclined {
                order_id: OrderId::new(),
                reason: "card declined".to_string(),
            },
        );

        let err = orchestrator.execute_checkout(request()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PaymentDeclined);
        assert_eq!(step_failed(err).1, SagaStep::PaymentProcessed);
        assert_eq!(
            channel.calls(),
            vec![
                "order.create",
                "inventory.reserve",
                "payment.process",
                "inventory.release",
                "order.cancel"
            ]
        );
    }

    #[tokio::test]
    async fn test_confirm_failure_refunds_everything() {
        let (orchestrator, channel, _store) = setup();
        channel.reject("order.confirm", ParticipantError::internal("boom"));

        orchestrator.execute_checkout(request()).await.unwrap_err();

        assert_eq!(
            &channel.calls()[4..],
            &["payment.refund", "inventory.release", "order.cancel"]
        );
    }

    #[tokio::test]
    async fn test_payment_timeout_also_refunds() {
        let (orchestrator, channel, _store) = setup();
        channel.time_out("payment.process");

        let err = orchestrator.execute_checkout(request()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(
            &channel.calls()[3..],
            &["payment.refund", "inventory.release", "order.cancel"]
        );
    }

    #[tokio::test]
    async fn test_pending_payment_is_a_failure() {
        let (orchestrator, channel, _store) = setup();
        *channel.payment_status.lock().unwrap() = Some(PaymentStatus::Pending);

        let err = orchestrator.execute_checkout(request()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PaymentDeclined);
        assert!(!channel.calls().contains(&"order.confirm".to_string()));
    }

    #[tokio::test]
    async fn test_compensation_action_failure_does_not_stop_others() {
        let (orchestrator, channel, store) = setup();
        channel.reject("order.confirm", ParticipantError::internal("boom"));
        channel.reject("payment.refund", ParticipantError::internal("gateway down"));

        let err = orchestrator.execute_checkout(request()).await.unwrap_err();
        let (saga_id, _) = step_failed(err);

        let events = store.events(saga_id).await.unwrap();
        let refund = events.iter().find(|e| e.step == "REFUND_PAYMENT").unwrap();
        assert_eq!(refund.outcome, EventOutcome::Failed);
        assert!(events
            .iter()
            .any(|e| e.step == "CANCEL_ORDER" && e.outcome == EventOutcome::Completed));
        assert_eq!(
            store.load(saga_id).await.unwrap().status,
            SagaStatus::Compensated
        );
    }

    #[tokio::test]
    async fn test_invalid_request_starts_nothing() {
        let (orchestrator, channel, store) = setup();
        let mut bad = request();
        bad.items.clear();

        let err = orchestrator.execute_checkout(bad).await.unwrap_err();

        assert!(matches!(err, SagaError::InvalidRequest(_)));
        assert!(channel.calls().is_empty());
        assert!(store.find_incomplete().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recover_running_saga() {
        let (orchestrator, channel, store) = setup();
        let mut saga = SagaInstance::start(SagaId::new(), OrderId::new(), Utc::now());
        saga.current_step = SagaStep::InventoryReserved;
        store.put(saga.clone()).await;

        let recovered = orchestrator.recover(saga.saga_id).await.unwrap();

        assert_eq!(recovered.status, SagaStatus::Compensated);
        assert_eq!(
            channel.calls(),
            vec!["payment.refund", "inventory.release", "order.cancel"]
        );

        // Terminal sagas are left alone.
        orchestrator.recover(saga.saga_id).await.unwrap();
        assert_eq!(channel.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_recover_incomplete_sweeps_only_unfinished() {
        let (orchestrator, _channel, store) = setup();
        let running = SagaInstance::start(SagaId::new(), OrderId::new(), Utc::now());
        let mut done = SagaInstance::start(SagaId::new(), OrderId::new(), Utc::now());
        done.current_step = SagaStep::Completed;
        done.status = SagaStatus::Done;
        store.put(running.clone()).await;
        store.put(done).await;

        let summary = orchestrator.recover_incomplete().await.unwrap();

        assert_eq!(summary.recovered, vec![running.saga_id]);
        assert!(summary.failed.is_empty());
    }

    #[tokio::test]
    async fn test_get_saga_not_found() {
        let (orchestrator, _channel, _store) = setup();
        assert!(matches!(
            orchestrator.get_saga(SagaId::new()).await,
            Err(SagaError::NotFound(_))
        ));
    }
}
