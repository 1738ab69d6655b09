//! Compensation planning.
//!
//! Everything here is a pure function of the persisted saga instance and its
//! event log, so any worker can rebuild the same plan after a crash.

use std::fmt;

use common::ErrorKind;
use saga_store::{EventOutcome, SagaEvent, SagaInstance, SagaStep};

/// Step name under which a failure of the compensation process itself is logged.
pub const COMPENSATION: &str = "COMPENSATION";

/// An action that semantically undoes a completed forward step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompensationAction {
    RefundPayment,
    ReleaseInventory,
    CancelOrder,
}

impl CompensationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationAction::RefundPayment => "REFUND_PAYMENT",
            CompensationAction::ReleaseInventory => "RELEASE_INVENTORY",
            CompensationAction::CancelOrder => "CANCEL_ORDER",
        }
    }
}

impl fmt::Display for CompensationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions to run for a saga that had reached `step`, in execution order.
pub fn compensation_plan(step: SagaStep) -> Vec<CompensationAction> {
    use CompensationAction::*;
    match step {
        SagaStep::OrderCreated => vec![CancelOrder],
        SagaStep::InventoryReserved => vec![ReleaseInventory, CancelOrder],
        SagaStep::PaymentProcessed | SagaStep::OrderConfirmed | SagaStep::Completed => {
            vec![RefundPayment, ReleaseInventory, CancelOrder]
        }
        SagaStep::Compensated => Vec::new(),
    }
}

/// The step whose row of the decision table applies to a saga that just failed.
///
/// Normally this is the persisted `current_step`. A later forward step also
/// counts when its side effect may have happened without `current_step`
/// moving: it logged `COMPLETED`, it timed out, or its `FAILED` event is
/// marked `applied` because the log could not be updated after the
/// participant answered.
pub fn step_at_failure(instance: &SagaInstance, events: &[SagaEvent]) -> SagaStep {
    events
        .iter()
        .filter_map(|event| {
            let step = SagaStep::parse(&event.step)?;
            (SagaStep::FORWARD.contains(&step) && side_effect_possible(event)).then_some(step)
        })
        .fold(instance.current_step, |reached, step| {
            if step.is_after(reached) { step } else { reached }
        })
}

fn side_effect_possible(event: &SagaEvent) -> bool {
    match event.outcome {
        EventOutcome::Completed => true,
        EventOutcome::Failed => {
            event.payload["kind"] == ErrorKind::Timeout.as_str() || event.payload["applied"] == true
        }
        EventOutcome::Started => false,
    }
}

/// The step whose row applies when resuming a saga left unfinished by another worker.
///
/// The step after `current_step` may have been in flight, so it is treated as
/// done. Every compensation is idempotent, which makes over-covering safe.
pub fn step_for_recovery(instance: &SagaInstance) -> SagaStep {
    instance.current_step.next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{OrderId, SagaId};
    use saga_store::SagaStatus;
    use serde_json::json;
    use CompensationAction::*;

    fn instance(step: SagaStep) -> SagaInstance {
        let mut saga = SagaInstance::start(SagaId::new(), OrderId::new(), Utc::now());
        saga.current_step = step;
        saga
    }

    fn failed(saga: &SagaInstance, step: SagaStep, kind: ErrorKind) -> SagaEvent {
        SagaEvent::new(
            saga.saga_id,
            step.as_str(),
            EventOutcome::Failed,
            json!({"error": "boom", "kind": kind}),
        )
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(compensation_plan(SagaStep::OrderCreated), vec![CancelOrder]);
        assert_eq!(
            compensation_plan(SagaStep::InventoryReserved),
            vec![ReleaseInventory, CancelOrder]
        );
        assert_eq!(
            compensation_plan(SagaStep::PaymentProcessed),
            vec![RefundPayment, ReleaseInventory, CancelOrder]
        );
        assert_eq!(
            compensation_plan(SagaStep::OrderConfirmed),
            vec![RefundPayment, ReleaseInventory, CancelOrder]
        );
        assert!(compensation_plan(SagaStep::Compensated).is_empty());
    }

    #[test]
    fn test_explicit_failure_uses_current_step() {
        let saga = instance(SagaStep::InventoryReserved);
        let events = vec![failed(&saga, SagaStep::PaymentProcessed, ErrorKind::PaymentDeclined)];

        assert_eq!(step_at_failure(&saga, &events), SagaStep::InventoryReserved);
    }

    #[test]
    fn test_timed_out_step_is_covered() {
        let saga = instance(SagaStep::InventoryReserved);
        let events = vec![failed(&saga, SagaStep::PaymentProcessed, ErrorKind::Timeout)];

        assert_eq!(step_at_failure(&saga, &events), SagaStep::PaymentProcessed);
    }

    #[test]
    fn test_completed_but_not_advanced_step_is_covered() {
        let saga = instance(SagaStep::OrderCreated);
        let events = vec![
            SagaEvent::new(
                saga.saga_id,
                SagaStep::InventoryReserved.as_str(),
                EventOutcome::Completed,
                json!({"result": null}),
            ),
            SagaEvent::new(
                saga.saga_id,
                SagaStep::InventoryReserved.as_str(),
                EventOutcome::Failed,
                json!({"error": "store down", "kind": ErrorKind::Internal, "applied": true}),
            ),
        ];

        assert_eq!(step_at_failure(&saga, &events), SagaStep::InventoryReserved);
        assert_eq!(
            compensation_plan(step_at_failure(&saga, &events)),
            vec![ReleaseInventory, CancelOrder]
        );
    }

    #[test]
    fn test_applied_failure_is_covered_without_completed_event() {
        let saga = instance(SagaStep::InventoryReserved);
        let events = vec![SagaEvent::new(
            saga.saga_id,
            SagaStep::PaymentProcessed.as_str(),
            EventOutcome::Failed,
            json!({"error": "store down", "kind": ErrorKind::Internal, "applied": true}),
        )];

        assert_eq!(step_at_failure(&saga, &events), SagaStep::PaymentProcessed);
    }

    #[test]
    fn test_earlier_completed_steps_do_not_narrow_the_plan() {
        let saga = instance(SagaStep::PaymentProcessed);
        let events = vec![
            SagaEvent::new(
                saga.saga_id,
                SagaStep::OrderCreated.as_str(),
                EventOutcome::Completed,
                json!({}),
            ),
            failed(&saga, SagaStep::OrderConfirmed, ErrorKind::NotFound),
        ];

        assert_eq!(step_at_failure(&saga, &events), SagaStep::PaymentProcessed);
    }

    #[test]
    fn test_compensation_failures_are_ignored() {
        let saga = instance(SagaStep::OrderCreated);
        let events = vec![
            failed(&saga, SagaStep::InventoryReserved, ErrorKind::InsufficientStock),
            SagaEvent::new(
                saga.saga_id,
                CancelOrder.as_str(),
                EventOutcome::Failed,
                json!({"error": "late", "kind": ErrorKind::Timeout}),
            ),
        ];

        assert_eq!(step_at_failure(&saga, &events), SagaStep::OrderCreated);
    }

    #[test]
    fn test_recovery_covers_in_flight_step() {
        let mut saga = instance(SagaStep::OrderCreated);
        assert_eq!(step_for_recovery(&saga), SagaStep::InventoryReserved);

        saga.current_step = SagaStep::PaymentProcessed;
        saga.status = SagaStatus::Compensating;
        assert_eq!(step_for_recovery(&saga), SagaStep::OrderConfirmed);
        assert_eq!(
            compensation_plan(step_for_recovery(&saga)),
            vec![RefundPayment, ReleaseInventory, CancelOrder]
        );
    }
}
