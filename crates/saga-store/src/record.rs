use std::fmt;

use chrono::{DateTime, Utc};
use common::{EventId, OrderId, SagaId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Position of a saga along the checkout sequence.
///
/// The forward steps are strictly ordered. `Compensated` is reached only from
/// the failure path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStep {
    OrderCreated,
    InventoryReserved,
    PaymentProcessed,
    OrderConfirmed,
    Completed,
    Compensated,
}

impl SagaStep {
    /// The forward steps that invoke a participant, in execution order.
    pub const FORWARD: [SagaStep; 4] = [
        SagaStep::OrderCreated,
        SagaStep::InventoryReserved,
        SagaStep::PaymentProcessed,
        SagaStep::OrderConfirmed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::OrderCreated => "ORDER_CREATED",
            SagaStep::InventoryReserved => "INVENTORY_RESERVED",
            SagaStep::PaymentProcessed => "PAYMENT_PROCESSED",
            SagaStep::OrderConfirmed => "ORDER_CONFIRMED",
            SagaStep::Completed => "COMPLETED",
            SagaStep::Compensated => "COMPENSATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ORDER_CREATED" => Some(SagaStep::OrderCreated),
            "INVENTORY_RESERVED" => Some(SagaStep::InventoryReserved),
            "PAYMENT_PROCESSED" => Some(SagaStep::PaymentProcessed),
            "ORDER_CONFIRMED" => Some(SagaStep::OrderConfirmed),
            "COMPLETED" => Some(SagaStep::Completed),
            "COMPENSATED" => Some(SagaStep::Compensated),
            _ => None,
        }
    }

    fn ordinal(&self) -> u8 {
        match self {
            SagaStep::OrderCreated => 0,
            SagaStep::InventoryReserved => 1,
            SagaStep::PaymentProcessed => 2,
            SagaStep::OrderConfirmed => 3,
            SagaStep::Completed => 4,
            SagaStep::Compensated => 5,
        }
    }

    /// The step that follows this one on the success path.
    ///
    /// `Completed` and `Compensated` are their own successors.
    pub fn next(&self) -> SagaStep {
        match self {
            SagaStep::OrderCreated => SagaStep::InventoryReserved,
            SagaStep::InventoryReserved => SagaStep::PaymentProcessed,
            SagaStep::PaymentProcessed => SagaStep::OrderConfirmed,
            SagaStep::OrderConfirmed => SagaStep::Completed,
            SagaStep::Completed => SagaStep::Completed,
            SagaStep::Compensated => SagaStep::Compensated,
        }
    }

    /// Returns true if this step comes strictly after `other`.
    pub fn is_after(&self, other: SagaStep) -> bool {
        self.ordinal() > other.ordinal()
    }
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a saga instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    Running,
    Done,
    Compensating,
    Compensated,
}

impl SagaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Running => "RUNNING",
            SagaStatus::Done => "DONE",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(SagaStatus::Running),
            "DONE" => Some(SagaStatus::Done),
            "COMPENSATING" => Some(SagaStatus::Compensating),
            "COMPENSATED" => Some(SagaStatus::Compensated),
            _ => None,
        }
    }

    /// Terminal sagas are never touched again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Done | SagaStatus::Compensated)
    }

    fn can_become(&self, next: SagaStatus) -> bool {
        matches!(
            (self, next),
            (SagaStatus::Running, SagaStatus::Running)
                | (SagaStatus::Running, SagaStatus::Done)
                | (SagaStatus::Running, SagaStatus::Compensating)
                | (SagaStatus::Compensating, SagaStatus::Compensating)
                | (SagaStatus::Compensating, SagaStatus::Compensated)
        )
    }
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable record of one checkout saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaInstance {
    pub saga_id: SagaId,
    pub order_id: OrderId,
    /// Last forward step that completed. Read it together with `status`: while
    /// the status is `COMPENSATING` this still names the step the saga had
    /// reached, and it only becomes `COMPENSATED` with the terminal status.
    pub current_step: SagaStep,
    pub status: SagaStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SagaInstance {
    /// A freshly started saga, positioned before its first step completes.
    pub fn start(saga_id: SagaId, order_id: OrderId, now: DateTime<Utc>) -> Self {
        Self {
            saga_id,
            order_id,
            current_step: SagaStep::OrderCreated,
            status: SagaStatus::Running,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks whether the saga may move to `step` with `status`.
    ///
    /// Forward progress never goes backwards, `Done` requires `Completed`,
    /// compensation keeps the failed step until it finishes at `Compensated`.
    /// Repeating the current position is accepted.
    pub fn can_advance(&self, step: SagaStep, status: SagaStatus) -> bool {
        if step == self.current_step && status == self.status {
            return true;
        }
        if !self.status.can_become(status) {
            return false;
        }
        match status {
            SagaStatus::Running => {
                SagaStep::FORWARD.contains(&step)
                    && (step == self.current_step || step.is_after(self.current_step))
            }
            SagaStatus::Done => step == SagaStep::Completed,
            SagaStatus::Compensating => step == self.current_step,
            SagaStatus::Compensated => step == SagaStep::Compensated,
        }
    }
}

/// Outcome recorded by a saga event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventOutcome {
    Started,
    Completed,
    Failed,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Started => "STARTED",
            EventOutcome::Completed => "COMPLETED",
            EventOutcome::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STARTED" => Some(EventOutcome::Started),
            "COMPLETED" => Some(EventOutcome::Completed),
            "FAILED" => Some(EventOutcome::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the append-only saga log.
///
/// `step` is a forward step name or a compensation label such as
/// `RELEASE_INVENTORY` or `COMPENSATION`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaEvent {
    pub event_id: EventId,
    pub saga_id: SagaId,
    pub step: String,
    pub outcome: EventOutcome,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl SagaEvent {
    pub fn new(
        saga_id: SagaId,
        step: impl Into<String>,
        outcome: EventOutcome,
        payload: Value,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            saga_id,
            step: step.into(),
            outcome,
            payload,
            timestamp: Utc::now(),
        }
    }
}
