use async_trait::async_trait;
use common::{OrderId, PaymentStatus};

use crate::{Payment, Result};

/// Outcome of claiming the payment slot of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The pending payment was stored; the caller owns the gateway call.
    Created(Payment),
    /// The order already had a payment.
    Existing(Payment),
}

/// Storage for payments, at most one per order.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Stores a pending payment unless the order already has one.
    async fn claim(&self, payment: Payment) -> Result<Claim>;

    /// Moves a `PENDING` payment to its gateway outcome.
    ///
    /// Returns `None` if the payment is no longer pending.
    async fn settle(&self, order_id: OrderId, status: PaymentStatus) -> Result<Option<Payment>>;

    /// Marks the order's payment `REFUNDED`.
    ///
    /// Returns `None` if there is no payment or it is already refunded.
    async fn mark_refunded(&self, order_id: OrderId) -> Result<Option<Payment>>;
}
