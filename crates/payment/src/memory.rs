use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{OrderId, PaymentStatus};
use tokio::sync::RwLock;

use crate::repository::{Claim, PaymentRepository};
use crate::{Payment, PaymentError, Result};

/// In-memory payment repository.
#[derive(Clone, Default)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<HashMap<OrderId, Payment>>>,
    fail_on_refund: Arc<AtomicBool>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes refunds fail as if storage were down.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.fail_on_refund.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored payments.
    pub async fn payment_count(&self) -> usize {
        self.payments.read().await.len()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(&order_id).cloned())
    }

    async fn claim(&self, payment: Payment) -> Result<Claim> {
        let mut payments = self.payments.write().await;
        if let Some(existing) = payments.get(&payment.order_id) {
            return Ok(Claim::Existing(existing.clone()));
        }
        payments.insert(payment.order_id, payment.clone());
        Ok(Claim::Created(payment))
    }

    async fn settle(&self, order_id: OrderId, status: PaymentStatus) -> Result<Option<Payment>> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(&order_id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = status;
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_refunded(&self, order_id: OrderId) -> Result<Option<Payment>> {
        if self.fail_on_refund.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable(
                "refunds disabled for testing".to_string(),
            ));
        }
        let mut payments = self.payments.write().await;
        match payments.get_mut(&order_id) {
            Some(payment) if payment.status != PaymentStatus::Refunded => {
                payment.status = PaymentStatus::Refunded;
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }
}
