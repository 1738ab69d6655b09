use std::sync::Arc;

use common::{Money, OrderId, PaymentStatus};
use tracing::{debug, info, warn};

use crate::gateway::{GatewayOutcome, PaymentGateway};
use crate::repository::{Claim, PaymentRepository};
use crate::{Payment, PaymentError, Result};

/// Charges and refunds orders, at most once each.
///
/// A charge first claims the order's payment slot with a `PENDING` record, so
/// the gateway is called by exactly one delivery of a command. Later
/// deliveries replay the stored outcome, declines included.
#[derive(Clone)]
pub struct PaymentService {
    repository: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    pub fn new(repository: Arc<dyn PaymentRepository>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            repository,
            gateway,
        }
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id, amount = %amount))]
    pub async fn process(&self, order_id: OrderId, amount: Money) -> Result<Payment> {
        if let Some(existing) = self.repository.get_by_order(order_id).await? {
            debug!(status = existing.status.as_str(), "Payment already exists");
            return replay(existing);
        }
        if amount.is_negative() {
            return Err(PaymentError::InvalidAmount(amount));
        }

        let pending = match self.repository.claim(Payment::pending(order_id, amount)).await? {
            Claim::Created(payment) => payment,
            Claim::Existing(existing) => return replay(existing),
        };

        let (status, decline_reason) = match self.gateway.charge(order_id, amount).await {
            GatewayOutcome::Approved => (PaymentStatus::Success, None),
            GatewayOutcome::Declined { reason } => (PaymentStatus::Failed, Some(reason)),
        };

        let payment = match self.repository.settle(order_id, status).await? {
            Some(settled) => settled,
            None => {
                // Refunded while the gateway call was in flight.
                warn!(
                    payment_id = %pending.id,
                    outcome = status.as_str(),
                    "Payment left PENDING before the gateway replied"
                );
                self.repository.get_by_order(order_id).await?.unwrap_or(pending)
            }
        };

        match decline_reason {
            Some(reason) => {
                metrics::counter!("payment_declined_total").increment(1);
                info!(%reason, "Payment declined");
                Err(PaymentError::Declined { order_id, reason })
            }
            None => {
                info!(payment_id = %payment.id, "Payment processed");
                Ok(payment)
            }
        }
    }

    /// Refunds the order's payment. Succeeds if there is nothing to refund.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn refund(&self, order_id: OrderId) -> Result<()> {
        match self.repository.mark_refunded(order_id).await? {
            Some(payment) => info!(payment_id = %payment.id, "Payment refunded"),
            None => debug!("No payment to refund"),
        }
        Ok(())
    }

    pub async fn get(&self, order_id: OrderId) -> Result<Option<Payment>> {
        self.repository.get_by_order(order_id).await
    }
}

/// Answers a repeated charge from the stored payment.
///
/// The gateway's decline reason is not stored, so a replayed decline always
/// reports the generic `CARD_DECLINED`.
fn replay(existing: Payment) -> Result<Payment> {
    match existing.status {
        PaymentStatus::Failed => Err(PaymentError::Declined {
            order_id: existing.order_id,
            reason: crate::gateway::CARD_DECLINED.to_string(),
        }),
        _ => Ok(existing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryPaymentRepository;
    use crate::gateway::{AlwaysApprove, AlwaysDecline};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingGateway {
        calls: AtomicU32,
    }

    #[async_trait]
    impl PaymentGateway for CountingGateway {
        async fn charge(&self, _order_id: OrderId, _amount: Money) -> GatewayOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            GatewayOutcome::Approved
        }
    }

    fn setup(
        gateway: Arc<dyn PaymentGateway>,
    ) -> (PaymentService, InMemoryPaymentRepository) {
        let repo = InMemoryPaymentRepository::new();
        (PaymentService::new(Arc::new(repo.clone()), gateway), repo)
    }

    #[tokio::test]
    async fn test_process_twice_charges_once() {
        let gateway = Arc::new(CountingGateway::default());
        let (service, repo) = setup(gateway.clone());
        let order_id = OrderId::new();

        let first = service.process(order_id, Money::from_cents(2998)).await.unwrap();
        let second = service.process(order_id, Money::from_cents(2998)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.status, PaymentStatus::Success);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
        assert_eq!(repo.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_decline_is_recorded_and_replayed() {
        let (service, repo) = setup(Arc::new(AlwaysDecline));
        let order_id = OrderId::new();

        let err = service.process(order_id, Money::from_cents(100)).await.unwrap_err();
        assert!(matches!(err, PaymentError::Declined { .. }));

        let stored = repo.get_by_order(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);

        let replayed = service.process(order_id, Money::from_cents(100)).await.unwrap_err();
        assert!(matches!(replayed, PaymentError::Declined { .. }));
        assert_eq!(repo.payment_count().await, 1);
    }

    struct NoFunds;

    #[async_trait]
    impl PaymentGateway for NoFunds {
        async fn charge(&self, _order_id: OrderId, _amount: Money) -> GatewayOutcome {
            GatewayOutcome::Declined {
                reason: "INSUFFICIENT_FUNDS".to_string(),
            }
        }
    }

    #[tokio::test]
    async fn test_replayed_decline_reports_generic_reason() {
        let (service, _repo) = setup(Arc::new(NoFunds));
        let order_id = OrderId::new();

        let first = service.process(order_id, Money::from_cents(100)).await.unwrap_err();
        assert!(
            matches!(first, PaymentError::Declined { ref reason, .. } if reason == "INSUFFICIENT_FUNDS")
        );

        let replayed = service.process(order_id, Money::from_cents(100)).await.unwrap_err();
        assert!(
            matches!(replayed, PaymentError::Declined { ref reason, .. } if reason == crate::gateway::CARD_DECLINED)
        );
    }

    #[tokio::test]
    async fn test_refund_is_idempotent() {
        let (service, repo) = setup(Arc::new(AlwaysApprove));
        let order_id = OrderId::new();

        service.refund(order_id).await.unwrap();
        assert_eq!(repo.payment_count().await, 0);

        service.process(order_id, Money::from_cents(500)).await.unwrap();
        service.refund(order_id).await.unwrap();
        service.refund(order_id).await.unwrap();

        let stored = repo.get_by_order(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_negative_amount_rejected() {
        let (service, repo) = setup(Arc::new(AlwaysApprove));
        let err = service
            .process(OrderId::new(), Money::from_cents(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidAmount(_)));
        assert_eq!(repo.payment_count().await, 0);
    }
}
