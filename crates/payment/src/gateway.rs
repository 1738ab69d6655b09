//! Payment gateways.

use std::time::Duration;

use async_trait::async_trait;
use common::{Money, OrderId};
use rand::Rng;

/// Decline reason reported by the simulated card network.
pub const CARD_DECLINED: &str = "Payment failed - card declined";

/// Result of a charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Approved,
    Declined { reason: String },
}

/// External payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, order_id: OrderId, amount: Money) -> GatewayOutcome;
}

/// Stand-in for a card processor: fixed latency and a random decline rate.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    delay: Duration,
    decline_rate: f64,
}

impl SimulatedGateway {
    pub fn new(delay: Duration, decline_rate: f64) -> Self {
        Self {
            delay,
            decline_rate: decline_rate.clamp(0.0, 1.0),
        }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 0.05)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, _order_id: OrderId, _amount: Money) -> GatewayOutcome {
        tokio::time::sleep(self.delay).await;
        if rand::rng().random::<f64>() < self.decline_rate {
            GatewayOutcome::Declined {
                reason: CARD_DECLINED.to_string(),
            }
        } else {
            GatewayOutcome::Approved
        }
    }
}

/// Approves every charge.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysApprove;

#[async_trait]
impl PaymentGateway for AlwaysApprove {
    async fn charge(&self, _order_id: OrderId, _amount: Money) -> GatewayOutcome {
        GatewayOutcome::Approved
    }
}

/// Declines every charge.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDecline;

#[async_trait]
impl PaymentGateway for AlwaysDecline {
    async fn charge(&self, _order_id: OrderId, _amount: Money) -> GatewayOutcome {
        GatewayOutcome::Declined {
            reason: CARD_DECLINED.to_string(),
        }
    }
}

/// Declines charges strictly above a limit.
#[derive(Debug, Clone, Copy)]
pub struct DeclineAbove(pub Money);

#[async_trait]
impl PaymentGateway for DeclineAbove {
    async fn charge(&self, _order_id: OrderId, amount: Money) -> GatewayOutcome {
        if amount > self.0 {
            GatewayOutcome::Declined {
                reason: format!("amount {amount} exceeds limit {}", self.0),
            }
        } else {
            GatewayOutcome::Approved
        }
    }
}
