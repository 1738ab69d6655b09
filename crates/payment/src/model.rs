use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, PaymentStatus, PaymentView};
use serde::{Deserialize, Serialize};

/// The single payment record of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub transaction_date: DateTime<Utc>,
}

impl Payment {
    /// A payment claimed for an order before the gateway is called.
    pub fn pending(order_id: OrderId, amount: Money) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            amount,
            status: PaymentStatus::Pending,
            transaction_date: Utc::now(),
        }
    }

    pub fn to_view(&self) -> PaymentView {
        PaymentView {
            id: self.id,
            order_id: self.order_id,
            amount: self.amount,
            status: self.status,
            transaction_date: self.transaction_date,
        }
    }
}
