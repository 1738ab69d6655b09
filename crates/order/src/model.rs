use chrono::{DateTime, Utc};
use common::{CreateOrderCommand, Money, OrderId, OrderLine, OrderStatus, OrderView, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// Saga progress markers recorded on the order row.
pub mod saga_state {
    pub const ORDER_CREATED: &str = "ORDER_CREATED";
    pub const ORDER_CONFIRMED: &str = "ORDER_CONFIRMED";
    pub const COMPENSATED: &str = "COMPENSATED";
}

/// A line of an order. Immutable once the order exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price_at_purchase: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub saga_state: String,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a pending order from a create command.
    pub fn from_command(cmd: &CreateOrderCommand, now: DateTime<Utc>) -> Self {
        Self {
            id: cmd.order_id,
            user_id: cmd.user_id,
            total_amount: cmd.total_amount,
            status: OrderStatus::Pending,
            saga_state: saga_state::ORDER_CREATED.to_string(),
            items: cmd
                .items
                .iter()
                .map(|line| OrderItem {
                    order_id: cmd.order_id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    price_at_purchase: line.price_at_purchase,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_view(&self) -> OrderView {
        OrderView {
            id: self.id,
            user_id: self.user_id,
            total_amount: self.total_amount,
            status: self.status,
            saga_state: self.saga_state.clone(),
            items: self
                .items
                .iter()
                .map(|item| OrderLine {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    price_at_purchase: item.price_at_purchase,
                })
                .collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
