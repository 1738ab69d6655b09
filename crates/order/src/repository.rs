use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus};

use crate::{Order, Result};

/// Storage for orders and their items.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts the order header and items together.
    ///
    /// If an order with the same id exists, nothing is written and the stored
    /// order is returned.
    async fn insert(&self, order: Order) -> Result<Order>;

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Sets status and saga marker, but only while the order is still in `from`.
    ///
    /// Returns `None` if the order is missing or no longer in `from`.
    async fn transition(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        saga_state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>>;
}
