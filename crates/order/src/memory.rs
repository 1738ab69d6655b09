use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus};
use tokio::sync::RwLock;

use crate::repository::OrderRepository;
use crate::{Order, OrderError, Result};

/// In-memory order repository.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    fail_on_insert: Arc<AtomicBool>,
    fail_on_cancel: Arc<AtomicBool>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes order creation fail as if storage were down.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.fail_on_insert.store(fail, Ordering::SeqCst);
    }

    /// Makes cancellation fail as if storage were down.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.fail_on_cancel.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: Order) -> Result<Order> {
        if self.fail_on_insert.load(Ordering::SeqCst) {
            return Err(OrderError::Unavailable("inserts disabled for testing".to_string()));
        }
        let mut orders = self.orders.write().await;
        Ok(orders.entry(order.id).or_insert(order).clone())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn transition(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        saga_state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        if to == OrderStatus::Cancelled && self.fail_on_cancel.load(Ordering::SeqCst) {
            return Err(OrderError::Unavailable(
                "cancellation disabled for testing".to_string(),
            ));
        }
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order_id) {
            Some(order) if order.status == from => {
                order.status = to;
                order.saga_state = saga_state.to_string();
                order.updated_at = now;
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }
}
