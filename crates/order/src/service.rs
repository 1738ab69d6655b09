use std::sync::Arc;

use chrono::Utc;
use common::{CreateOrderCommand, OrderId, OrderStatus};
use tracing::{debug, info};

use crate::model::saga_state;
use crate::repository::OrderRepository;
use crate::{Order, OrderError, Result};

const TRANSITION_ATTEMPTS: usize = 3;

/// Creates orders and moves them through their status transitions.
#[derive(Clone)]
pub struct OrderService {
    repository: Arc<dyn OrderRepository>,
}

fn allowed(from: OrderStatus, to: OrderStatus) -> bool {
    matches!(
        (from, to),
        (OrderStatus::Pending, OrderStatus::Confirmed)
            | (OrderStatus::Pending, OrderStatus::Cancelled)
            | (OrderStatus::Confirmed, OrderStatus::Cancelled)
    )
}

impl OrderService {
    pub fn new(repository: Arc<dyn OrderRepository>) -> Self {
        Self { repository }
    }

    /// Creates the order, or returns it unchanged if it already exists.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn create(&self, cmd: CreateOrderCommand) -> Result<Order> {
        if cmd.items.is_empty() {
            return Err(OrderError::InvalidOrder(
                "order must have at least one item".to_string(),
            ));
        }
        if let Some(line) = cmd.items.iter().find(|l| l.quantity == 0) {
            return Err(OrderError::InvalidOrder(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
        if cmd.items.iter().any(|l| l.price_at_purchase.is_negative())
            || cmd.total_amount.is_negative()
        {
            return Err(OrderError::InvalidOrder(
                "amounts must not be negative".to_string(),
            ));
        }

        let order = self
            .repository
            .insert(Order::from_command(&cmd, Utc::now()))
            .await?;
        info!(total = %order.total_amount, items = order.items.len(), "Order created");
        Ok(order)
    }

    pub async fn get(&self, order_id: OrderId) -> Result<Order> {
        self.repository
            .get(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn confirm(&self, order_id: OrderId) -> Result<()> {
        match self
            .transition(order_id, OrderStatus::Confirmed, saga_state::ORDER_CONFIRMED)
            .await?
        {
            Some(_) => Ok(()),
            None => Err(OrderError::NotFound(order_id)),
        }
    }

    /// Cancels the order. Cancelling an order that was never created succeeds.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<()> {
        if self
            .transition(order_id, OrderStatus::Cancelled, saga_state::COMPENSATED)
            .await?
            .is_none()
        {
            debug!("No order to cancel");
        }
        Ok(())
    }

    async fn transition(
        &self,
        order_id: OrderId,
        to: OrderStatus,
        marker: &str,
    ) -> Result<Option<Order>> {
        for _ in 0..TRANSITION_ATTEMPTS {
            let Some(order) = self.repository.get(order_id).await? else {
                return Ok(None);
            };
            if order.status == to {
                debug!(status = to.as_str(), "Order already in target status");
                return Ok(Some(order));
            }
            if !allowed(order.status, to) {
                return Err(OrderError::InvalidTransition {
                    order_id,
                    from: order.status,
                    to,
                });
            }
            if let Some(updated) = self
                .repository
                .transition(order_id, order.status, to, marker, Utc::now())
                .await?
            {
                info!(from = order.status.as_str(), to = to.as_str(), "Order status changed");
                return Ok(Some(updated));
            }
        }
        Err(OrderError::Contended(order_id))
    }
}
