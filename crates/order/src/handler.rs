use async_trait::async_trait;
use channel::{CommandHandler, decode, encode};
use common::commands::{ORDER_CANCEL, ORDER_CONFIRM, ORDER_CREATE, ORDER_GET};
use common::{Ack, CreateOrderCommand, OrderRef, Participant, ParticipantError};

use crate::OrderService;

/// Serves `order.*` commands.
pub struct OrderHandler {
    service: OrderService,
}

impl OrderHandler {
    pub fn new(service: OrderService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl CommandHandler for OrderHandler {
    fn participant(&self) -> Participant {
        Participant::Order
    }

    async fn handle(
        &self,
        command: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ParticipantError> {
        match command {
            ORDER_CREATE => {
                let cmd: CreateOrderCommand = decode(command, payload)?;
                let order = self.service.create(cmd).await?;
                encode(&order.to_view())
            }
            ORDER_GET => {
                let cmd: OrderRef = decode(command, payload)?;
                let order = self.service.get(cmd.order_id).await?;
                encode(&order.to_view())
            }
            ORDER_CONFIRM => {
                let cmd: OrderRef = decode(command, payload)?;
                self.service.confirm(cmd.order_id).await?;
                encode(&Ack::ok())
            }
            ORDER_CANCEL => {
                let cmd: OrderRef = decode(command, payload)?;
                self.service.cancel(cmd.order_id).await?;
                encode(&Ack::ok())
            }
            other => Err(ParticipantError::InvalidCommand {
                command: other.to_string(),
                reason: "unknown order command".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryOrderRepository;
    use common::{Money, OrderId, OrderView, ProductId};
    use std::sync::Arc;

    fn handler() -> OrderHandler {
        OrderHandler::new(OrderService::new(Arc::new(InMemoryOrderRepository::new())))
    }

    #[tokio::test]
    async fn test_create_then_get_over_wire_format() {
        let handler = handler();
        let order_id = OrderId::new();
        let create = serde_json::json!({
            "orderId": order_id,
            "items": [{"productId": ProductId::new(), "quantity": 3, "priceAtPurchase": 19.99}],
            "totalAmount": 59.97
        });

        handler.handle(ORDER_CREATE, create).await.unwrap();
        let reply = handler
            .handle(ORDER_GET, serde_json::json!({"orderId": order_id}))
            .await
            .unwrap();

        let view: OrderView = serde_json::from_value(reply.clone()).unwrap();
        assert_eq!(view.total_amount, Money::from_cents(5997));
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].quantity, 3);
        assert_eq!(view.items[0].price_at_purchase, Money::from_cents(1999));
        assert_eq!(reply["sagaState"], "ORDER_CREATED");
        assert_eq!(reply["status"], "PENDING");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let err = handler()
            .handle(ORDER_GET, serde_json::json!({"orderId": OrderId::new()}))
            .await
            .unwrap_err();
        assert!(matches!(err, ParticipantError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let err = handler()
            .handle("order.ship", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ParticipantError::InvalidCommand { .. }));
    }
}
