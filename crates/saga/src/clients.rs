//! Typed clients for the participant commands.

use std::sync::Arc;

use channel::{ChannelError, CommandChannel, CommandChannelExt, Result};
use common::commands::{
    INVENTORY_RELEASE, INVENTORY_RESERVE, ORDER_CANCEL, ORDER_CONFIRM, ORDER_CREATE, ORDER_GET,
    PAYMENT_PROCESS, PAYMENT_REFUND,
};
use common::{
    Ack, CreateOrderCommand, Money, OrderId, OrderRef, OrderView, Participant, ParticipantError,
    PaymentStatus, PaymentView, ProcessPaymentCommand, ReservationLine, ReservationView,
    ReserveInventoryCommand,
};

#[derive(Clone)]
pub struct OrderClient {
    channel: Arc<dyn CommandChannel>,
}

impl OrderClient {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self { channel }
    }

    pub async fn create(&self, command: &CreateOrderCommand) -> Result<OrderView> {
        self.channel
            .request(Participant::Order, ORDER_CREATE, command)
            .await
    }

    pub async fn get(&self, order_id: OrderId) -> Result<OrderView> {
        self.channel
            .request(Participant::Order, ORDER_GET, &OrderRef::new(order_id))
            .await
    }

    pub async fn confirm(&self, order_id: OrderId) -> Result<Ack> {
        self.channel
            .request(Participant::Order, ORDER_CONFIRM, &OrderRef::new(order_id))
            .await
    }

    pub async fn cancel(&self, order_id: OrderId) -> Result<Ack> {
        self.channel
            .request(Participant::Order, ORDER_CANCEL, &OrderRef::new(order_id))
            .await
    }
}

#[derive(Clone)]
pub struct InventoryClient {
    channel: Arc<dyn CommandChannel>,
}

impl InventoryClient {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self { channel }
    }

    pub async fn reserve(
        &self,
        order_id: OrderId,
        items: Vec<ReservationLine>,
    ) -> Result<Vec<ReservationView>> {
        let command = ReserveInventoryCommand { order_id, items };
        self.channel
            .request(Participant::Inventory, INVENTORY_RESERVE, &command)
            .await
    }

    pub async fn release(&self, order_id: OrderId) -> Result<Ack> {
        self.channel
            .request(Participant::Inventory, INVENTORY_RELEASE, &OrderRef::new(order_id))
            .await
    }
}

#[derive(Clone)]
pub struct PaymentClient {
    channel: Arc<dyn CommandChannel>,
}

impl PaymentClient {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self { channel }
    }

    /// Charges the order.
    ///
    /// A replayed payment that is not `SUCCESS` (still pending, or already
    /// refunded) is reported as a decline: the saga cannot proceed on it.
    pub async fn process(&self, order_id: OrderId, amount: Money) -> Result<PaymentView> {
        let command = ProcessPaymentCommand { order_id, amount };
        let payment: PaymentView = self
            .channel
            .request(Participant::Payment, PAYMENT_PROCESS, &command)
            .await?;

        if payment.status != PaymentStatus::Success {
            return Err(ChannelError::Rejected {
                participant: Participant::Payment,
                command: PAYMENT_PROCESS.to_string(),
                source: ParticipantError::PaymentDeclined {
                    order_id,
                    reason: format!("payment is {}", payment.status.as_str()),
                },
            });
        }
        Ok(payment)
    }

    pub async fn refund(&self, order_id: OrderId) -> Result<Ack> {
        self.channel
            .request(Participant::Payment, PAYMENT_REFUND, &OrderRef::new(order_id))
            .await
    }
}
