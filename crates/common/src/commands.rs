//! Command names, queues and payloads exchanged over the command channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{OrderId, PaymentId, ProductId, ReservationId, UserId};

/// `order.create`
pub const ORDER_CREATE: &str = "order.create";
/// `order.get`
pub const ORDER_GET: &str = "order.get";
/// `order.confirm`
pub const ORDER_CONFIRM: &str = "order.confirm";
/// `order.cancel`
pub const ORDER_CANCEL: &str = "order.cancel";
/// `inventory.reserve`
pub const INVENTORY_RESERVE: &str = "inventory.reserve";
/// `inventory.release`
pub const INVENTORY_RELEASE: &str = "inventory.release";
/// `payment.process`
pub const PAYMENT_PROCESS: &str = "payment.process";
/// `payment.refund`
pub const PAYMENT_REFUND: &str = "payment.refund";

/// A service that consumes commands from its own queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Participant {
    Order,
    Inventory,
    Payment,
}

impl Participant {
    /// All participants, in the order the checkout saga first contacts them.
    pub const ALL: [Participant; 3] = [
        Participant::Order,
        Participant::Inventory,
        Participant::Payment,
    ];

    /// Name of the durable queue this participant consumes.
    pub fn queue(&self) -> &'static str {
        match self {
            Participant::Order => "order_commands",
            Participant::Inventory => "inventory_commands",
            Participant::Payment => "payment_commands",
        }
    }

    /// Returns the participant name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Participant::Order => "order",
            Participant::Inventory => "inventory",
            Participant::Payment => "payment",
        }
    }

    /// Resolves the participant that owns a command by its name prefix.
    pub fn for_command(command: &str) -> Option<Participant> {
        match command.split_once('.')?.0 {
            "order" => Some(Participant::Order),
            "inventory" => Some(Participant::Inventory),
            "payment" => Some(Participant::Payment),
            _ => None,
        }
    }
}

impl std::fmt::Display for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of every command that only names an order
/// (`order.get`, `order.confirm`, `order.cancel`, `inventory.release`, `payment.refund`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub order_id: OrderId,
}

impl OrderRef {
    pub fn new(order_id: OrderId) -> Self {
        Self { order_id }
    }
}

/// Bare success reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

// -- Order --

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of an order as sent to `order.create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price_at_purchase: Money,
}

/// `order.create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderCommand {
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub items: Vec<OrderLine>,
    pub total_amount: Money,
}

/// Order as returned by `order.create` and `order.get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub total_amount: Money,
    pub status: OrderStatus,
    /// Saga progress marker recorded on the order row.
    pub saga_state: String,
    pub items: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Inventory --

/// Status of a stock reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    Released,
    Consumed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Released => "RELEASED",
            ReservationStatus::Consumed => "CONSUMED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(ReservationStatus::Active),
            "RELEASED" => Some(ReservationStatus::Released),
            "CONSUMED" => Some(ReservationStatus::Consumed),
            _ => None,
        }
    }
}

/// One product and quantity to hold for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// `inventory.reserve`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveInventoryCommand {
    pub order_id: OrderId,
    pub items: Vec<ReservationLine>,
}

/// Reservation as returned by `inventory.reserve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
}

// -- Payment --

/// Status of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "SUCCESS" => Some(PaymentStatus::Success),
            "FAILED" => Some(PaymentStatus::Failed),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// `payment.process`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentCommand {
    pub order_id: OrderId,
    pub amount: Money,
}

/// Payment as returned by `payment.process`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub transaction_date: DateTime<Utc>,
}
