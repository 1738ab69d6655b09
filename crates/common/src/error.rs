//! Failures reported by participants over the command channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{OrderId, ProductId};

/// Kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Product,
    Order,
    Payment,
    Reservation,
    Saga,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Entity::Product => "Product",
            Entity::Order => "Order",
            Entity::Payment => "Payment",
            Entity::Reservation => "Reservation",
            Entity::Saga => "Saga",
        })
    }
}

/// Closed classification of every failure the checkout flow can observe.
///
/// Callers branch on the kind, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InsufficientStock,
    ConcurrencyConflict,
    PaymentDeclined,
    Timeout,
    CompensationFailure,
    /// The command or request was malformed.
    Invalid,
    /// The transport failed before a reply was received.
    Transport,
    /// Storage or other unexpected failure inside a component.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorKind::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            ErrorKind::PaymentDeclined => "PAYMENT_DECLINED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::CompensationFailure => "COMPENSATION_FAILURE",
            ErrorKind::Invalid => "INVALID",
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reply sent by a participant in place of a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParticipantError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },

    #[error(
        "Insufficient stock for product {product_id}. Available: {available}, Requested: {requested}"
    )]
    #[serde(rename_all = "camelCase")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Concurrent stock update conflict for product {product_id}")]
    #[serde(rename_all = "camelCase")]
    ConcurrencyConflict { product_id: ProductId },

    #[error("Payment for order {order_id} declined: {reason}")]
    #[serde(rename_all = "camelCase")]
    PaymentDeclined { order_id: OrderId, reason: String },

    #[error("Invalid command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },

    #[error("Internal participant error: {message}")]
    Internal { message: String },
}

impl ParticipantError {
    pub fn not_found(entity: Entity, id: impl std::fmt::Display) -> Self {
        ParticipantError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ParticipantError::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ParticipantError::NotFound { .. } => ErrorKind::NotFound,
            ParticipantError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            ParticipantError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            ParticipantError::PaymentDeclined { .. } => ErrorKind::PaymentDeclined,
            ParticipantError::InvalidCommand { .. } => ErrorKind::Invalid,
            ParticipantError::Internal { .. } => ErrorKind::Internal,
        }
    }
}
