use common::{Entity, OrderId, OrderStatus, ParticipantError};
use thiserror::Error;

/// Errors that can occur in the order ledger.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order with ID {0} not found")]
    NotFound(OrderId),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Order {0} kept changing during the update")]
    Contended(OrderId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Order storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;

impl From<OrderError> for ParticipantError {
    fn from(err: OrderError) -> Self {
        let reason = err.to_string();
        match err {
            OrderError::NotFound(id) => ParticipantError::not_found(Entity::Order, id),
            OrderError::InvalidOrder(_) => ParticipantError::InvalidCommand {
                command: common::commands::ORDER_CREATE.to_string(),
                reason,
            },
            OrderError::InvalidTransition { to, .. } => ParticipantError::InvalidCommand {
                command: match to {
                    OrderStatus::Cancelled => common::commands::ORDER_CANCEL,
                    _ => common::commands::ORDER_CONFIRM,
                }
                .to_string(),
                reason,
            },
            _ => ParticipantError::internal(reason),
        }
    }
}
