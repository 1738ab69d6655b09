use common::{Money, OrderId, ParticipantError};
use thiserror::Error;

/// Errors that can occur in the payment ledger.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment for order {order_id} declined: {reason}")]
    Declined { order_id: OrderId, reason: String },

    #[error("Invalid payment amount: {0}")]
    InvalidAmount(Money),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payment storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for payment operations.
pub type Result<T> = std::result::Result<T, PaymentError>;

impl From<PaymentError> for ParticipantError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Declined { order_id, reason } => {
                ParticipantError::PaymentDeclined { order_id, reason }
            }
            PaymentError::InvalidAmount(amount) => ParticipantError::InvalidCommand {
                command: common::commands::PAYMENT_PROCESS.to_string(),
                reason: format!("amount {amount} must not be negative"),
            },
            other => ParticipantError::internal(other.to_string()),
        }
    }
}
