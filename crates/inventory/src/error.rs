use common::{Entity, ParticipantError, ProductId};
use thiserror::Error;

/// Errors that can occur in the inventory engine.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    #[error(
        "Insufficient stock for product {product_id}. Available: {available}, Requested: {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The conditional stock update matched no row.
    #[error("Concurrent stock update conflict for product {product_id}")]
    ConcurrencyConflict { product_id: ProductId },

    #[error("Invalid reservation request: {0}")]
    InvalidRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Inventory storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

impl From<InventoryError> for ParticipantError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::ProductNotFound(id) => ParticipantError::not_found(Entity::Product, id),
            InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => ParticipantError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            InventoryError::ConcurrencyConflict { product_id } => {
                ParticipantError::ConcurrencyConflict { product_id }
            }
            InventoryError::InvalidRequest(reason) => ParticipantError::InvalidCommand {
                command: common::commands::INVENTORY_RESERVE.to_string(),
                reason,
            },
            other => ParticipantError::internal(other.to_string()),
        }
    }
}
