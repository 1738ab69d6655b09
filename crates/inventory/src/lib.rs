//! Inventory reservation engine.
//!
//! Owns product stock and per-order reservations. Stock changes are
//! conditional updates applied atomically per reservation, so concurrent
//! orders for the same product can never oversell. Reservations are keyed by
//! order id, which makes `reserve` and `release` safe to repeat.

pub mod error;
pub mod handler;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod repository;
pub mod seed;
pub mod service;

pub use error::{InventoryError, Result};
pub use handler::InventoryHandler;
pub use memory::InMemoryInventoryRepository;
pub use model::{Product, RESERVATION_TTL, Reservation};
pub use postgres::PostgresInventoryRepository;
pub use repository::InventoryRepository;
pub use service::InventoryService;
