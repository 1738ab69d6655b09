//! Order ledger.
//!
//! Owns orders and their line items and records saga progress on the order
//! row. Create, confirm and cancel are all safe to repeat.

pub mod error;
pub mod handler;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod repository;
pub mod service;

pub use error::{OrderError, Result};
pub use handler::OrderHandler;
pub use memory::InMemoryOrderRepository;
pub use model::{Order, OrderItem, saga_state};
pub use postgres::PostgresOrderRepository;
pub use repository::OrderRepository;
pub use service::OrderService;
