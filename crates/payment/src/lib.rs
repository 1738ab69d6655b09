//! Payment ledger.
//!
//! One payment record per order. Charging an order twice returns the first
//! outcome; refunding twice, or refunding an order that was never charged,
//! is a no-op.

pub mod error;
pub mod gateway;
pub mod handler;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod repository;
pub mod service;

pub use error::{PaymentError, Result};
pub use gateway::{
    AlwaysApprove, AlwaysDecline, DeclineAbove, GatewayOutcome, PaymentGateway, SimulatedGateway,
};
pub use handler::PaymentHandler;
pub use memory::InMemoryPaymentRepository;
pub use model::Payment;
pub use postgres::PostgresPaymentRepository;
pub use repository::{Claim, PaymentRepository};
pub use service::PaymentService;
