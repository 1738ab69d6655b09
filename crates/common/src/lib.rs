//! Shared contract between the saga orchestrator and its participants.
//!
//! Everything that crosses the command channel lives here: typed identifiers,
//! the [`Money`] amount type, command names and payloads, and the closed
//! [`ParticipantError`] enumeration used to report failures over the wire.

pub mod commands;
pub mod error;
pub mod money;
pub mod types;

pub use commands::{
    Ack, CreateOrderCommand, OrderLine, OrderRef, OrderStatus, OrderView, Participant,
    PaymentStatus, PaymentView, ProcessPaymentCommand, ReservationLine, ReservationStatus,
    ReservationView, ReserveInventoryCommand,
};
pub use error::{Entity, ErrorKind, ParticipantError};
pub use money::Money;
pub use types::{EventId, OrderId, PaymentId, ProductId, ReservationId, SagaId, UserId};
