//! Durable saga state.
//!
//! Holds one [`SagaInstance`] per checkout and an append-only log of
//! [`SagaEvent`]s. Every decision the orchestrator makes about a saga can be
//! rebuilt from these two records alone.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::{Result, SagaStoreError};
pub use memory::InMemorySagaStore;
pub use postgres::PostgresSagaStore;
pub use record::{EventOutcome, SagaEvent, SagaInstance, SagaStatus, SagaStep};
pub use store::{SagaStore, SagaStoreExt};
