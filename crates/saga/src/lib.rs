//! Checkout saga orchestration.
//!
//! A checkout runs four forward steps, each on a different participant:
//! 1. Create the order
//! 2. Reserve inventory
//! 3. Process payment
//! 4. Confirm the order
//!
//! Every step is logged to the saga store before and after it runs. If a step
//! fails, the compensations for the steps the saga had reached are attempted
//! (refund, release, cancel) and the original failure is returned.

pub mod checkout;
pub mod clients;
pub mod error;
pub mod orchestrator;
pub mod plan;

pub use checkout::{Checkout, CheckoutItem, CheckoutRequest, CheckoutResponse, ORDER_PLACED};
pub use clients::{InventoryClient, OrderClient, PaymentClient};
pub use error::{Result, SagaError, StepError};
pub use orchestrator::{RecoverySummary, SagaOrchestrator};
pub use plan::{COMPENSATION, CompensationAction, compensation_plan};
