//! Command channel for saga orchestration.
//!
//! This crate contains:
//! - [`CommandChannel`]: request/reply delivery of a named command to a participant
//! - [`CommandHandler`]: the participant side, one handler per queue
//! - [`InProcessChannel`]: tokio-backed queues with worker slots, used by the
//!   single-process deployment and by tests
//! - `AmqpCommandChannel` (feature `amqp`): RabbitMQ RPC over durable queues
//!
//! Delivery is at-least-once. A command may run more than once, or run without
//! its reply ever reaching the caller, so every handler must be idempotent.

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod error;
pub mod handler;
pub mod in_process;

use async_trait::async_trait;
use common::Participant;
use serde::Serialize;
use serde::de::DeserializeOwned;

#[cfg(feature = "amqp")]
pub use amqp::{AmqpCommandChannel, AmqpConfig};
pub use error::{ChannelError, Result};
pub use handler::{CommandHandler, Reply, decode, encode};
pub use in_process::{ChannelFaults, InProcessChannel, InProcessChannelConfig};

/// Request/reply delivery of commands to participants.
///
/// A call that receives no reply within the channel's timeout fails with
/// [`ChannelError::Timeout`]. The caller cannot tell whether the command ran.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Sends a command and waits for the participant's reply.
    async fn send(
        &self,
        participant: Participant,
        command: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

/// Typed convenience layer over [`CommandChannel`].
#[async_trait]
pub trait CommandChannelExt: CommandChannel {
    /// Serializes the request, sends it, and deserializes the reply.
    async fn request<Req, Res>(
        &self,
        participant: Participant,
        command: &str,
        request: &Req,
    ) -> Result<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;
        let reply = self.send(participant, command, payload).await?;
        Ok(serde_json::from_value(reply)?)
    }
}

impl<T: CommandChannel + ?Sized> CommandChannelExt for T {}

#[async_trait]
impl<T: CommandChannel + ?Sized> CommandChannel for std::sync::Arc<T> {
    async fn send(
        &self,
        participant: Participant,
        command: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        (**self).send(participant, command, payload).await
    }
}
