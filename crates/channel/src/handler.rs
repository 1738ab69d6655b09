//! Participant side of the channel.

use async_trait::async_trait;
use common::{Participant, ParticipantError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Consumes the commands addressed to one participant.
///
/// Implementations must be idempotent: the channel may deliver the same
/// command more than once.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The participant whose queue this handler consumes.
    fn participant(&self) -> Participant;

    /// Handles one command and produces the reply payload.
    async fn handle(
        &self,
        command: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ParticipantError>;
}

/// Reply envelope for transports that carry raw bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Reply {
    Ok(serde_json::Value),
    Err(ParticipantError),
}

impl From<Result<serde_json::Value, ParticipantError>> for Reply {
    fn from(result: Result<serde_json::Value, ParticipantError>) -> Self {
        match result {
            Ok(value) => Reply::Ok(value),
            Err(err) => Reply::Err(err),
        }
    }
}

impl From<Reply> for Result<serde_json::Value, ParticipantError> {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Ok(value) => Ok(value),
            Reply::Err(err) => Err(err),
        }
    }
}

/// Decodes a command payload, reporting malformed input as `InvalidCommand`.
pub fn decode<T: DeserializeOwned>(
    command: &str,
    payload: serde_json::Value,
) -> Result<T, ParticipantError> {
    serde_json::from_value(payload).map_err(|e| ParticipantError::InvalidCommand {
        command: command.to_string(),
        reason: e.to_string(),
    })
}

/// Encodes a reply payload.
pub fn encode<T: Serialize>(value: &T) -> Result<serde_json::Value, ParticipantError> {
    serde_json::to_value(value).map_err(|e| ParticipantError::internal(e.to_string()))
}
