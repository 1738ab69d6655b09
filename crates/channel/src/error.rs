use std::time::Duration;

use common::{ErrorKind, Participant, ParticipantError};
use thiserror::Error;

/// Errors observed by the sender of a command.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No reply arrived within the bound. The command may or may not have run.
    #[error("No reply from {participant} to '{command}' within {timeout:?}")]
    Timeout {
        participant: Participant,
        command: String,
        timeout: Duration,
    },

    /// The participant handled the command and replied with a failure.
    #[error("{participant} rejected '{command}': {source}")]
    Rejected {
        participant: Participant,
        command: String,
        #[source]
        source: ParticipantError,
    },

    /// Nothing consumes the participant's queue.
    #[error("No consumer registered for {0} commands")]
    NoConsumer(Participant),

    /// The transport failed before a reply could be awaited.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A payload or reply could not be (de)serialized.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl ChannelError {
    /// Classifies the failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::Timeout { .. } => ErrorKind::Timeout,
            ChannelError::Rejected { source, .. } => source.kind(),
            ChannelError::NoConsumer(_) | ChannelError::Transport(_) => ErrorKind::Transport,
            ChannelError::Codec(_) => ErrorKind::Invalid,
        }
    }

    /// Returns the participant's own failure, if it replied with one.
    pub fn participant_error(&self) -> Option<&ParticipantError> {
        match self {
            ChannelError::Rejected { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
