//! RabbitMQ command channel.
//!
//! Commands are published to the participant's durable queue through the
//! default exchange. The AMQP `type` property carries the command name.
//! Replies come back over RabbitMQ direct reply-to and are matched on the
//! correlation id. Consumers take one unacknowledged message at a time and
//! acknowledge only after the reply is published, so a consumer that dies
//! mid-command gets it redelivered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{Participant, ParticipantError};
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::CommandChannel;
use crate::error::{ChannelError, Result};
use crate::handler::{CommandHandler, Reply};

const REPLY_TO: &str = "amq.rabbitmq.reply-to";

/// Connection settings for [`AmqpCommandChannel`].
#[derive(Debug, Clone)]
pub struct AmqpConfig {
    /// AMQP connection URL (e.g., amqp://localhost:5672).
    pub url: String,
    /// How long a sender waits for a reply.
    pub timeout: Duration,
    /// Unacknowledged commands per consumer.
    pub prefetch: u16,
}

impl AmqpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(5),
            prefetch: 1,
        }
    }
}

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Vec<u8>>>>>;

/// Command channel over RabbitMQ.
pub struct AmqpCommandChannel {
    connection: Connection,
    channel: Channel,
    pending: Pending,
    config: AmqpConfig,
}

fn transport(context: &str, e: lapin::Error) -> ChannelError {
    ChannelError::Transport(format!("{context}: {e}"))
}

async fn declare_queue(channel: &Channel, participant: Participant) -> Result<()> {
    channel
        .queue_declare(
            participant.queue(),
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| transport("Failed to declare queue", e))?;
    Ok(())
}

impl AmqpCommandChannel {
    /// Connects, declares every participant queue and starts the reply listener.
    pub async fn connect(config: AmqpConfig) -> Result<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| transport("Failed to connect", e))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| transport("Failed to create channel", e))?;

        for participant in Participant::ALL {
            declare_queue(&channel, participant).await?;
        }

        // Direct reply-to requires consuming in no-ack mode before publishing.
        let mut replies = channel
            .basic_consume(
                REPLY_TO,
                "checkout-orchestrator",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| transport("Failed to consume replies", e))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let router = pending.clone();
        tokio::spawn(async move {
            while let Some(delivery) = replies.next().await {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        error!(error = %e, "Reply consumer failed");
                        break;
                    }
                };
                let Some(correlation_id) = delivery.properties.correlation_id().clone() else {
                    warn!("Reply without correlation id");
                    continue;
                };
                let waiter = router.lock().unwrap().remove(correlation_id.as_str());
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(delivery.data);
                    }
                    None => debug!(%correlation_id, "Late reply discarded"),
                }
            }
        });

        info!(url = %config.url, "Connected to AMQP");
        Ok(Self {
            connection,
            channel,
            pending,
            config,
        })
    }

    /// Consumes the handler's participant queue until the connection closes.
    pub async fn serve(&self, handler: Arc<dyn CommandHandler>) -> Result<JoinHandle<()>> {
        let participant = handler.participant();
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| transport("Failed to create channel", e))?;
        declare_queue(&channel, participant).await?;
        channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| transport("Failed to set prefetch", e))?;

        let mut consumer = channel
            .basic_consume(
                participant.queue(),
                &format!("{participant}-service"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| transport("Failed to start consumer", e))?;

        info!(queue = participant.queue(), "Consuming commands");
        Ok(tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        error!(error = %e, %participant, "Command consumer failed");
                        break;
                    }
                };

                let command = delivery
                    .properties
                    .kind()
                    .as_ref()
                    .map(|k| k.as_str().to_string())
                    .unwrap_or_default();
                let result = match serde_json::from_slice::<serde_json::Value>(&delivery.data) {
                    Ok(payload) => handler.handle(&command, payload).await,
                    Err(e) => Err(ParticipantError::InvalidCommand {
                        command: command.clone(),
                        reason: e.to_string(),
                    }),
                };

                if let (Some(reply_to), Some(correlation_id)) = (
                    delivery.properties.reply_to().clone(),
                    delivery.properties.correlation_id().clone(),
                ) {
                    let body = match serde_json::to_vec(&Reply::from(result)) {
                        Ok(body) => body,
                        Err(e) => {
                            error!(error = %e, command, "Failed to encode reply");
                            continue;
                        }
                    };
                    let properties = BasicProperties::default()
                        .with_correlation_id(correlation_id)
                        .with_content_type("application/json".to_string().into());
                    if let Err(e) = channel
                        .basic_publish(
                            "",
                            reply_to.as_str(),
                            BasicPublishOptions::default(),
                            &body,
                            properties,
                        )
                        .await
                    {
                        // Leave unacked; the broker redelivers on channel close.
                        error!(error = %e, command, "Failed to publish reply");
                        continue;
                    }
                }

                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!(error = %e, command, "Failed to ack command");
                }
            }
        }))
    }
}

#[async_trait]
impl CommandChannel for AmqpCommandChannel {
    #[tracing::instrument(skip(self, participant, payload), fields(participant = %participant))]
    async fn send(
        &self,
        participant: Participant,
        command: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let body = serde_json::to_vec(&payload)?;
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert(correlation_id.clone(), tx);

        let properties = BasicProperties::default()
            .with_correlation_id(correlation_id.clone().into())
            .with_reply_to(REPLY_TO.to_string().into())
            .with_kind(command.to_string().into())
            .with_content_type("application/json".to_string().into())
            .with_delivery_mode(2);

        let published = self
            .channel
            .basic_publish(
                "",
                participant.queue(),
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await;
        if let Err(e) = published {
            self.pending.lock().unwrap().remove(&correlation_id);
            return Err(transport("Failed to publish command", e));
        }

        let timeout = self.config.timeout;
        let bytes = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(bytes)) => bytes,
            _ => {
                self.pending.lock().unwrap().remove(&correlation_id);
                metrics::counter!("channel_timeouts_total", "participant" => participant.as_str())
                    .increment(1);
                warn!(command, ?timeout, "No reply received");
                return Err(ChannelError::Timeout {
                    participant,
                    command: command.to_string(),
                    timeout,
                });
            }
        };

        match serde_json::from_slice::<Reply>(&bytes)? {
            Reply::Ok(value) => Ok(value),
            Reply::Err(source) => Err(ChannelError::Rejected {
                participant,
                command: command.to_string(),
                source,
            }),
        }
    }
}
