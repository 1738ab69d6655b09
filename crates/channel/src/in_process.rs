//! In-process command channel backed by tokio queues.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{Participant, ParticipantError};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::{ChannelError, Result};
use crate::handler::CommandHandler;
use crate::CommandChannel;

type ReplySender = oneshot::Sender<std::result::Result<serde_json::Value, ParticipantError>>;

/// Tuning for [`InProcessChannel`].
#[derive(Debug, Clone)]
pub struct InProcessChannelConfig {
    /// How long a sender waits for a reply.
    pub timeout: Duration,
    /// Worker slots per participant. Each slot holds one unacknowledged command.
    pub workers: usize,
    /// Capacity of each participant queue.
    pub queue_capacity: usize,
    /// Redeliveries of a command whose handler panicked before the command is dropped.
    pub max_redeliveries: u32,
}

impl Default for InProcessChannelConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            workers: 1,
            queue_capacity: 256,
            max_redeliveries: 3,
        }
    }
}

/// Delivery faults injected by tests.
///
/// Duplicated commands are enqueued ahead of the original and their replies
/// discarded. A dropped reply lets the handler run but never answers the
/// sender, who observes a timeout.
#[derive(Debug, Clone, Default)]
pub struct ChannelFaults {
    duplicates: HashMap<String, u32>,
    dropped_replies: HashMap<String, u32>,
}

impl ChannelFaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers every `command` `extra` additional times.
    pub fn with_duplicates(mut self, command: &str, extra: u32) -> Self {
        self.duplicates.insert(command.to_string(), extra);
        self
    }

    /// Drops the replies of the next `count` sends of `command`.
    pub fn with_dropped_replies(mut self, command: &str, count: u32) -> Self {
        self.dropped_replies.insert(command.to_string(), count);
        self
    }

    fn take(&mut self, command: &str) -> (u32, bool) {
        let extra = self.duplicates.get(command).copied().unwrap_or(0);
        let drop_reply = match self.dropped_replies.get_mut(command) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        (extra, drop_reply)
    }
}

struct Delivery {
    command: String,
    payload: serde_json::Value,
    reply: Option<ReplySender>,
    drop_reply: bool,
    attempt: u32,
}

struct Inner {
    config: InProcessChannelConfig,
    queues: RwLock<HashMap<Participant, mpsc::Sender<Delivery>>>,
    faults: RwLock<ChannelFaults>,
}

/// Command channel whose participants run as tokio tasks in this process.
///
/// Each participant gets a bounded queue consumed by `workers` tasks. A worker
/// takes one command, runs the handler to completion and only then takes the
/// next one. A handler that panics is treated as an unacknowledged delivery
/// and the command is requeued.
#[derive(Clone)]
pub struct InProcessChannel {
    inner: Arc<Inner>,
}

impl InProcessChannel {
    pub fn new(config: InProcessChannelConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                queues: RwLock::new(HashMap::new()),
                faults: RwLock::new(ChannelFaults::default()),
            }),
        }
    }

    pub fn config(&self) -> &InProcessChannelConfig {
        &self.inner.config
    }

    /// Starts consuming the handler's participant queue.
    ///
    /// Registering a second handler for the same participant replaces the
    /// first once its queued commands drain. Must be called within a tokio runtime.
    pub fn register(&self, handler: Arc<dyn CommandHandler>) {
        let participant = handler.participant();
        let (tx, rx) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for slot in 0..self.inner.config.workers.max(1) {
            tokio::spawn(run_worker(
                participant,
                slot,
                handler.clone(),
                rx.clone(),
                tx.downgrade(),
                self.inner.config.max_redeliveries,
            ));
        }

        self.inner.queues.write().unwrap().insert(participant, tx);
        debug!(%participant, workers = self.inner.config.workers, "Registered command handler");
    }

    /// Replaces the injected delivery faults.
    pub fn set_faults(&self, faults: ChannelFaults) {
        *self.inner.faults.write().unwrap() = faults;
    }

    pub fn clear_faults(&self) {
        self.set_faults(ChannelFaults::default());
    }
}

impl Default for InProcessChannel {
    fn default() -> Self {
        Self::new(InProcessChannelConfig::default())
    }
}

#[async_trait]
impl CommandChannel for InProcessChannel {
    #[tracing::instrument(skip(self, participant, payload), fields(participant = %participant))]
    async fn send(
        &self,
        participant: Participant,
        command: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let queue = self
            .inner
            .queues
            .read()
            .unwrap()
            .get(&participant)
            .cloned()
            .ok_or(ChannelError::NoConsumer(participant))?;
        let (extra, drop_reply) = self.inner.faults.write().unwrap().take(command);
        let timeout = self.inner.config.timeout;

        let exchange = async {
            for _ in 0..extra {
                let duplicate = Delivery {
                    command: command.to_string(),
                    payload: payload.clone(),
                    reply: None,
                    drop_reply: true,
                    attempt: 0,
                };
                queue
                    .send(duplicate)
                    .await
                    .map_err(|_| ChannelError::NoConsumer(participant))?;
            }

            let (tx, rx) = oneshot::channel();
            let delivery = Delivery {
                command: command.to_string(),
                payload,
                reply: Some(tx),
                drop_reply,
                attempt: 0,
            };
            queue
                .send(delivery)
                .await
                .map_err(|_| ChannelError::NoConsumer(participant))?;

            // A closed reply slot means the reply was lost.
            Ok::<_, ChannelError>(rx.await.ok())
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(Some(Ok(value)))) => Ok(value),
            Ok(Ok(Some(Err(source)))) => Err(ChannelError::Rejected {
                participant,
                command: command.to_string(),
                source,
            }),
            Ok(Err(e)) => Err(e),
            Ok(Ok(None)) | Err(_) => {
                metrics::counter!("channel_timeouts_total", "participant" => participant.as_str())
                    .increment(1);
                warn!(command, ?timeout, "No reply received");
                Err(ChannelError::Timeout {
                    participant,
                    command: command.to_string(),
                    timeout,
                })
            }
        }
    }
}

async fn run_worker(
    participant: Participant,
    slot: usize,
    handler: Arc<dyn CommandHandler>,
    queue: Arc<Mutex<mpsc::Receiver<Delivery>>>,
    requeue: mpsc::WeakSender<Delivery>,
    max_redeliveries: u32,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(mut delivery) = next else {
            debug!(%participant, slot, "Command queue closed, worker exiting");
            break;
        };

        let task_handler = handler.clone();
        let command = delivery.command.clone();
        let payload = delivery.payload.clone();
        let outcome =
            tokio::spawn(async move { task_handler.handle(&command, payload).await }).await;

        match outcome {
            Ok(result) => {
                if let Some(reply) = delivery.reply.take() {
                    if !delivery.drop_reply {
                        // The sender may have given up already.
                        let _ = reply.send(result);
                    }
                }
            }
            Err(join_error) => {
                let command = delivery.command.clone();
                if delivery.attempt >= max_redeliveries {
                    error!(
                        %participant,
                        command,
                        attempts = delivery.attempt + 1,
                        "Handler failed on every delivery, dropping command: {join_error}"
                    );
                    continue;
                }
                let Some(sender) = requeue.upgrade() else {
                    continue;
                };
                delivery.attempt += 1;
                metrics::counter!("channel_redeliveries_total", "participant" => participant.as_str())
                    .increment(1);
                warn!(%participant, command, attempt = delivery.attempt, "Redelivering command after handler failure");
                // Requeue off the worker so a full queue cannot stall it.
                tokio::spawn(async move {
                    let _ = sender.send(delivery).await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandChannelExt;
    use common::{Entity, OrderId, OrderRef};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Echo {
        calls: AtomicU32,
        panics_left: AtomicU32,
        delay: Duration,
    }

    impl Echo {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                panics_left: AtomicU32::new(0),
                delay: Duration::ZERO,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommandHandler for Echo {
        fn participant(&self) -> Participant {
            Participant::Order
        }

        async fn handle(
            &self,
            command: &str,
            payload: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ParticipantError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self
                .panics_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                panic!("handler crashed");
            }
            match command {
                "order.get" => Ok(payload),
                _ => Err(ParticipantError::not_found(Entity::Order, "missing")),
            }
        }
    }

    fn channel(timeout: Duration) -> InProcessChannel {
        InProcessChannel::new(InProcessChannelConfig {
            timeout,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_request_reply() {
        let channel = channel(Duration::from_secs(1));
        let handler = Echo::new();
        channel.register(handler.clone());

        let request = OrderRef::new(OrderId::new());
        let reply: OrderRef = channel
            .request(Participant::Order, "order.get", &request)
            .await
            .unwrap();

        assert_eq!(reply, request);
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_participant_error_is_rejected() {
        let channel = channel(Duration::from_secs(1));
        channel.register(Echo::new());

        let err = channel
            .send(Participant::Order, "order.cancel", serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(
            err.participant_error(),
            Some(ParticipantError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_unregistered_participant() {
        let channel = channel(Duration::from_secs(1));
        let err = channel
            .send(Participant::Payment, "payment.process", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NoConsumer(Participant::Payment)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out() {
        let channel = channel(Duration::from_millis(100));
        let handler = Arc::new(Echo {
            calls: AtomicU32::new(0),
            panics_left: AtomicU32::new(0),
            delay: Duration::from_secs(10),
        });
        channel.register(handler);

        let err = channel
            .send(Participant::Order, "order.get", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_redelivered() {
        let channel = channel(Duration::from_secs(5));
        let handler = Echo::new();
        handler.panics_left.store(2, Ordering::SeqCst);
        channel.register(handler.clone());

        let reply = channel
            .send(Participant::Order, "order.get", serde_json::json!({"n": 1}))
            .await
            .unwrap();

        assert_eq!(reply, serde_json::json!({"n": 1}));
        assert_eq!(handler.calls(), 3);
    }

    #[tokio::test]
    async fn test_duplicates_run_before_original() {
        let channel = channel(Duration::from_secs(1));
        let handler = Echo::new();
        channel.register(handler.clone());
        channel.set_faults(ChannelFaults::new().with_duplicates("order.get", 2));

        channel
            .send(Participant::Order, "order.get", serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(handler.calls(), 3);
    }

    #[tokio::test]
    async fn test_dropped_reply_is_a_timeout_after_handler_ran() {
        let channel = channel(Duration::from_secs(1));
        let handler = Echo::new();
        channel.register(handler.clone());
        channel.set_faults(ChannelFaults::new().with_dropped_replies("order.get", 1));

        let err = channel
            .send(Participant::Order, "order.get", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout { .. }));
        assert_eq!(handler.calls(), 1);

        // Only the next send was affected.
        channel
            .send(Participant::Order, "order.get", serde_json::json!({}))
            .await
            .unwrap();
    }
}
