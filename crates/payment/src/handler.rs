use async_trait::async_trait;
use channel::{CommandHandler, decode, encode};
use common::commands::{PAYMENT_PROCESS, PAYMENT_REFUND};
use common::{Ack, OrderRef, Participant, ParticipantError, ProcessPaymentCommand};

use crate::PaymentService;

/// Serves `payment.*` commands.
pub struct PaymentHandler {
    service: PaymentService,
}

impl PaymentHandler {
    pub fn new(service: PaymentService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl CommandHandler for PaymentHandler {
    fn participant(&self) -> Participant {
        Participant::Payment
    }

    async fn handle(
        &self,
        command: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ParticipantError> {
        match command {
            PAYMENT_PROCESS => {
                let cmd: ProcessPaymentCommand = decode(command, payload)?;
                let payment = self.service.process(cmd.order_id, cmd.amount).await?;
                encode(&payment.to_view())
            }
            PAYMENT_REFUND => {
                let cmd: OrderRef = decode(command, payload)?;
                self.service.refund(cmd.order_id).await?;
                encode(&Ack::ok())
            }
            other => Err(ParticipantError::InvalidCommand {
                command: other.to_string(),
                reason: "unknown payment command".to_string(),
            }),
        }
    }
}
