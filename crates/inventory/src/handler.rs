use async_trait::async_trait;
use channel::{CommandHandler, decode, encode};
use common::commands::{INVENTORY_RELEASE, INVENTORY_RESERVE};
use common::{Ack, OrderRef, Participant, ParticipantError, ReservationView, ReserveInventoryCommand};

use crate::InventoryService;

/// Serves `inventory.*` commands.
pub struct InventoryHandler {
    service: InventoryService,
}

impl InventoryHandler {
    pub fn new(service: InventoryService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl CommandHandler for InventoryHandler {
    fn participant(&self) -> Participant {
        Participant::Inventory
    }

    async fn handle(
        &self,
        command: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ParticipantError> {
        match command {
            INVENTORY_RESERVE => {
                let cmd: ReserveInventoryCommand = decode(command, payload)?;
                let reservations = self.service.reserve(cmd.order_id, &cmd.items).await?;
                let views: Vec<ReservationView> =
                    reservations.iter().map(|r| r.to_view()).collect();
                encode(&views)
            }
            INVENTORY_RELEASE => {
                let cmd: OrderRef = decode(command, payload)?;
                self.service.release(cmd.order_id).await?;
                encode(&Ack::ok())
            }
            other => Err(ParticipantError::InvalidCommand {
                command: other.to_string(),
                reason: "unknown inventory command".to_string(),
            }),
        }
    }
}
