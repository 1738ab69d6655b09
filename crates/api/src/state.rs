//! Process wiring: repositories, participants, command channel and orchestrator.

use std::sync::Arc;

use channel::{
    ChannelError, CommandChannel, CommandHandler, InProcessChannel, InProcessChannelConfig,
};
use inventory::{
    InMemoryInventoryRepository, InventoryError, InventoryHandler, InventoryRepository,
    InventoryService, PostgresInventoryRepository,
};
use order::{InMemoryOrderRepository, OrderHandler, OrderRepository, OrderService, PostgresOrderRepository};
use payment::{
    InMemoryPaymentRepository, PaymentGateway, PaymentHandler, PaymentRepository, PaymentService,
    PostgresPaymentRepository, SimulatedGateway,
};
use saga::SagaOrchestrator;
use saga_store::{InMemorySagaStore, PostgresSagaStore, SagaStore, SagaStoreError};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::info;

use crate::config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: SagaOrchestrator,
    pub inventory: InventoryService,
}

/// Failures while bringing the process up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Saga store error: {0}")]
    SagaStore(#[from] SagaStoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

struct Repositories {
    inventory: Arc<dyn InventoryRepository>,
    payments: Arc<dyn PaymentRepository>,
    orders: Arc<dyn OrderRepository>,
    sagas: Arc<dyn SagaStore>,
}

impl Repositories {
    fn in_memory() -> Self {
        Self {
            inventory: Arc::new(InMemoryInventoryRepository::new()),
            payments: Arc::new(InMemoryPaymentRepository::new()),
            orders: Arc::new(InMemoryOrderRepository::new()),
            sagas: Arc::new(InMemorySagaStore::new()),
        }
    }

    async fn postgres(url: &str) -> Result<Self, StartupError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;

        let inventory = PostgresInventoryRepository::new(pool.clone());
        inventory.run_migrations().await?;
        let payments = PostgresPaymentRepository::new(pool.clone());
        payments.run_migrations().await?;
        let orders = PostgresOrderRepository::new(pool.clone());
        orders.run_migrations().await?;
        let sagas = PostgresSagaStore::new(pool);
        sagas.run_migrations().await?;
        info!("Postgres stores migrated");

        Ok(Self {
            inventory: Arc::new(inventory),
            payments: Arc::new(payments),
            orders: Arc::new(orders),
            sagas: Arc::new(sagas),
        })
    }
}

/// Builds the state from configuration, seeding an empty inventory with the demo catalogue.
pub async fn build_state(config: &Config) -> Result<Arc<AppState>, StartupError> {
    let repositories = match &config.database_url {
        Some(url) => Repositories::postgres(url).await?,
        None => {
            info!("DATABASE_URL not set, using in-memory stores");
            Repositories::in_memory()
        }
    };
    let gateway = Arc::new(SimulatedGateway::new(
        config.payment_gateway_delay,
        config.payment_decline_rate,
    ));
    wire(config, repositories, gateway).await
}

/// Builds an all in-memory state around the given payment gateway.
pub async fn in_memory_state(
    config: &Config,
    gateway: Arc<dyn PaymentGateway>,
) -> Result<Arc<AppState>, StartupError> {
    wire(config, Repositories::in_memory(), gateway).await
}

async fn wire(
    config: &Config,
    repositories: Repositories,
    gateway: Arc<dyn PaymentGateway>,
) -> Result<Arc<AppState>, StartupError> {
    if repositories.inventory.list_products().await?.is_empty() {
        inventory::seed::seed(repositories.inventory.as_ref()).await?;
    }

    let inventory = InventoryService::new(repositories.inventory);
    let handlers: [Arc<dyn CommandHandler>; 3] = [
        Arc::new(OrderHandler::new(OrderService::new(repositories.orders))),
        Arc::new(InventoryHandler::new(inventory.clone())),
        Arc::new(PaymentHandler::new(PaymentService::new(
            repositories.payments,
            gateway,
        ))),
    ];
    let channel = connect_channel(config, handlers).await?;

    Ok(Arc::new(AppState {
        orchestrator: SagaOrchestrator::new(channel, repositories.sagas),
        inventory,
    }))
}

async fn connect_channel(
    config: &Config,
    handlers: [Arc<dyn CommandHandler>; 3],
) -> Result<Arc<dyn CommandChannel>, StartupError> {
    #[cfg(feature = "amqp")]
    if let Some(url) = &config.amqp_url {
        let amqp = channel::AmqpCommandChannel::connect(channel::AmqpConfig {
            timeout: config.command_timeout,
            ..channel::AmqpConfig::new(url.clone())
        })
        .await?;
        for handler in handlers {
            amqp.serve(handler).await?;
        }
        return Ok(Arc::new(amqp));
    }

    let in_process = InProcessChannel::new(InProcessChannelConfig {
        timeout: config.command_timeout,
        workers: config.channel_workers,
        ..InProcessChannelConfig::default()
    });
    for handler in handlers {
        in_process.register(handler);
    }
    info!(
        workers = config.channel_workers,
        timeout_ms = config.command_timeout.as_millis() as u64,
        "In-process command channel ready"
    );
    Ok(Arc::new(in_process))
}
