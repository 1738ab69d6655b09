//! PostgreSQL integration tests
//!
//! Requires Docker. Run with:
//!
//! ```bash
//! cargo test -p saga-store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, SagaId};
use saga_store::{
    EventOutcome, PostgresSagaStore, SagaInstance, SagaStatus, SagaStep, SagaStore,
    SagaStoreError, SagaStoreExt,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/saga/20240101000400_create_saga_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresSagaStore {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE saga_logs, saga_state")
        .execute(&pool)
        .await
        .unwrap();

    PostgresSagaStore::new(pool)
}

#[tokio::test]
#[ignore = "requires Docker for the Postgres testcontainer"]
async fn test_instance_lifecycle() {
    let store = get_test_store().await;
    let saga = SagaInstance::start(SagaId::new(), OrderId::new(), Utc::now());
    store.create(saga.clone()).await.unwrap();

    assert!(matches!(
        store.create(saga.clone()).await,
        Err(SagaStoreError::AlreadyExists(_))
    ));

    store
        .advance(saga.saga_id, SagaStep::InventoryReserved, SagaStatus::Running)
        .await
        .unwrap();
    assert!(matches!(
        store
            .advance(saga.saga_id, SagaStep::OrderCreated, SagaStatus::Running)
            .await,
        Err(SagaStoreError::InvalidTransition { .. })
    ));

    store
        .advance(saga.saga_id, SagaStep::InventoryReserved, SagaStatus::Compensating)
        .await
        .unwrap();
    assert_eq!(store.find_incomplete().await.unwrap().len(), 1);

    let compensated = store
        .advance(saga.saga_id, SagaStep::Compensated, SagaStatus::Compensated)
        .await
        .unwrap();
    assert_eq!(compensated.status, SagaStatus::Compensated);
    assert_eq!(store.load(saga.saga_id).await.unwrap().status, SagaStatus::Compensated);
    assert!(store.find_incomplete().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker for the Postgres testcontainer"]
async fn test_event_log_order_and_payload() {
    let store = get_test_store().await;
    let saga = SagaInstance::start(SagaId::new(), OrderId::new(), Utc::now());
    store.create(saga.clone()).await.unwrap();

    store
        .record(saga.saga_id, "ORDER_CREATED", EventOutcome::Started, serde_json::json!({}))
        .await
        .unwrap();
    store
        .record(
            saga.saga_id,
            "ORDER_CREATED",
            EventOutcome::Completed,
            serde_json::json!({"result": {"id": saga.order_id}}),
        )
        .await
        .unwrap();
    store
        .record(
            saga.saga_id,
            "CANCEL_ORDER",
            EventOutcome::Completed,
            serde_json::json!({}),
        )
        .await
        .unwrap();

    let events = store.events(saga.saga_id).await.unwrap();
    let steps: Vec<_> = events.iter().map(|e| (e.step.as_str(), e.outcome)).collect();
    assert_eq!(
        steps,
        vec![
            ("ORDER_CREATED", EventOutcome::Started),
            ("ORDER_CREATED", EventOutcome::Completed),
            ("CANCEL_ORDER", EventOutcome::Completed),
        ]
    );
    assert_eq!(
        events[1].payload["result"]["id"],
        serde_json::json!(saga.order_id)
    );
}
