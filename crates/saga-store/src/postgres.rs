use async_trait::async_trait;
use chrono::Utc;
use common::{EventId, OrderId, SagaId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::store::{SagaStore, check_advance};
use crate::{
    EventOutcome, Result, SagaEvent, SagaInstance, SagaStatus, SagaStep, SagaStoreError,
};

/// PostgreSQL-backed saga store.
///
/// Instances live in `saga_state`, events in `saga_logs`.
#[derive(Clone)]
pub struct PostgresSagaStore {
    pool: PgPool,
}

fn decode_error(column: &str, value: &str) -> SagaStoreError {
    SagaStoreError::Database(sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unknown value: {value}").into(),
    })
}

impl PostgresSagaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the saga store migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        let mut migrator = sqlx::migrate!("../../migrations/saga");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await?;
        Ok(())
    }

    fn row_to_instance(row: PgRow) -> Result<SagaInstance> {
        let step: String = row.try_get("current_step")?;
        let status: String = row.try_get("status")?;
        Ok(SagaInstance {
            saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            current_step: SagaStep::parse(&step)
                .ok_or_else(|| decode_error("current_step", &step))?,
            status: SagaStatus::parse(&status).ok_or_else(|| decode_error("status", &status))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_event(row: PgRow) -> Result<SagaEvent> {
        let outcome: String = row.try_get("outcome")?;
        Ok(SagaEvent {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
            step: row.try_get("step")?,
            outcome: EventOutcome::parse(&outcome)
                .ok_or_else(|| decode_error("outcome", &outcome))?,
            payload: row.try_get("payload")?,
            timestamp: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl SagaStore for PostgresSagaStore {
    async fn create(&self, instance: SagaInstance) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO saga_state (saga_id, order_id, current_step, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (saga_id) DO NOTHING
            "#,
        )
        .bind(instance.saga_id.as_uuid())
        .bind(instance.order_id.as_uuid())
        .bind(instance.current_step.as_str())
        .bind(instance.status.as_str())
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(SagaStoreError::AlreadyExists(instance.saga_id));
        }
        Ok(())
    }

    async fn get(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        sqlx::query(
            r#"
            SELECT saga_id, order_id, current_step, status, created_at, updated_at
            FROM saga_state
            WHERE saga_id = $1
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_instance)
        .transpose()
    }

    async fn advance(
        &self,
        saga_id: SagaId,
        step: SagaStep,
        status: SagaStatus,
    ) -> Result<SagaInstance> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT saga_id, order_id, current_step, status, created_at, updated_at
            FROM saga_state
            WHERE saga_id = $1
            FOR UPDATE
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(SagaStoreError::NotFound(saga_id))?;

        let mut instance = Self::row_to_instance(row)?;
        check_advance(&instance, step, status)?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE saga_state
            SET current_step = $2, status = $3, updated_at = $4
            WHERE saga_id = $1
            "#,
        )
        .bind(saga_id.as_uuid())
        .bind(step.as_str())
        .bind(status.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        instance.current_step = step;
        instance.status = status;
        instance.updated_at = now;
        Ok(instance)
    }

    async fn append_event(&self, event: SagaEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO saga_logs (id, saga_id, step, outcome, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(event.saga_id.as_uuid())
        .bind(&event.step)
        .bind(event.outcome.as_str())
        .bind(&event.payload)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn events(&self, saga_id: SagaId) -> Result<Vec<SagaEvent>> {
        sqlx::query(
            r#"
            SELECT id, saga_id, step, outcome, payload, created_at
            FROM saga_logs
            WHERE saga_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::row_to_event)
        .collect()
    }

    async fn list_by_status(&self, status: SagaStatus) -> Result<Vec<SagaInstance>> {
        sqlx::query(
            r#"
            SELECT saga_id, order_id, current_step, status, created_at, updated_at
            FROM saga_state
            WHERE status = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::row_to_instance)
        .collect()
    }
}
