use async_trait::async_trait;
use common::{Money, OrderId, PaymentId, PaymentStatus};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::repository::{Claim, PaymentRepository};
use crate::{Payment, PaymentError, Result};

const COLUMNS: &str = "id, order_id, amount, status, transaction_date";

/// PostgreSQL-backed payment repository.
#[derive(Clone)]
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

fn decode_error(column: &str, message: String) -> PaymentError {
    PaymentError::Database(sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    })
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the payment migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        let mut migrator = sqlx::migrate!("../../migrations/payments");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let amount: Decimal = row.try_get("amount")?;
        let status: String = row.try_get("status")?;
        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            amount: Money::from_decimal(amount)
                .ok_or_else(|| decode_error("amount", format!("out of range: {amount}")))?,
            status: PaymentStatus::parse(&status)
                .ok_or_else(|| decode_error("status", format!("unknown status: {status}")))?,
            transaction_date: row.try_get("transaction_date")?,
        })
    }

    async fn update_status(
        &self,
        order_id: OrderId,
        status: PaymentStatus,
        condition: &str,
    ) -> Result<Option<Payment>> {
        let sql = format!(
            "UPDATE payments SET status = $2 WHERE order_id = $1 AND {condition} RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let sql = format!("SELECT {COLUMNS} FROM payments WHERE order_id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn claim(&self, payment: Payment) -> Result<Claim> {
        let sql = format!(
            r#"
            INSERT INTO payments (id, order_id, amount, status, transaction_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING {COLUMNS}
            "#
        );
        let inserted = sqlx::query(&sql)
            .bind(payment.id.as_uuid())
            .bind(payment.order_id.as_uuid())
            .bind(payment.amount.to_decimal())
            .bind(payment.status.as_str())
            .bind(payment.transaction_date)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = inserted {
            return Ok(Claim::Created(Self::row_to_payment(row)?));
        }

        match self.get_by_order(payment.order_id).await? {
            Some(existing) => Ok(Claim::Existing(existing)),
            None => Err(PaymentError::Unavailable(format!(
                "payment for order {} vanished after conflict",
                payment.order_id
            ))),
        }
    }

    async fn settle(&self, order_id: OrderId, status: PaymentStatus) -> Result<Option<Payment>> {
        self.update_status(order_id, status, "status = 'PENDING'")
            .await
    }

    async fn mark_refunded(&self, order_id: OrderId) -> Result<Option<Payment>> {
        self.update_status(order_id, PaymentStatus::Refunded, "status <> 'REFUNDED'")
            .await
    }
}
