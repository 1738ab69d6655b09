use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderStatus, ProductId, UserId};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::repository::OrderRepository;
use crate::{Order, OrderError, OrderItem, Result};

/// PostgreSQL-backed order repository.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

fn decode_error(column: &str, message: String) -> OrderError {
    OrderError::Database(sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    })
}

fn money(column: &str, amount: Decimal) -> Result<Money> {
    Money::from_decimal(amount).ok_or_else(|| decode_error(column, format!("out of range: {amount}")))
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the order migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        let mut migrator = sqlx::migrate!("../../migrations/orders");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await
    }

    fn row_to_item(row: PgRow) -> Result<OrderItem> {
        let quantity: i32 = row.try_get("quantity")?;
        Ok(OrderItem {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            quantity: u32::try_from(quantity)
                .map_err(|_| decode_error("quantity", format!("negative: {quantity}")))?,
            price_at_purchase: money("price_at_purchase", row.try_get("price_at_purchase")?)?,
        })
    }

    fn row_to_order(row: PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: row.try_get::<Option<Uuid>, _>("user_id")?.map(UserId::from_uuid),
            total_amount: money("total_amount", row.try_get("total_amount")?)?,
            status: OrderStatus::parse(&status)
                .ok_or_else(|| decode_error("status", format!("unknown status: {status}")))?,
            saga_state: row.try_get("saga_state")?,
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn insert(&self, order: Order) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO orders (id, user_id, total_amount, status, saga_state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.map(|u| u.as_uuid()))
        .bind(order.total_amount.to_decimal())
        .bind(order.status.as_str())
        .bind(&order.saga_state)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            tx.rollback().await?;
            return self
                .get(order.id)
                .await?
                .ok_or(OrderError::NotFound(order.id));
        }

        for (position, item) in order.items.iter().enumerate() {
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                OrderError::InvalidOrder(format!("quantity {} is too large", item.quantity))
            })?;
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, price_at_purchase, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order.id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(quantity)
            .bind(item.price_at_purchase.to_decimal())
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let Some(row) = sqlx::query(
            r#"
            SELECT id, user_id, total_amount, status, saga_state, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, price_at_purchase
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::row_to_item)
        .collect::<Result<Vec<_>>>()?;

        Self::row_to_order(row, items).map(Some)
    }

    async fn transition(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        saga_state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, saga_state = $4, updated_at = $5
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(saga_state)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(order_id).await
    }
}
