use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, ReservationId, ReservationLine, ReservationStatus};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::model::merge_lines;
use crate::repository::InventoryRepository;
use crate::{InventoryError, Product, Reservation, Result};

/// PostgreSQL-backed inventory repository.
#[derive(Clone)]
pub struct PostgresInventoryRepository {
    pool: PgPool,
}

fn decode_error(column: &str, message: String) -> InventoryError {
    InventoryError::Database(sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    })
}

fn to_i32(line: &ReservationLine) -> Result<i32> {
    i32::try_from(line.quantity).map_err(|_| {
        InventoryError::InvalidRequest(format!(
            "quantity {} for product {} is too large",
            line.quantity, line.product_id
        ))
    })
}

/// Serialization failures and deadlocks mean another transaction won the race for the row.
fn is_contention(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if matches!(db_err.code().as_deref(), Some("40001" | "40P01"))
    )
}

impl PostgresInventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the inventory migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        let mut migrator = sqlx::migrate!("../../migrations/inventory");
        // Other components share the migrations table.
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let stock: i32 = row.try_get("stock_quantity")?;
        let price: Decimal = row.try_get("price")?;
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            stock_quantity: u32::try_from(stock)
                .map_err(|_| decode_error("stock_quantity", format!("negative: {stock}")))?,
            price: Money::from_decimal(price)
                .ok_or_else(|| decode_error("price", format!("out of range: {price}")))?,
            version: row.try_get("version")?,
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let quantity: i32 = row.try_get("quantity")?;
        let status: String = row.try_get("status")?;
        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            quantity: u32::try_from(quantity)
                .map_err(|_| decode_error("quantity", format!("negative: {quantity}")))?,
            status: ReservationStatus::parse(&status)
                .ok_or_else(|| decode_error("status", format!("unknown status: {status}")))?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

#[async_trait]
impl InventoryRepository for PostgresInventoryRepository {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, stock_quantity, price, version
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT id, name, description, stock_quantity, price, version FROM products ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        let stock = i32::try_from(product.stock_quantity)
            .map_err(|_| InventoryError::InvalidRequest("stock quantity too large".to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, stock_quantity, price, version)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                stock_quantity = EXCLUDED.stock_quantity,
                price = EXCLUDED.price,
                version = products.version + 1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(stock)
        .bind(product.price.to_decimal())
        .bind(product.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, status, expires_at
            FROM reservations
            WHERE order_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn reserve(
        &self,
        order_id: OrderId,
        lines: &[ReservationLine],
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let lines = merge_lines(lines);
        let mut tx = self.pool.begin().await?;

        for line in &lines {
            let updated: Option<i64> = sqlx::query_scalar(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity - $2, version = version + 1
                WHERE id = $1 AND stock_quantity >= $2
                RETURNING version
                "#,
            )
            .bind(line.product_id.as_uuid())
            .bind(to_i32(line)?)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                if is_contention(&e) {
                    InventoryError::ConcurrencyConflict {
                        product_id: line.product_id,
                    }
                } else {
                    e.into()
                }
            })?;

            if updated.is_none() {
                tx.rollback().await?;
                return Err(InventoryError::ConcurrencyConflict {
                    product_id: line.product_id,
                });
            }
        }

        let mut reservations = Vec::with_capacity(lines.len());
        for line in &lines {
            let reservation = Reservation::active(order_id, *line, now);
            let inserted = sqlx::query(
                r#"
                INSERT INTO reservations (id, order_id, product_id, quantity, status, expires_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(reservation.id.as_uuid())
            .bind(order_id.as_uuid())
            .bind(line.product_id.as_uuid())
            .bind(to_i32(line)?)
            .bind(reservation.status.as_str())
            .bind(reservation.expires_at)
            .bind(now)
            .execute(&mut *tx)
            .await;

            // A concurrent delivery of the same command reserved first.
            if let Err(sqlx::Error::Database(db_err)) = &inserted
                && db_err.constraint() == Some("unique_order_product")
            {
                tx.rollback().await?;
                return self.reservations_for_order(order_id).await;
            }
            inserted?;
            reservations.push(reservation);
        }

        tx.commit().await?;
        Ok(reservations)
    }

    async fn release(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        let mut tx = self.pool.begin().await?;

        // Deleting first serializes concurrent releases on the reservation rows.
        let rows = sqlx::query(
            r#"
            DELETE FROM reservations
            WHERE order_id = $1
            RETURNING id, order_id, product_id, quantity, status, expires_at
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *tx)
        .await?;

        let mut reservations = rows
            .into_iter()
            .map(Self::row_to_reservation)
            .collect::<Result<Vec<_>>>()?;
        reservations.sort_by_key(|r| r.product_id);

        for reservation in &reservations {
            sqlx::query(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity + $2, version = version + 1
                WHERE id = $1
                "#,
            )
            .bind(reservation.product_id.as_uuid())
            .bind(reservation.quantity as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(reservations)
    }
}
