use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReservationLine};

use crate::{Product, Reservation, Result};

/// Storage for products and reservations.
///
/// Stock only changes through [`reserve`](InventoryRepository::reserve) and
/// [`release`](InventoryRepository::release), both of which apply their
/// changes atomically.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Inserts or replaces a product.
    async fn upsert_product(&self, product: Product) -> Result<()>;

    /// All reservations held for an order.
    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>>;

    /// Decrements stock for every line and records the reservations, all or nothing.
    ///
    /// Each decrement is conditional on the product still having enough stock
    /// at write time. If any condition fails the whole attempt is rolled back
    /// with `ConcurrencyConflict`. If another attempt for the same order won
    /// the race, its reservations are returned instead.
    async fn reserve(
        &self,
        order_id: OrderId,
        lines: &[ReservationLine],
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>>;

    /// Returns reserved stock and deletes the order's reservations.
    ///
    /// Returns the released reservations; empty if there were none.
    async fn release(&self, order_id: OrderId) -> Result<Vec<Reservation>>;
}
