use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReservationLine};
use tokio::sync::RwLock;

use crate::repository::InventoryRepository;
use crate::{InventoryError, Product, Reservation, Result};

#[derive(Default)]
struct State {
    products: HashMap<ProductId, Product>,
    reservations: HashMap<OrderId, Vec<Reservation>>,
}

/// In-memory inventory repository.
///
/// Writes happen under a single lock, so the stock check inside
/// [`reserve`](InventoryRepository::reserve) behaves like a conditional update.
#[derive(Clone, Default)]
pub struct InMemoryInventoryRepository {
    state: Arc<RwLock<State>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryInventoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository holding the given products.
    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let repository = Self::new();
        {
            let mut state = repository.state.write().await;
            for product in products {
                state.products.insert(product.id, product);
            }
        }
        repository
    }

    /// Makes every call fail as if storage were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of orders holding reservations.
    pub async fn reservation_count(&self) -> usize {
        self.state.read().await.reservations.len()
    }

    /// Directly sets a product's stock, bumping its version like a competing writer would.
    pub async fn set_stock(&self, id: ProductId, stock_quantity: u32) {
        if let Some(product) = self.state.write().await.products.get_mut(&id) {
            product.stock_quantity = stock_quantity;
            product.version += 1;
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(InventoryError::Unavailable(
                "in-memory inventory disabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryRepository for InMemoryInventoryRepository {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        self.check_available()?;
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        self.check_available()?;
        let mut products: Vec<Product> =
            self.state.read().await.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        self.check_available()?;
        self.state.write().await.products.insert(product.id, product);
        Ok(())
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .await
            .reservations
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn reserve(
        &self,
        order_id: OrderId,
        lines: &[ReservationLine],
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        self.check_available()?;
        let mut state = self.state.write().await;

        if let Some(existing) = state.reservations.get(&order_id) {
            return Ok(existing.clone());
        }

        // Check every condition before touching anything.
        for line in lines {
            let enough = state
                .products
                .get(&line.product_id)
                .is_some_and(|p| p.stock_quantity >= line.quantity);
            if !enough {
                return Err(InventoryError::ConcurrencyConflict {
                    product_id: line.product_id,
                });
            }
        }

        let mut reservations = Vec::with_capacity(lines.len());
        for line in lines {
            if let Some(product) = state.products.get_mut(&line.product_id) {
                product.stock_quantity -= line.quantity;
                product.version += 1;
            }
            reservations.push(Reservation::active(order_id, *line, now));
        }
        state.reservations.insert(order_id, reservations.clone());
        Ok(reservations)
    }

    async fn release(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let Some(reservations) = state.reservations.remove(&order_id) else {
            return Ok(Vec::new());
        };
        for reservation in &reservations {
            if let Some(product) = state.products.get_mut(&reservation.product_id) {
                product.stock_quantity += reservation.quantity;
                product.version += 1;
            }
        }
        Ok(reservations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;

    fn line(product_id: ProductId, quantity: u32) -> ReservationLine {
        ReservationLine {
            product_id,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let plenty = Product::new("Plenty", 10, Money::from_cents(100));
        let scarce = Product::new("Scarce", 1, Money::from_cents(100));
        let repo =
            InMemoryInventoryRepository::with_products([plenty.clone(), scarce.clone()]).await;

        let err = repo
            .reserve(
                OrderId::new(),
                &[line(plenty.id, 3), line(scarce.id, 2)],
                Utc::now(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, InventoryError::ConcurrencyConflict { product_id } if product_id == scarce.id));
        let plenty_after = repo.get_product(plenty.id).await.unwrap().unwrap();
        assert_eq!(plenty_after.stock_quantity, 10);
        assert_eq!(plenty_after.version, 1);
        assert_eq!(repo.reservation_count().await, 0);
    }

    #[tokio::test]
    async fn test_reserve_bumps_version() {
        let product = Product::new("Widget", 5, Money::from_cents(100));
        let repo = InMemoryInventoryRepository::with_products([product.clone()]).await;

        repo.reserve(OrderId::new(), &[line(product.id, 2)], Utc::now())
            .await
            .unwrap();

        let after = repo.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(after.stock_quantity, 3);
        assert_eq!(after.version, 2);
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let repo = InMemoryInventoryRepository::new();
        repo.set_unavailable(true);
        assert!(matches!(
            repo.release(OrderId::new()).await,
            Err(InventoryError::Unavailable(_))
        ));
    }
}
