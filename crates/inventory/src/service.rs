use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, ReservationLine};
use tracing::{debug, info, warn};

use crate::model::merge_lines;
use crate::repository::InventoryRepository;
use crate::{InventoryError, Reservation, Result};

/// Reserves and releases stock, idempotently per order.
#[derive(Clone)]
pub struct InventoryService {
    repository: Arc<dyn InventoryRepository>,
}

impl InventoryService {
    pub fn new(repository: Arc<dyn InventoryRepository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<dyn InventoryRepository> {
        &self.repository
    }

    /// Holds stock for every line of an order.
    ///
    /// A repeated call for an order that already holds reservations returns
    /// them unchanged without touching stock.
    #[tracing::instrument(skip(self, lines), fields(order_id = %order_id))]
    pub async fn reserve(
        &self,
        order_id: OrderId,
        lines: &[ReservationLine],
    ) -> Result<Vec<Reservation>> {
        let existing = self.repository.reservations_for_order(order_id).await?;
        if !existing.is_empty() {
            debug!("Reservation already exists, returning it");
            return Ok(existing);
        }

        if lines.is_empty() {
            return Err(InventoryError::InvalidRequest(
                "at least one item is required".to_string(),
            ));
        }
        if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
            return Err(InventoryError::InvalidRequest(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
        let lines = merge_lines(lines);

        for line in &lines {
            let product = self
                .repository
                .get_product(line.product_id)
                .await?
                .ok_or(InventoryError::ProductNotFound(line.product_id))?;

            if product.stock_quantity < line.quantity {
                return Err(InventoryError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available: product.stock_quantity,
                });
            }
        }

        match self.repository.reserve(order_id, &lines, Utc::now()).await {
            Ok(reservations) => {
                info!(products = reservations.len(), "Inventory reserved");
                Ok(reservations)
            }
            Err(InventoryError::ConcurrencyConflict { product_id }) => {
                metrics::counter!("inventory_reservation_conflicts_total").increment(1);
                warn!(%product_id, "Stock changed between check and update");
                Err(InventoryError::ConcurrencyConflict { product_id })
            }
            Err(e) => Err(e),
        }
    }

    /// Returns the order's reserved stock. Succeeds if nothing is reserved.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn release(&self, order_id: OrderId) -> Result<()> {
        let released = self.repository.release(order_id).await?;
        if released.is_empty() {
            debug!("No reservation to release");
        } else {
            info!(products = released.len(), "Inventory released");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryInventoryRepository, Product};
    use common::{Money, ProductId};

    async fn setup(stock: u32) -> (InventoryService, InMemoryInventoryRepository, Product) {
        let product = Product::new("Limited Stock Item", stock, Money::from_cents(1999));
        let repo = InMemoryInventoryRepository::with_products([product.clone()]).await;
        let service = InventoryService::new(Arc::new(repo.clone()));
        (service, repo, product)
    }

    fn line(product_id: ProductId, quantity: u32) -> ReservationLine {
        ReservationLine {
            product_id,
            quantity,
        }
    }

    async fn stock(repo: &InMemoryInventoryRepository, id: ProductId) -> u32 {
        repo.get_product(id).await.unwrap().unwrap().stock_quantity
    }

    #[tokio::test]
    async fn test_reserve_twice_decrements_once() {
        let (service, repo, product) = setup(5).await;
        let order_id = OrderId::new();

        let first = service.reserve(order_id, &[line(product.id, 2)]).await.unwrap();
        let second = service.reserve(order_id, &[line(product.id, 2)]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(stock(&repo, product.id).await, 3);
    }

    #[tokio::test]
    async fn test_release_restores_stock_and_is_repeatable() {
        let (service, repo, product) = setup(5).await;
        let order_id = OrderId::new();

        service.reserve(order_id, &[line(product.id, 4)]).await.unwrap();
        assert_eq!(stock(&repo, product.id).await, 1);

        service.release(order_id).await.unwrap();
        assert_eq!(stock(&repo, product.id).await, 5);
        assert!(repo.reservations_for_order(order_id).await.unwrap().is_empty());

        service.release(order_id).await.unwrap();
        assert_eq!(stock(&repo, product.id).await, 5);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let (service, _repo, _product) = setup(5).await;
        let missing = ProductId::new();

        let err = service
            .reserve(OrderId::new(), &[line(missing, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::ProductNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_insufficient_stock_names_product() {
        let (service, repo, product) = setup(5).await;

        let err = service
            .reserve(OrderId::new(), &[line(product.id, 6)])
            .await
            .unwrap_err();

        match err {
            InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => {
                assert_eq!(product_id, product.id);
                assert_eq!(requested, 6);
                assert_eq!(available, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stock(&repo, product.id).await, 5);
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_merged() {
        let (service, repo, product) = setup(5).await;
        let order_id = OrderId::new();

        let reservations = service
            .reserve(order_id, &[line(product.id, 2), line(product.id, 3)])
            .await
            .unwrap();

        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].quantity, 5);
        assert_eq!(stock(&repo, product.id).await, 0);
    }

    #[tokio::test]
    async fn test_rejects_empty_and_zero_quantity() {
        let (service, _repo, product) = setup(5).await;

        assert!(matches!(
            service.reserve(OrderId::new(), &[]).await,
            Err(InventoryError::InvalidRequest(_))
        ));
        assert!(matches!(
            service.reserve(OrderId::new(), &[line(product.id, 0)]).await,
            Err(InventoryError::InvalidRequest(_))
        ));
    }
}
