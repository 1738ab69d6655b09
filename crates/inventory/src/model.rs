use chrono::{DateTime, Duration, Utc};
use common::{
    Money, OrderId, ProductId, ReservationId, ReservationLine, ReservationStatus, ReservationView,
};
use serde::{Deserialize, Serialize};

/// How long a reservation holds stock before it is considered stale.
pub const RESERVATION_TTL: Duration = Duration::minutes(15);

/// A stocked product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub stock_quantity: u32,
    pub price: Money,
    /// Incremented on every stock mutation.
    pub version: i64,
}

impl Product {
    pub fn new(name: impl Into<String>, stock_quantity: u32, price: Money) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            description: None,
            stock_quantity,
            price,
            version: 1,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Stock held for one product of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    /// A fresh active reservation expiring [`RESERVATION_TTL`] after `now`.
    pub fn active(order_id: OrderId, line: ReservationLine, now: DateTime<Utc>) -> Self {
        Self {
            id: ReservationId::new(),
            order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            status: ReservationStatus::Active,
            expires_at: now + RESERVATION_TTL,
        }
    }

    pub fn to_view(&self) -> ReservationView {
        ReservationView {
            id: self.id,
            order_id: self.order_id,
            product_id: self.product_id,
            quantity: self.quantity,
            status: self.status,
            expires_at: self.expires_at,
        }
    }
}

/// Merges lines naming the same product and sorts them by product id.
///
/// Stock rows are locked in this order, so two reservations over the same
/// products can never wait on each other.
pub fn merge_lines(lines: &[ReservationLine]) -> Vec<ReservationLine> {
    let mut merged: Vec<ReservationLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => merged.push(*line),
        }
    }
    merged.sort_by_key(|line| line.product_id);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_reservation_expires_after_ttl() {
        let now = Utc::now();
        let line = ReservationLine {
            product_id: ProductId::new(),
            quantity: 2,
        };
        let reservation = Reservation::active(OrderId::new(), line, now);
        assert_eq!(reservation.status, ReservationStatus::Active);
        assert_eq!(reservation.expires_at - now, Duration::minutes(15));
    }

    #[test]
    fn test_merge_lines_sums_duplicates() {
        let a = ProductId::new();
        let b = ProductId::new();
        let merged = merge_lines(&[
            ReservationLine { product_id: a, quantity: 1 },
            ReservationLine { product_id: b, quantity: 4 },
            ReservationLine { product_id: a, quantity: 2 },
        ]);
        let mut expected = vec![
            ReservationLine { product_id: a, quantity: 3 },
            ReservationLine { product_id: b, quantity: 4 },
        ];
        expected.sort_by_key(|line| line.product_id);
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_merge_lines_orders_by_product() {
        let mut ids: Vec<ProductId> = (0..5).map(|_| ProductId::new()).collect();
        let lines: Vec<ReservationLine> = ids
            .iter()
            .rev()
            .map(|&product_id| ReservationLine { product_id, quantity: 1 })
            .collect();
        let reversed: Vec<ReservationLine> = lines.iter().rev().copied().collect();

        ids.sort();
        let order = |merged: Vec<ReservationLine>| {
            merged.into_iter().map(|l| l.product_id).collect::<Vec<_>>()
        };
        assert_eq!(order(merge_lines(&lines)), ids);
        assert_eq!(order(merge_lines(&reversed)), ids);
    }
}
