//! Checkout requests and responses at the orchestrator boundary.

use common::{Money, OrderId, OrderLine, ProductId, ReservationLine, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};

pub const ORDER_PLACED: &str = "Order placed successfully";

/// One requested product at the price the caller saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub items: Vec<CheckoutItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub order_id: OrderId,
    pub total_amount: Money,
    pub message: String,
}

impl CheckoutResponse {
    pub fn placed(order_id: OrderId, total_amount: Money) -> Self {
        Self {
            success: true,
            order_id,
            total_amount,
            message: ORDER_PLACED.to_string(),
        }
    }
}

/// A request that passed validation, with amounts converted to cents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub user_id: Option<UserId>,
    pub lines: Vec<OrderLine>,
    pub total_amount: Money,
}

impl Checkout {
    pub fn reservation_lines(&self) -> Vec<ReservationLine> {
        self.lines
            .iter()
            .map(|line| ReservationLine {
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect()
    }
}

impl CheckoutRequest {
    /// Validates the request shape and computes the order total.
    ///
    /// The total is summed from the prices as given and rounded half-up to
    /// cents once at the end.
    pub fn validate(&self) -> Result<Checkout> {
        if self.items.is_empty() {
            return Err(SagaError::InvalidRequest(
                "at least one item is required".to_string(),
            ));
        }

        let mut lines = Vec::with_capacity(self.items.len());
        let mut total = Decimal::ZERO;
        for item in &self.items {
            if item.quantity == 0 {
                return Err(SagaError::InvalidRequest(format!(
                    "quantity for product {} must be at least 1",
                    item.product_id
                )));
            }
            if item.price < Decimal::ZERO {
                return Err(SagaError::InvalidRequest(format!(
                    "price for product {} must not be negative",
                    item.product_id
                )));
            }
            if item.price > Money::MAX.to_decimal() {
                return Err(SagaError::InvalidRequest(format!(
                    "price for product {} exceeds {}",
                    item.product_id,
                    Money::MAX
                )));
            }
            let line_total = item
                .price
                .checked_mul(Decimal::from(item.quantity))
                .ok_or_else(|| out_of_range(item.product_id))?;
            total = total
                .checked_add(line_total)
                .ok_or_else(|| out_of_range(item.product_id))?;
            lines.push(OrderLine {
                product_id: item.product_id,
                quantity: item.quantity,
                price_at_purchase: Money::from_decimal(item.price)
                    .ok_or_else(|| out_of_range(item.product_id))?,
            });
        }

        let total_amount = Money::from_decimal(total)
            .filter(|amount| *amount <= Money::MAX)
            .ok_or_else(|| {
                SagaError::InvalidRequest(format!("order total exceeds {}", Money::MAX))
            })?;

        Ok(Checkout {
            user_id: self.user_id,
            lines,
            total_amount,
        })
    }
}

fn out_of_range(product_id: ProductId) -> SagaError {
    SagaError::InvalidRequest(format!("amount for product {product_id} is out of range"))
}
