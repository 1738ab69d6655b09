//! Checkout entry point and order lookup.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use common::{OrderId, OrderView};
use saga::{CheckoutRequest, CheckoutResponse};

use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

/// POST /checkout
///
/// Runs the saga to completion before answering. A failed saga answers with
/// the error of the step that failed, after compensation has been attempted.
pub async fn place(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let response = state.orchestrator.execute_checkout(request).await?;
    Ok(Json(response))
}

/// GET /checkout/orders/{orderId}
pub async fn order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id: OrderId = parse_id(&order_id, "order id")?;
    Ok(Json(state.orchestrator.get_order(order_id).await?))
}
