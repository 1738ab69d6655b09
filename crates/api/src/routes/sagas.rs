//! Saga audit endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::SagaId;
use saga_store::{SagaEvent, SagaInstance};
use serde::Serialize;

use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SagaResponse {
    #[serde(flatten)]
    pub saga: SagaInstance,
    pub events: Vec<SagaEvent>,
}

/// GET /sagas/{sagaId}: the saga instance and its log in append order.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(saga_id): Path<String>,
) -> Result<Json<SagaResponse>, ApiError> {
    let saga_id: SagaId = parse_id(&saga_id, "saga id")?;
    let saga = state.orchestrator.get_saga(saga_id).await?;
    let events = state.orchestrator.saga_events(saga_id).await?;
    Ok(Json(SagaResponse { saga, events }))
}
