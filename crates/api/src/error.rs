//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ErrorKind;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Saga or participant error, mapped by kind.
    Saga(SagaError),
}

/// Status code the edge answers with for an error of `kind`.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientStock | ErrorKind::ConcurrencyConflict => StatusCode::CONFLICT,
        ErrorKind::PaymentDeclined => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ErrorKind::Transport => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::CompensationFailure | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (kind, message, saga) = match self {
            ApiError::BadRequest(msg) => (ErrorKind::Invalid, msg, None),
            ApiError::Saga(err) => {
                let saga = match &err {
                    SagaError::StepFailed {
                        saga_id, order_id, ..
                    } => Some((*saga_id, *order_id)),
                    _ => None,
                };
                (err.kind(), err.to_string(), saga)
            }
        };

        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(error = %message, kind = kind.as_str(), "request failed");
        }

        let mut body = serde_json::json!({
            "success": false,
            "error": message,
            "kind": kind,
        });
        // Failed sagas are still auditable through /sagas/{sagaId}.
        if let Some((saga_id, order_id)) = saga {
            body["sagaId"] = serde_json::json!(saga_id);
            body["orderId"] = serde_json::json!(order_id);
        }
        (status, axum::Json(body)).into_response()
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
