//! HTTP edge for the checkout saga.
//!
//! Validates the shape of incoming requests and forwards them to the
//! [`saga::SagaOrchestrator`]. Errors are answered with a status derived from
//! their [`common::ErrorKind`]. Structured logging goes through `tracing` and
//! metrics are exposed in Prometheus format on `/metrics`.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::ApiError;
pub use state::{AppState, StartupError, build_state, in_memory_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::checkout::place))
        .route("/checkout/orders/{order_id}", get(routes::checkout::order))
        .route("/sagas/{saga_id}", get(routes::sagas::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
