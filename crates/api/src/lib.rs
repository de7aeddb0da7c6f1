//! HTTP API server for the fulfillment backend.
//!
//! Hosts the order and delivery services behind one router, runs their
//! outbox dispatchers and consumers in the background, and exposes
//! structured logging (tracing) and Prometheus metrics.

pub mod clients;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod runtime;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, Upstreams};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .route("/ops/dead-letters", get(routes::ops::dead_letters))
        .route(
            "/orders",
            post(routes::orders::create).get(routes::orders::list),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get).put(routes::orders::update),
        )
        .route("/orders/{id}/delivery", get(routes::orders::delivery))
        .route(
            "/deliveries",
            post(routes::deliveries::create).get(routes::deliveries::list),
        )
        .route("/deliveries/{id}", get(routes::deliveries::get))
        .route(
            "/deliveries/{id}/status",
            put(routes::deliveries::update_status),
        )
        .route("/deliveries/{id}/order", get(routes::deliveries::order))
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
