//! HTTP API for the order pipeline.
//!
//! Provides endpoints to submit and inspect orders and to watch dependency
//! circuits, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use pipeline::{
    InMemoryInventoryService, InMemoryPaymentService, InventoryService, OrderPipeline,
    PaymentService, PipelineConfig,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            get(routes::orders::list).post(routes::orders::submit),
        )
        .route("/orders/{id}", get(routes::orders::get))
        .route("/circuits", get(routes::circuits::list))
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

/// Creates application state for the given services.
pub fn create_state(
    store: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryService>,
    payment: Arc<dyn PaymentService>,
    config: PipelineConfig,
) -> Arc<AppState> {
    Arc::new(AppState {
        pipeline: OrderPipeline::new(store, inventory, payment, config),
    })
}

/// Creates application state backed by in-memory inventory and payment services.
pub fn create_default_state(store: Arc<dyn OrderStore>, config: PipelineConfig) -> Arc<AppState> {
    create_state(
        store,
        Arc::new(InMemoryInventoryService::new()),
        Arc::new(InMemoryPaymentService::new()),
        config,
    )
}
