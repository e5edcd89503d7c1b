//! HTTP API for the marketplace order lifecycle.
//!
//! Exposes items, orders, checkout, reviews and the activity trail as REST
//! endpoints, with structured logging (tracing) and Prometheus metrics.

pub mod actor;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::TracingNotificationDispatcher;
use metrics_exporter_prometheus::PrometheusHandle;
use store::MarketStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: MarketStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .route("/items", post(routes::items::create::<S>))
        .route("/items/{id}", get(routes::items::get::<S>))
        .route("/items/{id}/status", put(routes::items::update_status::<S>))
        .route(
            "/transactions",
            post(routes::transactions::create::<S>).get(routes::transactions::list::<S>),
        )
        .route(
            "/transactions/{id}",
            get(routes::transactions::get::<S>).put(routes::transactions::transition::<S>),
        )
        .route(
            "/transactions/{id}/checkout",
            post(routes::payments::checkout::<S>),
        )
        .route(
            "/transactions/{id}/payments",
            get(routes::payments::list_for_transaction::<S>),
        )
        .route(
            "/payments/{id}/callback",
            post(routes::payments::callback::<S>),
        )
        .route(
            "/reviews",
            post(routes::reviews::create::<S>).get(routes::reviews::list::<S>),
        )
        .route("/activity/export", get(routes::activity::export::<S>))
        .route(
            "/activity/{entity_type}/{entity_id}",
            get(routes::activity::trail::<S>),
        )
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

/// Creates the default application state over a store, logging notifications.
pub fn create_default_state<S: MarketStore + 'static>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState::new(
        Arc::new(store),
        Arc::new(TracingNotificationDispatcher),
    ))
}
