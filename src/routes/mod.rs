// Route modules
pub mod credits;

use crate::{app_state::AppState, middleware::logging_middleware};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/credits/consume", post(credits::consume_credits))
        .route("/credits/balance", get(credits::get_balance))
        .route("/usage/charge", post(credits::charge_usage))
        .layer(middleware::from_fn(logging_middleware))
}
