pub mod health;
pub mod verify_telegram;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::{cors::verify_telegram_cors, rate_limit};
use crate::AppState;

pub const VERIFY_TELEGRAM_PATH: &str = "/functions/v1/verify-telegram";

pub fn router(state: AppState) -> Router {
    let auth_api = Router::new()
        .route(VERIFY_TELEGRAM_PATH, post(verify_telegram::verify_telegram))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::RateLimiter::new(state.config.auth_rps),
            rate_limit::rps_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(auth_api)
        .with_state(state)
        .layer(verify_telegram_cors())
        .layer(TraceLayer::new_for_http())
}
