use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "status": "ok",
        "telegram_configured": state.config.telegram_bot_token.is_some(),
        "identity_backend": state.config.identity_backend.to_string(),
    });
    (StatusCode::OK, Json(body))
}
