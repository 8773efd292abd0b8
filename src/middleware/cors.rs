use axum::http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use tower_http::cors::{Any, CorsLayer};

const X_CLIENT_INFO: HeaderName = HeaderName::from_static("x-client-info");
const APIKEY: HeaderName = HeaderName::from_static("apikey");

/// Browser clients (Mini App, login page) call the verify route cross-origin.
pub fn verify_telegram_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([AUTHORIZATION, X_CLIENT_INFO, APIKEY, CONTENT_TYPE])
}
