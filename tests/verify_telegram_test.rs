use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value as JsonValue};
use tower::ServiceExt;

use helpday_backend::{
    config::{Config, IdentityBackendKind},
    models::identity::TelegramIdentity,
    routes::{self, VERIFY_TELEGRAM_PATH},
    services::identity::{IdentityBackend, MemoryIdentityBackend},
    utils::{
        login_token::{issue_login_token, LoginTokenClaims},
        session_token::SessionSigner,
        telegram_auth::{login_widget_secret, sign_data_check_string, web_app_secret, DataCheckPayload},
    },
    AppState,
};

const BOT_TOKEN: &str = "TESTBOT";

fn test_config(bot_token: Option<&str>) -> Config {
    Config {
        telegram_bot_token: bot_token.map(str::to_string),
        identity_backend: IdentityBackendKind::Memory,
        auth_rps: 1000,
        ..Config::default()
    }
}

fn memory_backend() -> Arc<MemoryIdentityBackend> {
    Arc::new(MemoryIdentityBackend::new(SessionSigner::new(
        "test-session-secret",
        3600,
    )))
}

fn app_with(config: Config, backend: Option<Arc<MemoryIdentityBackend>>) -> Router {
    let backend = backend.map(|b| b as Arc<dyn IdentityBackend>);
    routes::router(AppState::new(config, backend))
}

fn app() -> (Router, Arc<MemoryIdentityBackend>) {
    let backend = memory_backend();
    (app_with(test_config(Some(BOT_TOKEN)), Some(backend.clone())), backend)
}

async fn post_verify(app: &Router, body: JsonValue) -> (StatusCode, JsonValue) {
    let req = Request::builder()
        .method(Method::POST)
        .uri(VERIFY_TELEGRAM_PATH)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, json)
}

fn sign_widget(mut fields: Map<String, JsonValue>) -> Map<String, JsonValue> {
    let mut pending = fields.clone();
    pending.insert("hash".into(), json!("pending"));
    let check = DataCheckPayload::from_json_map(&pending).unwrap();
    let hash = sign_data_check_string(&login_widget_secret(BOT_TOKEN), &check.data_check_string());
    fields.insert("hash".into(), JsonValue::String(hash));
    fields
}

fn ann_fields() -> Map<String, JsonValue> {
    json!({
        "id": 123456789,
        "first_name": "Ann",
        "auth_date": 1700000000
    })
    .as_object()
    .cloned()
    .unwrap()
}

#[tokio::test]
async fn widget_login_returns_user_and_session() {
    let (app, backend) = app();
    let payload = sign_widget(ann_fields());

    let (status, body) = post_verify(&app, json!({"type": "widget", "payload": payload})).await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["ok"], true);
    assert_eq!(body["user"]["id"], 123456789);
    assert_eq!(body["user"]["first_name"], "Ann");
    assert!(body["user"]["username"].is_null());
    assert!(!body["session"]["access_token"].as_str().unwrap().is_empty());
    assert!(!body["session"]["refresh_token"].as_str().unwrap().is_empty());
    assert_eq!(body["session"]["user"]["email"], "tg_123456789@telegram.local");

    let account = backend
        .find_account_by_telegram_id(123456789)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(body["session"]["user"]["id"], account.user_id.as_str());
}

#[tokio::test]
async fn truncated_hash_is_rejected() {
    let (app, backend) = app();
    let mut payload = sign_widget(ann_fields());
    let hash = payload["hash"].as_str().unwrap().to_string();
    payload.insert("hash".into(), json!(&hash[..hash.len() - 1]));

    let (status, body) = post_verify(&app, json!({"type": "widget", "payload": payload})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Invalid signature"}));
    assert!(backend
        .find_account_by_telegram_id(123456789)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn login_url_envelope_matches_flat_payload() {
    let (app, _) = app();
    let signed = sign_widget(ann_fields());

    let (status, flat) =
        post_verify(&app, json!({"type": "login_url", "payload": signed.clone()})).await;
    assert_eq!(status, StatusCode::OK, "body: {}", flat);

    let envelope = URL_SAFE_NO_PAD.encode(JsonValue::Object(signed).to_string());
    let (status, wrapped) = post_verify(
        &app,
        json!({"type": "login_url", "payload": {"tgAuthResult": envelope, "token": "ignored"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", wrapped);
    assert_eq!(wrapped["user"], flat["user"]);
    assert_eq!(wrapped["session"]["user"]["id"], flat["session"]["user"]["id"]);
}

#[tokio::test]
async fn repeated_logins_bind_to_the_same_account() {
    let (app, backend) = app();
    let payload = sign_widget(ann_fields());

    let (_, first) = post_verify(&app, json!({"type": "widget", "payload": payload.clone()})).await;
    let (_, second) = post_verify(&app, json!({"type": "widget", "payload": payload})).await;
    assert_eq!(first["session"]["user"]["id"], second["session"]["user"]["id"]);
    assert_ne!(
        first["session"]["refresh_token"],
        second["session"]["refresh_token"]
    );
    let account = backend
        .find_account_by_telegram_id(123456789)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first["session"]["user"]["id"], account.user_id.as_str());
}

#[tokio::test]
async fn webapp_init_data_login() {
    let (app, _) = app();
    let user = r#"{"id":987654321,"first_name":"Bo","username":"bo_tg"}"#;
    let dcs = format!("auth_date=1700000000\nquery_id=AAH\nuser={}", user);
    let hash = sign_data_check_string(&web_app_secret(BOT_TOKEN), &dcs);
    let encoded_user: String = url::form_urlencoded::byte_serialize(user.as_bytes()).collect();
    let init_data = format!(
        "query_id=AAH&user={}&auth_date=1700000000&hash={}",
        encoded_user, hash
    );

    let (status, body) = post_verify(&app, json!({"type": "webapp", "initData": init_data})).await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["user"]["id"], 987654321);
    assert_eq!(body["user"]["username"], "bo_tg");
}

#[tokio::test]
async fn webapp_without_init_data_is_bad_request() {
    let (app, _) = app();
    let (status, body) = post_verify(&app, json!({"type": "webapp"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn missing_hash_is_bad_request() {
    let (app, _) = app();
    let (status, body) = post_verify(&app, json!({"type": "widget", "payload": ann_fields()})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing hash");
}

#[tokio::test]
async fn unknown_type_is_bad_request() {
    let (app, _) = app();
    let (status, _) = post_verify(&app, json!({"type": "oauth", "payload": {}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bot_token_login() {
    let (app, _) = app();
    let identity = TelegramIdentity {
        id: 4242,
        username: Some("cy".into()),
        first_name: Some("Cy".into()),
        last_name: None,
    };
    let token = issue_login_token(&LoginTokenClaims::for_user(&identity, Utc::now()), BOT_TOKEN)
        .unwrap();

    let (status, body) = post_verify(&app, json!({"type": "token", "token": token})).await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["user"]["id"], 4242);
    assert_eq!(body["user"]["first_name"], "Cy");
}

#[tokio::test]
async fn expired_bot_token_is_unauthorized() {
    let (app, _) = app();
    let mut claims = LoginTokenClaims::for_user(&TelegramIdentity::new(4242), Utc::now());
    claims.exp = Some((Utc::now() - Duration::seconds(30)).timestamp());
    let token = issue_login_token(&claims, BOT_TOKEN).unwrap();

    let (status, body) = post_verify(&app, json!({"type": "token", "token": token})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token expired");
}

#[tokio::test]
async fn missing_bot_token_is_a_configuration_error() {
    let app = app_with(test_config(None), Some(memory_backend()));
    let payload = sign_widget(ann_fields());

    let (status, body) = post_verify(&app, json!({"type": "widget", "payload": payload})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Server is not configured");
}

#[tokio::test]
async fn missing_backend_is_a_configuration_error() {
    let app = app_with(test_config(Some(BOT_TOKEN)), None);
    let (status, body) = post_verify(&app, json!({"type": "token", "token": "x"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Server is not configured");
}

#[tokio::test]
async fn rate_limit_returns_429() {
    let config = Config {
        auth_rps: 1,
        ..test_config(Some(BOT_TOKEN))
    };
    let app = app_with(config, Some(memory_backend()));

    let (first, _) = post_verify(&app, json!({"type": "token", "token": "x"})).await;
    assert_eq!(first, StatusCode::UNAUTHORIZED);
    let (second, body) = post_verify(&app, json!({"type": "token", "token": "x"})).await;
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn preflight_allows_any_origin() {
    let (app, _) = app();
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri(VERIFY_TELEGRAM_PATH)
        .header(header::ORIGIN, "https://web.telegram.org")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,apikey")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    let allowed = resp.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("apikey"));
    assert!(allowed.contains("x-client-info"));
}

#[tokio::test]
async fn health_reports_configuration() {
    let (app, _) = app();
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["telegram_configured"], true);
    assert_eq!(body["identity_backend"], "memory");
}
