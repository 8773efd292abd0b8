use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::models::identity::IdentityError;
use crate::services::identity::BackendError;
use crate::utils::login_token::TokenError;
use crate::utils::telegram_auth::SignatureError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Provisioning error: {0}")]
    Provisioning(String),

    #[error("Identity backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Error::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests".to_string(),
            ),
            Error::Config(msg) => {
                tracing::error!(reason = %msg, "server configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server is not configured".to_string(),
                )
            }
            Error::Provisioning(msg) => {
                tracing::error!(reason = %msg, "account provisioning failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to sign in with Telegram".to_string(),
                )
            }
            other => {
                tracing::error!(error = %other, "unexpected server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl From<SignatureError> for Error {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::MissingHash | SignatureError::MalformedPayload(_) => {
                Error::BadRequest(err.to_string())
            }
            SignatureError::InvalidSignature | SignatureError::Outdated => {
                Error::Unauthorized(err.to_string())
            }
        }
    }
}

impl From<TokenError> for Error {
    fn from(err: TokenError) -> Self {
        Error::Unauthorized(err.to_string())
    }
}

impl From<IdentityError> for Error {
    fn from(err: IdentityError) -> Self {
        Error::BadRequest(err.to_string())
    }
}
