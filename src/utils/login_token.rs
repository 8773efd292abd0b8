//! Short-lived HS256 tokens the bot hands out in `/start login` deep links.

use std::collections::HashSet;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::identity::{parse_telegram_id, TelegramIdentity};

pub const SUPPORTED_ALGORITHM: &str = "HS256";
pub const DEFAULT_LOGIN_TOKEN_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Malformed token")]
    MalformedToken,

    #[error("Unsupported token algorithm")]
    UnsupportedAlgorithm,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token does not identify a Telegram user")]
    MissingIdentity,

    #[error("Token carries an invalid Telegram user id")]
    InvalidIdentity,
}

/// Just enough of a JWT header to name an algorithm `jsonwebtoken` rejects.
#[derive(Debug, Deserialize)]
struct TokenHeader {
    alg: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginTokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// camelCase spellings; the snake_case value wins when both are sent.
    #[serde(default, rename = "firstName", skip_serializing_if = "Option::is_none")]
    pub first_name_camel: Option<String>,
    #[serde(default, rename = "lastName", skip_serializing_if = "Option::is_none")]
    pub last_name_camel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl LoginTokenClaims {
    /// Claims the bot signs for a user who asked to log in.
    pub fn for_user(identity: &TelegramIdentity, now: DateTime<Utc>) -> Self {
        Self {
            sub: Some(Value::String(identity.id.to_string())),
            telegram_id: None,
            username: identity.username.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            first_name_camel: None,
            last_name_camel: None,
            extra: Some(json!({ "telegram_id": identity.id })),
            iat: Some(now.timestamp()),
            exp: Some((now + Duration::minutes(DEFAULT_LOGIN_TOKEN_TTL_MINUTES)).timestamp()),
        }
    }

    /// `sub` > `telegram_id` > `extra.telegram_id` > `extra.id`; the first
    /// non-null candidate decides.
    pub fn telegram_id(&self) -> Result<i64, TokenError> {
        let extra = self.extra.as_ref();
        let candidates = [
            self.sub.as_ref(),
            self.telegram_id.as_ref(),
            extra.and_then(|e| e.get("telegram_id")),
            extra.and_then(|e| e.get("id")),
        ];
        let first = candidates
            .into_iter()
            .flatten()
            .find(|v| !v.is_null())
            .ok_or(TokenError::MissingIdentity)?;
        parse_telegram_id(first).ok_or(TokenError::InvalidIdentity)
    }

    pub fn identity(&self) -> Result<TelegramIdentity, TokenError> {
        Ok(TelegramIdentity {
            id: self.telegram_id()?,
            username: non_empty(&self.username),
            first_name: non_empty(&self.first_name)
                .or_else(|| non_empty(&self.first_name_camel)),
            last_name: non_empty(&self.last_name).or_else(|| non_empty(&self.last_name_camel)),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn verify_login_token(token: &str, secret: &str) -> Result<LoginTokenClaims, TokenError> {
    verify_login_token_at(token, secret, Utc::now())
}

pub fn verify_login_token_at(
    token: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<LoginTokenClaims, TokenError> {
    let token = token.trim();
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(TokenError::MalformedToken);
    }

    let header = decode_header(token).map_err(|err| {
        // Unknown names such as `none` fail header parsing outright.
        let unparsable_alg = matches!(err.kind(), ErrorKind::Json(_))
            && declares_foreign_algorithm(segments[0]);
        if unparsable_alg {
            TokenError::UnsupportedAlgorithm
        } else {
            map_jwt_error(err)
        }
    })?;
    if header.alg != Algorithm::HS256 {
        return Err(TokenError::UnsupportedAlgorithm);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    let claims = decode::<LoginTokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(map_jwt_error)?
    .claims;

    if let Some(exp) = claims.exp {
        if exp.saturating_mul(1000) < now.timestamp_millis() {
            return Err(TokenError::TokenExpired);
        }
    }
    claims.telegram_id()?;
    Ok(claims)
}

/// Signs `claims` the same way the bot does when it builds a login link.
pub fn issue_login_token(claims: &LoginTokenClaims, secret: &str) -> Result<String, TokenError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(map_jwt_error)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            TokenError::UnsupportedAlgorithm
        }
        _ => TokenError::MalformedToken,
    }
}

fn declares_foreign_algorithm(header_segment: &str) -> bool {
    URL_SAFE_NO_PAD
        .decode(header_segment)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<TokenHeader>(&bytes).ok())
        .and_then(|header| header.alg)
        .is_some_and(|alg| alg != SUPPORTED_ALGORITHM)
}
