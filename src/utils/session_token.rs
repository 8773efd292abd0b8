use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::models::account::{Session, SessionUser};
use crate::utils::token::generate_refresh_token;

pub const AUTHENTICATED_ROLE: &str = "authenticated";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub iat: usize,
    pub exp: usize,
}

/// Issues HS256 access tokens plus opaque refresh tokens for the backends
/// that do not delegate sessions to Supabase.
#[derive(Clone)]
pub struct SessionSigner {
    encoding_key: EncodingKey,
    access_ttl_secs: i64,
}

impl SessionSigner {
    pub fn new(secret: &str, access_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs: access_ttl_secs.max(1),
        }
    }

    pub fn issue(
        &self,
        user_id: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, jsonwebtoken::errors::Error> {
        let expires_at = now + Duration::seconds(self.access_ttl_secs);
        let claims = Claims {
            sub: user_id.to_string(),
            email: Some(email.to_string()),
            role: Some(AUTHENTICATED_ROLE.to_string()),
            iat: now.timestamp().max(0) as usize,
            exp: expires_at.timestamp().max(0) as usize,
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(Session {
            access_token,
            refresh_token: generate_refresh_token(),
            token_type: "bearer".to_string(),
            expires_in: Some(self.access_ttl_secs),
            expires_at: Some(expires_at.timestamp()),
            user: SessionUser {
                id: user_id.to_string(),
                email: Some(email.to_string()),
            },
        })
    }
}
