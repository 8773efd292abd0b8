//! Storage and session issuance behind the Telegram login flow.

pub mod memory;
pub mod postgres;
pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{Config, IdentityBackendKind};
use crate::database::pool::create_pool;
use crate::error::Result;
use crate::models::account::{Account, NewAccount, Session};
use crate::models::identity::TelegramIdentity;
use crate::utils::session_token::SessionSigner;
use crate::utils::token::generate_opaque_token;

pub use memory::MemoryIdentityBackend;
pub use postgres::PgIdentityBackend;
pub use supabase::SupabaseIdentityBackend;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// A unique constraint (telegram id or email) rejected the write.
    #[error("account already exists")]
    Conflict,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("unexpected identity backend response: {0}")]
    UnexpectedResponse(String),

    #[error("credential hashing failed: {0}")]
    Credential(String),

    #[error("identity store is unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("session token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn find_account_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> std::result::Result<Option<Account>, BackendError>;

    /// Creates the account and its profile. Returns `BackendError::Conflict`
    /// when the telegram id or email is already taken.
    async fn create_account(
        &self,
        new_account: &NewAccount,
    ) -> std::result::Result<Account, BackendError>;

    async fn update_profile(
        &self,
        user_id: &str,
        profile: &TelegramIdentity,
    ) -> std::result::Result<(), BackendError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<Session, BackendError>;
}

/// Builds the configured backend. `None` means required settings are
/// missing; requests then fail with a configuration error.
pub async fn connect(config: &Config) -> Result<Option<Arc<dyn IdentityBackend>>> {
    match config.identity_backend {
        IdentityBackendKind::Supabase => {
            let (Some(url), Some(key)) = (
                config.supabase_url.as_deref(),
                config.supabase_service_role_key.as_deref(),
            ) else {
                warn!("SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY missing; Telegram login is disabled");
                return Ok(None);
            };
            info!(supabase_url = %url, "using Supabase identity backend");
            let backend = SupabaseIdentityBackend::new(url, key)?;
            Ok(Some(Arc::new(backend)))
        }
        IdentityBackendKind::Postgres => {
            let (Some(database_url), Some(secret)) = (
                config.database_url.as_deref(),
                config.session_jwt_secret.as_deref(),
            ) else {
                warn!("DATABASE_URL or SESSION_JWT_SECRET missing; Telegram login is disabled");
                return Ok(None);
            };
            let pool = create_pool(database_url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("using Postgres identity backend");
            let signer = SessionSigner::new(secret, config.access_token_ttl_secs);
            Ok(Some(Arc::new(PgIdentityBackend::new(
                pool,
                signer,
                config.refresh_token_ttl_secs,
            ))))
        }
        IdentityBackendKind::Memory => {
            let secret = match config.session_jwt_secret.clone() {
                Some(secret) => secret,
                None => {
                    warn!("SESSION_JWT_SECRET not set; memory backend sessions use an ephemeral key");
                    generate_opaque_token(48)
                }
            };
            info!("using in-memory identity backend; accounts are lost on restart");
            let signer = SessionSigner::new(&secret, config.access_token_ttl_secs);
            Ok(Some(Arc::new(MemoryIdentityBackend::new(signer))))
        }
    }
}
