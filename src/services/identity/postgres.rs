use async_trait::async_trait;
use chrono::Duration;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use super::{BackendError, IdentityBackend};
use crate::models::account::{Account, NewAccount, Session};
use crate::models::identity::TelegramIdentity;
use crate::utils::crypto::{hash_credential, sha256_hex, verify_credential};
use crate::utils::session_token::SessionSigner;
use crate::utils::time::now;

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    telegram_id: i64,
}

#[derive(Debug, FromRow)]
struct CredentialRow {
    id: Uuid,
    email: String,
    credential_hash: String,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            user_id: row.id.to_string(),
            telegram_id: row.telegram_id,
        }
    }
}

/// Self-hosted accounts in Postgres. Sessions are HS256 access tokens with a
/// hashed refresh token persisted alongside.
#[derive(Clone)]
pub struct PgIdentityBackend {
    pool: PgPool,
    signer: SessionSigner,
    refresh_ttl_secs: i64,
}

impl PgIdentityBackend {
    pub fn new(pool: PgPool, signer: SessionSigner, refresh_ttl_secs: i64) -> Self {
        Self {
            pool,
            signer,
            refresh_ttl_secs,
        }
    }
}

fn map_write_error(err: sqlx::Error) -> BackendError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => BackendError::Conflict,
        _ => BackendError::Database(err),
    }
}

#[async_trait]
impl IdentityBackend for PgIdentityBackend {
    async fn find_account_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<Account>, BackendError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, telegram_id FROM accounts WHERE telegram_id = $1",
        )
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Account::from))
    }

    async fn create_account(&self, new_account: &NewAccount) -> Result<Account, BackendError> {
        let credential_hash = hash_credential(&new_account.password)
            .map_err(|e| BackendError::Credential(e.to_string()))?;
        let profile = &new_account.profile;

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (telegram_id, email, credential_hash)
            VALUES ($1, $2, $3)
            RETURNING id, telegram_id
            "#,
        )
        .bind(profile.id)
        .bind(new_account.email.to_lowercase())
        .bind(&credential_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        sqlx::query(
            r#"
            INSERT INTO profiles (id, telegram_id, username, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(row.id)
        .bind(profile.id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        tx.commit().await?;
        info!(user_id = %row.id, telegram_id = row.telegram_id, "created account");
        Ok(row.into())
    }

    async fn update_profile(
        &self,
        user_id: &str,
        profile: &TelegramIdentity,
    ) -> Result<(), BackendError> {
        let id = Uuid::parse_str(user_id)
            .map_err(|e| BackendError::UnexpectedResponse(format!("bad user id: {}", e)))?;
        sqlx::query(
            r#"
            UPDATE profiles
            SET username = $2, first_name = $3, last_name = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT id, email, credential_hash FROM accounts WHERE email = $1",
        )
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BackendError::InvalidCredentials)?;

        let valid = verify_credential(password, &row.credential_hash)
            .map_err(|e| BackendError::Credential(e.to_string()))?;
        if !valid {
            return Err(BackendError::InvalidCredentials);
        }

        let issued_at = now();
        let session = self.signer.issue(&row.id.to_string(), &row.email, issued_at)?;

        let mut tx = self.pool.begin().await?;
        let pruned = sqlx::query(
            "DELETE FROM refresh_tokens WHERE account_id = $1 AND expires_at < $2",
        )
        .bind(row.id)
        .bind(issued_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_hash, account_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(sha256_hex(&session.refresh_token))
        .bind(row.id)
        .bind(issued_at + Duration::seconds(self.refresh_ttl_secs))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if pruned > 0 {
            debug!(user_id = %row.id, pruned, "pruned expired refresh tokens");
        }
        Ok(session)
    }
}
