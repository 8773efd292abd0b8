use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{BackendError, IdentityBackend};
use crate::models::account::{Account, NewAccount, Session};
use crate::models::identity::TelegramIdentity;
use crate::utils::time::{now, to_rfc3339};

const PROFILES_PATH: &str = "/rest/v1/profiles";
const ADMIN_USERS_PATH: &str = "/auth/v1/admin/users";
const TOKEN_PATH: &str = "/auth/v1/token";

/// Supabase Auth (GoTrue) for accounts and sessions, PostgREST for the
/// `profiles` table. Both are called with the service role key.
#[derive(Clone)]
pub struct SupabaseIdentityBackend {
    client: Client,
    base_url: String,
    service_role_key: String,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: String,
    telegram_id: i64,
}

#[derive(Debug, Deserialize)]
struct AdminUser {
    id: String,
}

#[derive(Debug, Serialize)]
struct ProfileRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    telegram_id: i64,
    username: Option<&'a str>,
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
    updated_at: String,
}

impl<'a> ProfileRecord<'a> {
    fn new(id: Option<&'a str>, profile: &'a TelegramIdentity) -> Self {
        Self {
            id,
            telegram_id: profile.id,
            username: profile.username.as_deref(),
            first_name: profile.first_name.as_deref(),
            last_name: profile.last_name.as_deref(),
            updated_at: to_rfc3339(now()),
        }
    }
}

impl SupabaseIdentityBackend {
    pub fn new(base_url: &str, service_role_key: &str) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
    }

    async fn insert_profile(
        &self,
        user_id: &str,
        profile: &TelegramIdentity,
    ) -> Result<(), BackendError> {
        let response = self
            .authorized(self.client.post(self.url(PROFILES_PATH)))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&ProfileRecord::new(Some(user_id), profile))
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(BackendError::Conflict);
        }
        expect_success(response, "insert profile").await?;
        Ok(())
    }

    /// The auth user already exists. If no profile points at it yet (an
    /// earlier create stopped after the user insert, or a concurrent login is
    /// mid-create), bind to that user through the derived credentials and
    /// write the missing profile.
    async fn adopt_existing_user(&self, new_account: &NewAccount) -> Result<Account, BackendError> {
        let profile = &new_account.profile;
        if self.find_account_by_telegram_id(profile.id).await?.is_some() {
            return Err(BackendError::Conflict);
        }

        let session = match self
            .sign_in_with_password(&new_account.email, &new_account.password)
            .await
        {
            Ok(session) => session,
            Err(BackendError::InvalidCredentials) => return Err(BackendError::Conflict),
            Err(err) => return Err(err),
        };
        let user_id = session.user.id;
        self.insert_profile(&user_id, profile).await?;
        warn!(
            user_id = %user_id,
            telegram_id = profile.id,
            "profile was missing for existing Supabase user; recreated"
        );

        Ok(Account {
            user_id,
            telegram_id: profile.id,
        })
    }
}

#[async_trait]
impl IdentityBackend for SupabaseIdentityBackend {
    async fn find_account_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<Account>, BackendError> {
        let response = self
            .authorized(self.client.get(self.url(PROFILES_PATH)))
            .query(&[
                ("select", "id,telegram_id".to_string()),
                ("telegram_id", format!("eq.{}", telegram_id)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<ProfileRow> = expect_success(response, "lookup profile")
            .await?
            .json()
            .await?;
        Ok(rows.into_iter().next().map(|row| Account {
            user_id: row.id,
            telegram_id: row.telegram_id,
        }))
    }

    async fn create_account(&self, new_account: &NewAccount) -> Result<Account, BackendError> {
        let profile = &new_account.profile;
        let response = self
            .authorized(self.client.post(self.url(ADMIN_USERS_PATH)))
            .json(&json!({
                "email": new_account.email,
                "password": new_account.password,
                "email_confirm": true,
                "user_metadata": {
                    "telegram_id": profile.id,
                    "username": profile.username,
                    "first_name": profile.first_name,
                    "last_name": profile.last_name,
                },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_duplicate_user(status, &body) {
                return self.adopt_existing_user(new_account).await;
            }
            return Err(BackendError::UnexpectedResponse(format!(
                "create user returned {}",
                status
            )));
        }
        let user: AdminUser = response.json().await?;
        info!(user_id = %user.id, telegram_id = profile.id, "created Supabase user");

        if let Err(err) = self.insert_profile(&user.id, profile).await {
            warn!(
                user_id = %user.id,
                telegram_id = profile.id,
                error = %err,
                "Supabase user created but profile insert failed"
            );
            return Err(err);
        }

        Ok(Account {
            user_id: user.id,
            telegram_id: profile.id,
        })
    }

    async fn update_profile(
        &self,
        user_id: &str,
        profile: &TelegramIdentity,
    ) -> Result<(), BackendError> {
        let response = self
            .authorized(self.client.patch(self.url(PROFILES_PATH)))
            .query(&[("id", format!("eq.{}", user_id))])
            .header("Prefer", "return=minimal")
            .json(&ProfileRecord::new(None, profile))
            .send()
            .await?;
        expect_success(response, "update profile").await?;
        Ok(())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let response = self
            .client
            .post(self.url(TOKEN_PATH))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.service_role_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
        ) {
            return Err(BackendError::InvalidCredentials);
        }
        let session: Session = expect_success(response, "password grant")
            .await?
            .json()
            .await?;
        Ok(session)
    }
}

/// GoTrue answers 422 (`email_exists`) or 409 when the email is taken.
fn is_duplicate_user(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::CONFLICT {
        return true;
    }
    let body = body.to_ascii_lowercase();
    status == StatusCode::UNPROCESSABLE_ENTITY
        && (body.contains("already") || body.contains("email_exists"))
}

async fn expect_success(response: Response, operation: &str) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(BackendError::UnexpectedResponse(format!(
        "{} returned {}: {}",
        operation, status, snippet
    )))
}
