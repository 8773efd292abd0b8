use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::identity::TelegramIdentity;
use crate::utils::credentials::SyntheticCredentials;

/// Backend principal bound 1:1 to a Telegram id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub telegram_id: i64,
}

/// Everything needed to create an account and its profile in one go.
#[derive(Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub profile: TelegramIdentity,
}

impl NewAccount {
    pub fn new(profile: &TelegramIdentity, credentials: &SyntheticCredentials) -> Self {
        Self {
            email: credentials.email.clone(),
            password: credentials.password.clone(),
            profile: profile.clone(),
        }
    }

    pub fn telegram_id(&self) -> i64 {
        self.profile.id
    }
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("profile", &self.profile)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub user: SessionUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}
