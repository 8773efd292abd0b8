use sha2::{Digest, Sha256};
use std::fmt;

/// Email/password pair that binds a Telegram id to a backend account.
/// Recomputed on every login, never shown to the user.
#[derive(Clone, PartialEq, Eq)]
pub struct SyntheticCredentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SyntheticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntheticCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct CredentialDeriver {
    bot_token: String,
    email_domain: String,
}

impl CredentialDeriver {
    pub fn new(bot_token: impl Into<String>, email_domain: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            email_domain: email_domain.into(),
        }
    }

    pub fn derive(&self, telegram_id: i64) -> SyntheticCredentials {
        SyntheticCredentials {
            email: synthetic_email(telegram_id, &self.email_domain),
            password: derive_credential_secret(telegram_id, &self.bot_token),
        }
    }
}

pub fn synthetic_email(telegram_id: i64, email_domain: &str) -> String {
    format!("tg_{}@{}", telegram_id, email_domain)
}

/// `hex(SHA256(telegram_id + "_" + bot_token))`
pub fn derive_credential_secret(telegram_id: i64, bot_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(telegram_id.to_string().as_bytes());
    hasher.update(b"_");
    hasher.update(bot_token.as_bytes());
    hex::encode(hasher.finalize())
}
