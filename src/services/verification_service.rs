use tracing::debug;

use crate::config::Config;
use crate::dto::verify_dto::VerifyRequest;
use crate::error::Result;
use crate::models::identity::TelegramIdentity;
use crate::utils::login_token::verify_login_token;
use crate::utils::telegram_auth::{verify_init_data, verify_login_payload, DataCheckPayload};
use crate::utils::time::now;

/// Turns a client proof of any supported flow into a verified identity.
#[derive(Clone)]
pub struct VerificationService {
    bot_token: String,
    login_token_secret: String,
    max_age_secs: Option<i64>,
}

impl VerificationService {
    pub fn new(
        bot_token: impl Into<String>,
        login_token_secret: impl Into<String>,
        max_age_secs: Option<i64>,
    ) -> Self {
        Self {
            bot_token: bot_token.into(),
            login_token_secret: login_token_secret.into(),
            max_age_secs,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.bot_token()?,
            config.login_token_secret()?,
            config.auth_max_age_secs,
        ))
    }

    pub fn verify(&self, request: &VerifyRequest) -> Result<TelegramIdentity> {
        match request {
            VerifyRequest::Widget { payload } | VerifyRequest::LoginUrl { payload } => {
                let (fields, check) = verify_login_payload(payload, &self.bot_token)?;
                self.check_freshness(&check)?;
                Ok(TelegramIdentity::from_login_fields(&fields)?)
            }
            VerifyRequest::WebApp { init_data } => {
                let check = verify_init_data(init_data, &self.bot_token)?;
                self.check_freshness(&check)?;
                Ok(TelegramIdentity::from_init_data(&check)?)
            }
            VerifyRequest::Token { token } => {
                let claims = verify_login_token(token, &self.login_token_secret)?;
                debug!(exp = ?claims.exp, "login token verified");
                Ok(claims.identity()?)
            }
        }
    }

    fn check_freshness(&self, check: &DataCheckPayload) -> Result<()> {
        if let Some(max_age) = self.max_age_secs {
            check.check_freshness(max_age, now())?;
        }
        Ok(())
    }
}
