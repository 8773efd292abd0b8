use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityBackendKind {
    Supabase,
    Postgres,
    Memory,
}

impl FromStr for IdentityBackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(Self::Supabase),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown identity backend '{}'", other)),
        }
    }
}

impl fmt::Display for IdentityBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Supabase => "supabase",
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct Config {
    pub server_address: String,
    pub telegram_bot_token: Option<String>,
    pub login_token_secret: Option<String>,
    pub auth_max_age_secs: Option<i64>,
    pub account_email_domain: String,
    pub identity_backend: IdentityBackendKind,
    pub supabase_url: Option<String>,
    pub supabase_service_role_key: Option<String>,
    pub database_url: Option<String>,
    pub session_jwt_secret: Option<String>,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub auth_rps: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_address: "0.0.0.0:8080".to_string(),
            telegram_bot_token: None,
            login_token_secret: None,
            auth_max_age_secs: None,
            account_email_domain: "telegram.local".to_string(),
            identity_backend: IdentityBackendKind::Supabase,
            supabase_url: None,
            supabase_service_role_key: None,
            database_url: None,
            session_jwt_secret: None,
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 30 * 24 * 3600,
            auth_rps: 20,
        }
    }
}

// Secrets stay out of logs even when the whole config is printed.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_address", &self.server_address)
            .field("telegram_bot_token", &redacted(&self.telegram_bot_token))
            .field("login_token_secret", &redacted(&self.login_token_secret))
            .field("auth_max_age_secs", &self.auth_max_age_secs)
            .field("account_email_domain", &self.account_email_domain)
            .field("identity_backend", &self.identity_backend)
            .field("supabase_url", &self.supabase_url)
            .field(
                "supabase_service_role_key",
                &redacted(&self.supabase_service_role_key),
            )
            .field("database_url", &redacted(&self.database_url))
            .field("session_jwt_secret", &redacted(&self.session_jwt_secret))
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field("auth_rps", &self.auth_rps)
            .finish()
    }
}

fn redacted(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "<set>"
    } else {
        "<unset>"
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            server_address: get_env_opt("SERVER_ADDRESS").unwrap_or(defaults.server_address),
            telegram_bot_token: get_env_opt("TELEGRAM_BOT_TOKEN"),
            login_token_secret: get_env_opt("TELEGRAM_LOGIN_JWT_SECRET"),
            auth_max_age_secs: get_env_parse_opt("TELEGRAM_AUTH_MAX_AGE_SECS")?,
            account_email_domain: get_env_opt("ACCOUNT_EMAIL_DOMAIN")
                .unwrap_or(defaults.account_email_domain),
            identity_backend: get_env_parse_opt("IDENTITY_BACKEND")?
                .unwrap_or(defaults.identity_backend),
            supabase_url: get_env_opt("SUPABASE_URL"),
            supabase_service_role_key: get_env_opt("SUPABASE_SERVICE_ROLE_KEY"),
            database_url: get_env_opt("DATABASE_URL"),
            session_jwt_secret: get_env_opt("SESSION_JWT_SECRET"),
            access_token_ttl_secs: get_env_parse_opt("ACCESS_TOKEN_TTL_SECS")?
                .unwrap_or(defaults.access_token_ttl_secs),
            refresh_token_ttl_secs: get_env_parse_opt("REFRESH_TOKEN_TTL_SECS")?
                .unwrap_or(defaults.refresh_token_ttl_secs),
            auth_rps: get_env_parse_opt("AUTH_RPS")?.unwrap_or(defaults.auth_rps),
        })
    }

    /// The bot token every Telegram proof is checked against.
    pub fn bot_token(&self) -> Result<&str> {
        self.telegram_bot_token
            .as_deref()
            .ok_or_else(|| Error::Config("TELEGRAM_BOT_TOKEN not configured".to_string()))
    }

    /// Secret for bot-issued login tokens; falls back to the bot token.
    pub fn login_token_secret(&self) -> Result<&str> {
        match self.login_token_secret.as_deref() {
            Some(secret) => Ok(secret),
            None => self.bot_token(),
        }
    }
}

fn get_env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn get_env_parse_opt<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(raw) = get_env_opt(name) else {
        return Ok(None);
    };
    raw.parse()
        .map(Some)
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e)))
}
