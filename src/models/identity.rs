use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::telegram_auth::DataCheckPayload;

/// A Telegram user whose identity has been proven for this request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramIdentity {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Telegram user is missing from the payload")]
    MissingUser,

    #[error("Telegram user id is missing or invalid")]
    InvalidUserId,

    #[error("Telegram user data is malformed: {0}")]
    MalformedUser(String),
}

impl TelegramIdentity {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            username: None,
            first_name: None,
            last_name: None,
        }
    }

    /// Login Widget / login-URL fields. Identity comes from a nested `user`
    /// value when present, otherwise from the flat fields.
    pub fn from_login_fields(fields: &Map<String, Value>) -> Result<Self, IdentityError> {
        match fields.get("user") {
            Some(Value::Object(user)) => Self::from_user_object(user),
            Some(Value::String(raw)) => Self::from_user_json(raw),
            _ => Self::from_user_object(fields),
        }
    }

    /// WebApp init data carries the user as a JSON string in `user`.
    pub fn from_init_data(payload: &DataCheckPayload) -> Result<Self, IdentityError> {
        let raw = payload.get("user").ok_or(IdentityError::MissingUser)?;
        Self::from_user_json(raw)
    }

    fn from_user_json(raw: &str) -> Result<Self, IdentityError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(user)) => Self::from_user_object(&user),
            Ok(_) => Err(IdentityError::MalformedUser(
                "user is not a JSON object".to_string(),
            )),
            Err(err) => Err(IdentityError::MalformedUser(err.to_string())),
        }
    }

    fn from_user_object(user: &Map<String, Value>) -> Result<Self, IdentityError> {
        let id = user
            .get("id")
            .and_then(parse_telegram_id)
            .ok_or(IdentityError::InvalidUserId)?;
        Ok(Self {
            id,
            username: display_field(user, "username"),
            first_name: display_field(user, "first_name"),
            last_name: display_field(user, "last_name"),
        })
    }
}

/// Accepts Telegram ids sent either as JSON integers or numeric strings.
pub fn parse_telegram_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn display_field(user: &Map<String, Value>, key: &str) -> Option<String> {
    user.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
