use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::account::Session;
use crate::models::identity::TelegramIdentity;

/// Body of `POST /functions/v1/verify-telegram`, discriminated by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerifyRequest {
    Widget {
        payload: Map<String, Value>,
    },
    #[serde(rename = "webapp")]
    WebApp {
        #[serde(rename = "initData", alias = "init_data")]
        init_data: String,
    },
    LoginUrl {
        payload: Map<String, Value>,
    },
    Token {
        token: String,
    },
}

impl VerifyRequest {
    pub fn flow(&self) -> &'static str {
        match self {
            VerifyRequest::Widget { .. } => "widget",
            VerifyRequest::WebApp { .. } => "webapp",
            VerifyRequest::LoginUrl { .. } => "login_url",
            VerifyRequest::Token { .. } => "token",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUserDto {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<TelegramIdentity> for TelegramUserDto {
    fn from(identity: TelegramIdentity) -> Self {
        Self {
            id: identity.id,
            username: identity.username,
            first_name: identity.first_name,
            last_name: identity.last_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub ok: bool,
    pub user: TelegramUserDto,
    pub session: Session,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_each_flow() {
        let widget: VerifyRequest =
            serde_json::from_value(json!({"type": "widget", "payload": {"id": 1, "hash": "ab"}}))
                .unwrap();
        assert_eq!(widget.flow(), "widget");

        let webapp: VerifyRequest =
            serde_json::from_value(json!({"type": "webapp", "initData": "user=%7B%7D&hash=ab"}))
                .unwrap();
        assert!(matches!(webapp, VerifyRequest::WebApp { ref init_data } if init_data.starts_with("user=")));

        let login_url: VerifyRequest =
            serde_json::from_value(json!({"type": "login_url", "payload": {}})).unwrap();
        assert_eq!(login_url.flow(), "login_url");

        let token: VerifyRequest =
            serde_json::from_value(json!({"type": "token", "token": "a.b.c"})).unwrap();
        assert_eq!(token.flow(), "token");
    }

    #[test]
    fn rejects_unknown_type_and_missing_fields() {
        assert!(serde_json::from_value::<VerifyRequest>(json!({"type": "oauth"})).is_err());
        assert!(serde_json::from_value::<VerifyRequest>(json!({"type": "webapp"})).is_err());
        assert!(serde_json::from_value::<VerifyRequest>(json!({"payload": {}})).is_err());
    }
}
