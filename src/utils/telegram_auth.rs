//! Telegram authenticity proofs.
//!
//! Telegram signs a set of fields by sorting them by key, joining them as
//! `key=value` lines and computing `HMAC-SHA256(secret_key, lines)`. The
//! secret key differs by channel:
//!
//! * Login Widget and login URLs use `SHA256(bot_token)`.
//! * WebApp init data uses `HMAC-SHA256("WebAppData", bot_token)`.
//!
//! Both keys are used as raw digest bytes.

use std::collections::BTreeMap;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

pub const HASH_FIELD: &str = "hash";
pub const AUTH_DATE_FIELD: &str = "auth_date";
const TOKEN_FIELD: &str = "token";
const ENVELOPE_FIELDS: [&str; 2] = ["tgAuthResult", "tg_auth_result"];
const WEB_APP_KEY_SEED: &[u8] = b"WebAppData";

const LENIENT_PADDING: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent);
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT_PADDING);
const BASE64_STANDARD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT_PADDING);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Missing hash")]
    MissingHash,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Authorization data is outdated")]
    Outdated,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// The fields covered by a Telegram proof, with the proof carried separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataCheckPayload {
    fields: BTreeMap<String, String>,
    hash: String,
}

impl DataCheckPayload {
    pub fn new(fields: BTreeMap<String, String>, hash: String) -> Result<Self, SignatureError> {
        let hash = hash.trim().to_string();
        if hash.is_empty() {
            return Err(SignatureError::MissingHash);
        }
        Ok(Self { fields, hash })
    }

    /// Builds the payload from a Login Widget style JSON object.
    ///
    /// Null values are skipped, strings are taken verbatim and every other
    /// value is rendered as compact JSON.
    pub fn from_json_map(map: &Map<String, Value>) -> Result<Self, SignatureError> {
        let mut fields = BTreeMap::new();
        let mut hash = String::new();
        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            let rendered = canonical_value(value);
            if key == HASH_FIELD {
                hash = rendered;
            } else {
                fields.insert(key.clone(), rendered);
            }
        }
        Self::new(fields, hash)
    }

    /// Builds the payload from WebApp init data (a URL-encoded query string).
    pub fn from_init_data(init_data: &str) -> Result<Self, SignatureError> {
        let raw = init_data.trim();
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        if raw.is_empty() {
            return Err(SignatureError::MalformedPayload(
                "initData is empty".to_string(),
            ));
        }

        let mut fields = BTreeMap::new();
        let mut hash = String::new();
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            if key == HASH_FIELD {
                hash = value.into_owned();
            } else {
                fields.insert(key.into_owned(), value.into_owned());
            }
        }
        Self::new(fields, hash)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn data_check_string(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn verify(&self, secret_key: &[u8]) -> Result<(), SignatureError> {
        let expected = sign_data_check_string(secret_key, &self.data_check_string());
        let provided = self.hash.to_ascii_lowercase();
        if expected.as_bytes().ct_eq(provided.as_bytes()).into() {
            Ok(())
        } else {
            Err(SignatureError::InvalidSignature)
        }
    }

    /// Rejects proofs whose `auth_date` is missing or older than `max_age_secs`.
    pub fn check_freshness(
        &self,
        max_age_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let auth_date = self
            .get(AUTH_DATE_FIELD)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or(SignatureError::Outdated)?;
        if now.timestamp() - auth_date > max_age_secs {
            return Err(SignatureError::Outdated);
        }
        Ok(())
    }
}

pub fn login_widget_secret(bot_token: &str) -> [u8; 32] {
    Sha256::digest(bot_token.as_bytes()).into()
}

pub fn web_app_secret(bot_token: &str) -> [u8; 32] {
    hmac_sha256(WEB_APP_KEY_SEED, bot_token.as_bytes())
}

/// Lowercase hex `HMAC-SHA256(secret_key, data_check_string)`.
pub fn sign_data_check_string(secret_key: &[u8], data_check_string: &str) -> String {
    hex::encode(hmac_sha256(secret_key, data_check_string.as_bytes()))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Verifies a Login Widget or login-URL payload and returns the effective
/// (unwrapped) fields so the caller can extract the identity from them.
pub fn verify_login_payload(
    payload: &Map<String, Value>,
    bot_token: &str,
) -> Result<(Map<String, Value>, DataCheckPayload), SignatureError> {
    let fields = unwrap_login_envelope(payload.clone())?;
    let check = DataCheckPayload::from_json_map(&fields)?;
    check.verify(&login_widget_secret(bot_token))?;
    Ok((fields, check))
}

pub fn verify_init_data(init_data: &str, bot_token: &str) -> Result<DataCheckPayload, SignatureError> {
    let check = DataCheckPayload::from_init_data(init_data)?;
    check.verify(&web_app_secret(bot_token))?;
    Ok(check)
}

/// Strips the `token` parameter and merges a `tgAuthResult` / `tg_auth_result`
/// envelope over the outer fields. Envelope fields win on conflicts.
pub fn unwrap_login_envelope(
    mut payload: Map<String, Value>,
) -> Result<Map<String, Value>, SignatureError> {
    payload.remove(TOKEN_FIELD);

    let mut envelope = None;
    for key in ENVELOPE_FIELDS {
        let value = payload.remove(key);
        if envelope.is_none() {
            envelope = value.filter(|v| !v.is_null());
        }
    }

    let Some(envelope) = envelope else {
        return Ok(payload);
    };

    for (key, value) in decode_envelope(envelope)? {
        payload.insert(key, value);
    }
    Ok(payload)
}

fn decode_envelope(value: Value) -> Result<Map<String, Value>, SignatureError> {
    let decoded = match value {
        Value::Object(map) => Some(map),
        Value::String(raw) => decode_envelope_str(&raw),
        _ => None,
    };
    decoded.ok_or_else(|| {
        SignatureError::MalformedPayload("tgAuthResult is not an encoded JSON object".to_string())
    })
}

fn decode_envelope_str(raw: &str) -> Option<Map<String, Value>> {
    let raw = raw.trim();
    let uri_decoded = decode_uri_component(raw);
    parse_json_object(raw)
        .or_else(|| parse_json_object(&uri_decoded))
        .or_else(|| decode_base64_text(raw).and_then(|s| parse_json_object(&s)))
        .or_else(|| decode_base64_text(&uri_decoded).and_then(|s| parse_json_object(&s)))
}

fn parse_json_object(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn decode_base64_text(raw: &str) -> Option<String> {
    let bytes = BASE64_URL
        .decode(raw)
        .or_else(|_| BASE64_STANDARD.decode(raw))
        .ok()?;
    String::from_utf8(bytes).ok()
}

// form_urlencoded turns '+' into a space and splits on '&' and '='; escape
// those first so the result matches plain percent-decoding.
fn decode_uri_component(raw: &str) -> String {
    let escaped = raw
        .replace('+', "%2B")
        .replace('&', "%26")
        .replace('=', "%3D");
    form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(decoded, _)| decoded.into_owned())
        .unwrap_or_default()
}

fn canonical_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
