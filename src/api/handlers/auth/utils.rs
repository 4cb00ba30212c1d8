//! Small helpers for auth payloads and account links.

use anyhow::{Context, Result};
use axum::Json;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};

use crate::api::error::ApiError;
use crate::api::handlers::{
    FieldErrors, MSG_BLANK, MSG_INVALID_EMAIL, MSG_NOT_STRING, MSG_NULL, MSG_REQUIRED,
    invalid_object, required_string, valid_email,
};
use crate::password::hash_password;
use crate::storage::UserId;

const EMAIL_MAX: usize = 254;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Unwrap an optional JSON body into an object map.
pub(super) fn json_object(payload: Option<Json<Value>>) -> Result<Map<String, Value>, ApiError> {
    let Some(Json(payload)) = payload else {
        return Err(ApiError::bad_request("Missing payload"));
    };
    match payload {
        Value::Object(map) => Ok(map),
        other => Err(invalid_object(&other)),
    }
}

/// Required, normalized, syntactically valid email.
pub(super) fn required_email(
    body: &Map<String, Value>,
    errors: &mut FieldErrors,
) -> Option<String> {
    let email = normalize_email(&required_string(body, "email", Some(EMAIL_MAX), errors)?);
    if valid_email(&email) {
        Some(email)
    } else {
        errors.add("email", MSG_INVALID_EMAIL);
        None
    }
}

/// Required password. Unlike other strings it is taken verbatim, no trimming.
pub(super) fn required_password(
    body: &Map<String, Value>,
    errors: &mut FieldErrors,
) -> Option<String> {
    match body.get("password") {
        None => errors.add("password", MSG_REQUIRED),
        Some(Value::Null) => errors.add("password", MSG_NULL),
        Some(Value::String(password)) if password.is_empty() => errors.add("password", MSG_BLANK),
        Some(Value::String(password)) => return Some(password.clone()),
        Some(_) => errors.add("password", MSG_NOT_STRING),
    }
    None
}

/// Read an optional string field without recording errors.
pub(super) fn optional_str<'a>(body: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    body.get(field).and_then(Value::as_str)
}

/// Encode a user id for account links: base64url of its decimal form.
pub(crate) fn encode_uid(id: UserId) -> String {
    URL_SAFE_NO_PAD.encode(id.to_string())
}

/// Decode a link uid. Tolerates `=` padding; anything else malformed is `None`.
pub(crate) fn decode_uid(uid_b64: &str) -> Option<UserId> {
    let bytes = URL_SAFE_NO_PAD
        .decode(uid_b64.trim().trim_end_matches('='))
        .ok()?;
    std::str::from_utf8(&bytes).ok()?.parse().ok()
}

/// Build `{base}/{route}/{uid}/{token}/`.
pub(super) fn build_account_link(base_url: &str, route: &str, uid: &str, token: &str) -> String {
    let base = base_url.trim_end_matches('/');
    format!("{base}/{route}/{uid}/{token}/")
}

/// Argon2 is CPU bound, keep it off the async workers.
pub(super) async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("password hashing task failed")?
}
