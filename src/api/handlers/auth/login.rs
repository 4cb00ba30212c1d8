//! Credential sessions: login, logout and access-token refresh.

use anyhow::Context;
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::principal::require_auth;
use super::state::AuthState;
use super::types::{AccessResponse, LoginRequest, RefreshRequest, TokenPairResponse};
use super::utils::{json_object, normalize_email, optional_str};
use crate::api::error::ApiError;
use crate::api::handlers::{ErrorResponse, FieldErrors, MSG_REQUIRED, MessageResponse};
use crate::password::verify_password_or_dummy;
use crate::storage::Store;
use crate::tokens::{SessionError, TokenType};

const MSG_INVALID_CREDENTIALS: &str = "Invalid credentials";

#[utoipa::path(
    post,
    path = "/login/",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access and refresh tokens", body = TokenPairResponse),
        (status = 401, description = "Unknown user, wrong password or inactive account", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<Arc<dyn Store>>,
    payload: Option<Json<Value>>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let body = json_object(payload)?;
    let (Some(email), Some(password)) = (optional_str(&body, "email"), optional_str(&body, "password"))
    else {
        return Err(ApiError::Auth(MSG_INVALID_CREDENTIALS.into()));
    };

    let user = store.find_user_by_email(&normalize_email(email)).await?;

    // Unknown emails still pay for one Argon2 verification.
    let password = password.to_string();
    let stored_hash = user.as_ref().map(|user| user.password_hash.clone());
    let matches = tokio::task::spawn_blocking(move || {
        verify_password_or_dummy(&password, stored_hash.as_deref())
    })
    .await
    .context("password verification task failed")?;

    let Some(user) = user else {
        return Err(ApiError::Auth(MSG_INVALID_CREDENTIALS.into()));
    };

    // Inactive accounts fail the same way as bad passwords.
    if !matches || !user.is_active {
        warn!(user_id = user.id, "login rejected");
        return Err(ApiError::Auth(MSG_INVALID_CREDENTIALS.into()));
    }

    let pair = auth_state
        .sessions()
        .issue(user.id)
        .map_err(|err| session_error(err, ApiError::Auth))?;
    store.record_login(user.id, Utc::now()).await?;

    info!(user_id = user.id, "user logged in");
    Ok(Json(TokenPairResponse {
        access: pair.access,
        refresh: pair.refresh,
    }))
}

#[utoipa::path(
    post,
    path = "/logout/",
    request_body = RefreshRequest,
    responses(
        (status = 205, description = "Refresh token revoked", body = MessageResponse),
        (status = 400, description = "Missing, invalid, expired or already revoked refresh token", body = ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<Arc<dyn Store>>,
    payload: Option<Json<Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state, store.0.as_ref()).await?;

    let refresh = payload
        .and_then(|Json(body)| body.get("refresh").and_then(Value::as_str).map(str::to_string))
        .ok_or_else(|| ApiError::bad_request(SessionError::Invalid.to_string()))?;

    let claims = auth_state
        .sessions()
        .revoke(store.0.as_ref(), &refresh)
        .await
        .map_err(|err| session_error(err, ApiError::BadRequest))?;

    info!(
        user_id = principal.user_id,
        token_user_id = claims.user_id,
        "refresh token revoked"
    );
    Ok((
        StatusCode::RESET_CONTENT,
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/token/refresh/",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = AccessResponse),
        (status = 400, description = "Missing refresh field"),
        (status = 401, description = "Invalid, expired or revoked refresh token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<Arc<dyn Store>>,
    payload: Option<Json<Value>>,
) -> Result<Json<AccessResponse>, ApiError> {
    let body = json_object(payload)?;
    let Some(refresh) = optional_str(&body, "refresh") else {
        let mut errors = FieldErrors::new();
        errors.add("refresh", MSG_REQUIRED);
        return Err(ApiError::Validation(errors.to_value()));
    };

    let sessions = auth_state.sessions();
    let claims = sessions
        .decode(refresh, TokenType::Refresh)
        .map_err(|err| ApiError::Auth(err.to_string()))?;

    let active = store
        .find_user(claims.user_id)
        .await?
        .is_some_and(|user| user.is_active);
    if !active {
        return Err(ApiError::Auth(
            "No active account found for the given credentials".into(),
        ));
    }

    let access = sessions
        .refresh(store.0.as_ref(), refresh)
        .await
        .map_err(|err| session_error(err, ApiError::Auth))?;
    Ok(Json(AccessResponse { access }))
}

/// Token rejections become `reject(message)`; infrastructure failures are 500s.
fn session_error(err: SessionError, reject: fn(String) -> ApiError) -> ApiError {
    match err {
        SessionError::Storage(err) => ApiError::Internal(err),
        SessionError::Encode(err) => ApiError::Internal(err.into()),
        other => reject(other.to_string()),
    }
}
