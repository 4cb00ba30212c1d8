//! Password reset: request a link by email, then confirm with a new password.
//!
//! Reset tokens are bound to the password hash, last login and email, so a
//! completed reset or a fresh login invalidates every outstanding link. Inactive
//! accounts may reset too; activation still requires email verification.

use axum::{
    Json,
    extract::{Extension, Path},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use super::state::AuthState;
use super::types::{PasswordResetConfirmRequest, PasswordResetRequest};
use super::utils::{
    build_account_link, decode_uid, encode_uid, hash_password_blocking, json_object,
    normalize_email, optional_str, required_password,
};
use super::verification::{MSG_BAD_TOKEN, MSG_BAD_UID};
use crate::api::email::{EmailMessage, TEMPLATE_PASSWORD_RESET};
use crate::api::error::ApiError;
use crate::api::handlers::{ErrorResponse, FieldErrors, MessageResponse};
use crate::storage::Store;
use crate::tokens::TokenPurpose;

const MSG_RESET_SENT: &str = "Password reset email sent.";

#[utoipa::path(
    post,
    path = "/password-reset-request/",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset email queued", body = MessageResponse),
        (status = 400, description = "Unknown email", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn password_reset_request(
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<Arc<dyn Store>>,
    payload: Option<Json<Value>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let body = json_object(payload)?;
    let email = optional_str(&body, "email").map(normalize_email);

    let user = match &email {
        Some(email) => store.find_user_by_email(email).await?,
        None => None,
    };

    let Some(user) = user else {
        if auth_state.config().reset_conceal_unknown_email() {
            return Ok(Json(MessageResponse {
                message: MSG_RESET_SENT.to_string(),
            }));
        }
        return Err(ApiError::bad_request("Invalid email."));
    };

    let token = auth_state
        .account_tokens()
        .make_token(TokenPurpose::PasswordReset, &user)?;
    let link = build_account_link(
        auth_state.config().public_base_url(),
        "password-reset-confirm",
        &encode_uid(user.id),
        &token,
    );
    let message = EmailMessage {
        to_email: user.email.clone(),
        template: TEMPLATE_PASSWORD_RESET.to_string(),
        subject: "Password reset".to_string(),
        body: format!(
            "Hi {},\n\nClick the link below to reset your password:\n{link}",
            user.email
        ),
    };
    if let Err(err) = auth_state.email().enqueue(message) {
        error!(user_id = user.id, "failed to queue password reset email: {err}");
    }

    info!(user_id = user.id, "password reset requested");
    Ok(Json(MessageResponse {
        message: MSG_RESET_SENT.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/password-reset-confirm/{uid_b64}/{token}/",
    params(
        ("uid_b64" = String, Path, description = "base64url encoded user id"),
        ("token" = String, Path, description = "Password reset token")
    ),
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Blank password, invalid uid or invalid/expired token")
    ),
    tag = "auth"
)]
pub async fn password_reset_confirm(
    Path((uid_b64, token)): Path<(String, String)>,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<Arc<dyn Store>>,
    payload: Option<Json<Value>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let body = json_object(payload)?;

    // Password problems are reported before anything about the link.
    let mut errors = FieldErrors::new();
    let Some(password) = required_password(&body, &mut errors) else {
        return Err(ApiError::Validation(errors.to_value()));
    };

    let user_id = decode_uid(&uid_b64).ok_or_else(|| ApiError::bad_request(MSG_BAD_UID))?;
    let user = store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::bad_request(MSG_BAD_UID))?;

    if !auth_state
        .account_tokens()
        .check_token(TokenPurpose::PasswordReset, &user, &token)
    {
        return Err(ApiError::bad_request(MSG_BAD_TOKEN));
    }

    let password_hash = hash_password_blocking(password).await?;
    store.set_password(user.id, &password_hash).await?;

    info!(user_id = user.id, "password reset completed");
    Ok(Json(MessageResponse {
        message: "Password has been reset successfully.".to_string(),
    }))
}
