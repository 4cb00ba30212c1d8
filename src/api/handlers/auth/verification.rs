//! Email verification link consumption.

use axum::{
    Json,
    extract::{Extension, Path},
};
use std::sync::Arc;
use tracing::info;

use super::state::AuthState;
use super::utils::decode_uid;
use crate::api::error::ApiError;
use crate::api::handlers::{ErrorResponse, MessageResponse};
use crate::storage::Store;
use crate::tokens::TokenPurpose;

pub(super) const MSG_BAD_UID: &str = "Invalid token or user ID";
pub(super) const MSG_BAD_TOKEN: &str = "Invalid or expired token.";

/// Activate the account named by `uid_b64` if `token` checks out.
///
/// The token is bound to the inactive state, so a second visit (or a visit
/// after activation by other means) is rejected.
#[utoipa::path(
    get,
    path = "/email-verification/{uid_b64}/{token}/",
    params(
        ("uid_b64" = String, Path, description = "base64url encoded user id"),
        ("token" = String, Path, description = "Email verification token")
    ),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid uid or invalid/expired token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    Path((uid_b64, token)): Path<(String, String)>,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = decode_uid(&uid_b64).ok_or_else(|| ApiError::bad_request(MSG_BAD_UID))?;
    let user = store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::bad_request(MSG_BAD_UID))?;

    if !auth_state
        .account_tokens()
        .check_token(TokenPurpose::EmailVerification, &user, &token)
    {
        return Err(ApiError::bad_request(MSG_BAD_TOKEN));
    }

    // Conditional update: only the first of two concurrent requests wins.
    if !store.activate_user(user.id).await? {
        return Err(ApiError::bad_request(MSG_BAD_TOKEN));
    }

    info!(user_id = user.id, "email verified");
    Ok(Json(MessageResponse {
        message: "Email verified successfully.".to_string(),
    }))
}
