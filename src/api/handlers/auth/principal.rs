//! Bearer authentication for protected routes.
//!
//! Reads `Authorization: Bearer <access>`, validates the access token and
//! resolves it to a user that still exists and is active.

use axum::http::{HeaderMap, header::AUTHORIZATION};

use super::state::AuthState;
use crate::api::error::ApiError;
use crate::storage::{Store, UserId};
use crate::tokens::TokenType;

const MSG_NO_CREDENTIALS: &str = "Authentication credentials were not provided.";
const MSG_BAD_TOKEN: &str = "Given token not valid for any token type";

/// Authenticated user context derived from the access token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub is_staff: bool,
}

/// Resolve the bearer access token into a principal, or 401.
///
/// # Errors
/// Returns [`ApiError::Authz`] when the header is missing or the token or user is unusable.
pub async fn require_auth(
    headers: &HeaderMap,
    auth_state: &AuthState,
    store: &dyn Store,
) -> Result<Principal, ApiError> {
    let token = bearer_token(headers).ok_or_else(|| ApiError::Authz(MSG_NO_CREDENTIALS.into()))?;

    let claims = auth_state
        .sessions()
        .decode(token, TokenType::Access)
        .map_err(|_| ApiError::Authz(MSG_BAD_TOKEN.into()))?;

    let user = store
        .find_user(claims.user_id)
        .await?
        .ok_or_else(|| ApiError::Authz("User not found".into()))?;
    if !user.is_active {
        return Err(ApiError::Authz("User is inactive".into()));
    }

    Ok(Principal {
        user_id: user.id,
        email: user.email,
        is_staff: user.is_staff,
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
