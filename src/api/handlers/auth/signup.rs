//! Account signup.
//!
//! Flow: validate the body, store an inactive user with an Argon2 hash, mint an
//! email-verification token and queue the link. The account stays unusable for
//! login until the link is followed.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use super::state::AuthState;
use super::types::SignupRequest;
use super::utils::{
    build_account_link, encode_uid, hash_password_blocking, json_object, required_email,
    required_password,
};
use crate::api::email::{EmailMessage, TEMPLATE_VERIFY_EMAIL};
use crate::api::error::ApiError;
use crate::api::handlers::{FieldErrors, MessageResponse};
use crate::storage::{CreateUserOutcome, NewUser, Store, User};
use crate::tokens::TokenPurpose;

const MSG_EMAIL_TAKEN: &str = "user with this email already exists.";
pub(crate) const VERIFY_EMAIL_SUBJECT: &str = "Welcome to Boilerplate!";

#[utoipa::path(
    post,
    path = "/signup/",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created, verification email queued", body = MessageResponse),
        (status = 400, description = "Per-field errors")
    ),
    tag = "auth"
)]
pub async fn signup(
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<Arc<dyn Store>>,
    payload: Option<Json<Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_object(payload)?;

    let mut errors = FieldErrors::new();
    let email = required_email(&body, &mut errors);
    let password = required_password(&body, &mut errors);

    if let Some(email) = &email {
        if store.find_user_by_email(email).await?.is_some() {
            errors.add("email", MSG_EMAIL_TAKEN);
        }
    }

    let (Some(email), Some(password), true) = (email, password, errors.is_empty()) else {
        return Err(ApiError::Validation(errors.to_value()));
    };

    let password_hash = hash_password_blocking(password).await?;
    let user = match store
        .create_user(NewUser {
            email,
            password_hash,
            is_active: false,
        })
        .await?
    {
        CreateUserOutcome::Created(user) => user,
        // Lost a race with a concurrent signup for the same address.
        CreateUserOutcome::Conflict => return Err(ApiError::field("email", MSG_EMAIL_TAKEN)),
    };

    info!(user_id = user.id, "user signed up");
    send_verification_email(&auth_state, &user)?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User created. Please check your email to verify your account.".to_string(),
        }),
    ))
}

/// Queue the verification link for `user`. A stopped mail worker is logged,
/// not surfaced: the account already exists at this point.
pub(super) fn send_verification_email(auth_state: &AuthState, user: &User) -> Result<(), ApiError> {
    let token = auth_state
        .account_tokens()
        .make_token(TokenPurpose::EmailVerification, user)?;
    let link = build_account_link(
        auth_state.config().public_base_url(),
        "email-verification",
        &encode_uid(user.id),
        &token,
    );

    let message = EmailMessage {
        to_email: user.email.clone(),
        template: TEMPLATE_VERIFY_EMAIL.to_string(),
        subject: VERIFY_EMAIL_SUBJECT.to_string(),
        body: format!(
            "Hi {},\n\nClick the link below to verify your email:\n{link}",
            user.email
        ),
    };
    if let Err(err) = auth_state.email().enqueue(message) {
        error!(user_id = user.id, "failed to queue verification email: {err}");
    }
    Ok(())
}
