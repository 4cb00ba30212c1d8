//! Request/response DTOs for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Access (short-lived) and refresh (revocable) bearer tokens.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccessResponse {
    pub access: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetConfirmRequest {
    pub password: String,
}
