//! Account lifecycle endpoints.
//!
//! - `POST /signup/`: create an inactive user and email a verification link.
//! - `GET /email-verification/{uid}/{token}/`: activate the account once.
//! - `POST /login/`: exchange email + password for access/refresh tokens.
//! - `POST /logout/`: revoke a refresh token (bearer required).
//! - `POST /token/refresh/`: new access token from a live refresh token.
//! - `POST /password-reset-request/` and `POST /password-reset-confirm/{uid}/{token}/`.
//!
//! Link tokens are stateless HMACs (see [`crate::tokens::AccountTokens`]); only
//! refresh-token revocations are persisted.

pub mod login;
pub mod password_reset;
pub mod principal;
pub mod signup;
pub mod state;
pub mod types;
mod utils;
pub mod verification;

pub use principal::{Principal, require_auth};
pub use state::{AuthConfig, AuthState};

#[cfg(test)]
mod tests;
