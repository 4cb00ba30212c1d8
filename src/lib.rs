//! # Boilerplate (account lifecycle + demo CRUD backend)
//!
//! `boilerplate` is a small HTTP backend that bundles the pieces most projects
//! rewrite on day one: user signup with email verification, login with
//! access/refresh credentials, logout with refresh-token revocation, password
//! reset, and a demo resource (`dummy`) with generic CRUD endpoints.
//!
//! ## Accounts
//!
//! Users sign up inactive. A verification email carries a link with the user id
//! (base64url) and a signed, time-limited token bound to the account's active
//! flag; consuming it activates the account exactly once. Password reset tokens
//! use a separate purpose bound to the password hash and last login, so a
//! completed reset (or a fresh login) invalidates every outstanding reset link.
//!
//! ## Sessions
//!
//! Login issues an HS256 access token (short-lived, stateless) and a refresh
//! token (longer-lived, revocable). Logout inserts the refresh token `jti` into a
//! deny-list; any later refresh attempt with it is rejected.
//!
//! ## Storage
//!
//! Persistence goes through the [`storage::Store`] trait. `postgres://` DSNs use
//! the `sqlx` backed store (schema in `sql/schema.sql`); `memory://` keeps
//! everything in-process for local development and tests.

pub mod api;
pub mod cli;
pub mod password;
pub mod storage;
pub mod tokens;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
