//! Email verification and password reset tokens.
//!
//! Format: `<ts_base36>-<hex>`, where `ts` counts seconds since 2001-01-01 UTC
//! and `hex` is every other character of an HMAC-SHA256 over the user's state
//! and `ts`. The HMAC key is `SHA256(purpose_salt || secret)`, so a
//! token minted for one purpose never checks out for the other.

use anyhow::{Result, anyhow};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use super::constant_time_eq;
use crate::storage::User;

/// 2001-01-01T00:00:00Z as a Unix timestamp.
const TOKEN_EPOCH: i64 = 978_307_200;

/// Upper bound on the base36 timestamp; anything longer is garbage.
const MAX_TS_LEN: usize = 13;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    fn salt(self) -> &'static str {
        match self {
            Self::EmailVerification => "boilerplate.tokens.EmailVerificationTokenGenerator",
            Self::PasswordReset => "boilerplate.tokens.PasswordResetTokenGenerator",
        }
    }

    /// State the token is bound to, interleaved with the timestamp. When any
    /// of it changes the token stops validating.
    fn hash_value(self, user: &User, ts: i64) -> String {
        match self {
            Self::EmailVerification => format!("{}{ts}{}", user.id, user.is_active),
            Self::PasswordReset => {
                let last_login = user
                    .last_login
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                format!(
                    "{}{}{last_login}{ts}{}",
                    user.id, user.password_hash, user.email
                )
            }
        }
    }
}

#[derive(Clone)]
pub struct AccountTokens {
    secret: SecretString,
    ttl_seconds: i64,
}

impl AccountTokens {
    #[must_use]
    pub fn new(secret: SecretString, ttl_seconds: i64) -> Self {
        Self {
            secret,
            ttl_seconds,
        }
    }

    /// Mint a token for `user` at the current time.
    ///
    /// # Errors
    /// Returns an error if the HMAC cannot be initialized.
    pub fn make_token(&self, purpose: TokenPurpose, user: &User) -> Result<String> {
        self.make_token_at(purpose, user, now_ts())
    }

    #[must_use]
    pub fn check_token(&self, purpose: TokenPurpose, user: &User, token: &str) -> bool {
        self.check_token_at(purpose, user, token, now_ts())
    }

    fn make_token_at(&self, purpose: TokenPurpose, user: &User, ts: i64) -> Result<String> {
        let signature = self.signature(purpose, user, ts)?;
        Ok(format!("{}-{signature}", to_base36(ts)))
    }

    fn check_token_at(&self, purpose: TokenPurpose, user: &User, token: &str, now: i64) -> bool {
        let Some((ts_b36, signature)) = token.split_once('-') else {
            return false;
        };
        if ts_b36.is_empty() || ts_b36.len() > MAX_TS_LEN || signature.is_empty() {
            return false;
        }
        let Ok(ts) = i64::from_str_radix(ts_b36, 36) else {
            return false;
        };
        if ts < 0 || ts > now || now - ts > self.ttl_seconds {
            return false;
        }
        let Ok(expected) = self.signature(purpose, user, ts) else {
            return false;
        };
        constant_time_eq(expected.as_bytes(), signature.as_bytes())
    }

    fn signature(&self, purpose: TokenPurpose, user: &User, ts: i64) -> Result<String> {
        let mut key_hasher = Sha256::new();
        key_hasher.update(purpose.salt().as_bytes());
        key_hasher.update(self.secret.expose_secret().as_bytes());
        let key = key_hasher.finalize();

        let mut mac = Hmac::<Sha256>::new_from_slice(&key)
            .map_err(|_| anyhow!("failed to initialize HMAC"))?;
        mac.update(purpose.hash_value(user, ts).as_bytes());
        let digest = mac.finalize().into_bytes();

        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest.iter() {
            let _ = write!(hex, "{byte:02x}");
        }
        Ok(hex.chars().step_by(2).collect())
    }
}

fn now_ts() -> i64 {
    Utc::now().timestamp() - TOKEN_EPOCH
}

fn to_base36(mut value: i64) -> String {
    if value <= 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let digit = u32::try_from(value % 36).unwrap_or_default();
        digits.push(char::from_digit(digit, 36).unwrap_or('0'));
        value /= 36;
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TTL: i64 = 259_200;

    fn tokens() -> AccountTokens {
        AccountTokens::new(SecretString::from("test-secret"), TTL)
    }

    fn user() -> User {
        User {
            id: 7,
            email: "user@example.com".to_string(),
            password_hash: "$argon2id$hash".to_string(),
            is_active: false,
            is_staff: false,
            last_login: None,
            date_joined: Utc::now(),
        }
    }

    #[test]
    fn base36_matches_radix_parse() {
        for value in [0_i64, 1, 35, 36, 1_295, 813_470_400] {
            let encoded = to_base36(value);
            assert_eq!(i64::from_str_radix(&encoded, 36).unwrap(), value);
        }
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn token_shape() {
        let token = tokens()
            .make_token(TokenPurpose::EmailVerification, &user())
            .unwrap();
        let (ts, sig) = token.split_once('-').unwrap();
        assert!(ts.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(sig.len(), 32);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verification_token_dies_on_activation() {
        let generator = tokens();
        let mut user = user();
        let token = generator.make_token(TokenPurpose::EmailVerification, &user).unwrap();
        assert!(generator.check_token(TokenPurpose::EmailVerification, &user, &token));

        user.is_active = true;
        assert!(!generator.check_token(TokenPurpose::EmailVerification, &user, &token));
    }

    #[test]
    fn purposes_do_not_cross_validate() {
        let generator = tokens();
        let user = user();
        let verify = generator.make_token(TokenPurpose::EmailVerification, &user).unwrap();
        let reset = generator.make_token(TokenPurpose::PasswordReset, &user).unwrap();
        assert!(!generator.check_token(TokenPurpose::PasswordReset, &user, &verify));
        assert!(!generator.check_token(TokenPurpose::EmailVerification, &user, &reset));
    }

    #[test]
    fn reset_token_dies_on_password_change_or_login() {
        let generator = tokens();
        let mut user = user();
        let token = generator.make_token(TokenPurpose::PasswordReset, &user).unwrap();
        assert!(generator.check_token(TokenPurpose::PasswordReset, &user, &token));

        let mut logged_in = user.clone();
        logged_in.last_login = Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert!(!generator.check_token(TokenPurpose::PasswordReset, &logged_in, &token));

        user.password_hash = "$argon2id$other".to_string();
        assert!(!generator.check_token(TokenPurpose::PasswordReset, &user, &token));
    }

    #[test]
    fn expiry_window() {
        let generator = tokens();
        let user = user();
        let issued = 700_000_000;
        let token = generator
            .make_token_at(TokenPurpose::EmailVerification, &user, issued)
            .unwrap();

        assert!(generator.check_token_at(TokenPurpose::EmailVerification, &user, &token, issued));
        assert!(generator.check_token_at(
            TokenPurpose::EmailVerification,
            &user,
            &token,
            issued + TTL
        ));
        assert!(!generator.check_token_at(
            TokenPurpose::EmailVerification,
            &user,
            &token,
            issued + TTL + 1
        ));
        // Issued in the future relative to the checker's clock.
        assert!(!generator.check_token_at(
            TokenPurpose::EmailVerification,
            &user,
            &token,
            issued - 1
        ));
    }

    #[test]
    fn wrong_secret_rejected() {
        let user = user();
        let token = tokens()
            .make_token(TokenPurpose::EmailVerification, &user)
            .unwrap();
        let other = AccountTokens::new(SecretString::from("other-secret"), TTL);
        assert!(!other.check_token(TokenPurpose::EmailVerification, &user, &token));
    }

    #[test]
    fn malformed_tokens_rejected() {
        let generator = tokens();
        let user = user();
        for token in [
            "",
            "-",
            "abc",
            "-deadbeef",
            "zzzzzzzzzzzzzzzzzz-deadbeef",
            "!!-deadbeef",
            "1-",
        ] {
            assert!(
                !generator.check_token(TokenPurpose::EmailVerification, &user, token),
                "{token:?} should be rejected"
            );
        }
    }
}
