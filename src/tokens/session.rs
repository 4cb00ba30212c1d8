//! HS256 access/refresh credentials.

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::storage::{RevokedToken, Store, UserId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub token_type: TokenType,
    pub user_id: UserId,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Token is invalid or expired")]
    Invalid,
    #[error("Token is invalid or expired")]
    Expired,
    #[error("Token has wrong type")]
    WrongType,
    #[error("Token is blacklisted")]
    Revoked,
    #[error("failed to encode token")]
    Encode(#[source] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct SessionIssuer {
    secret: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(secret: SecretString, access_ttl_seconds: i64, refresh_ttl_seconds: i64) -> Self {
        Self {
            secret,
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    /// Issue a fresh access/refresh pair for `user_id`.
    ///
    /// # Errors
    /// Returns [`SessionError::Encode`] if signing fails.
    pub fn issue(&self, user_id: UserId) -> Result<TokenPair, SessionError> {
        let now = Utc::now().timestamp();
        Ok(TokenPair {
            access: self.encode_at(TokenType::Access, user_id, now)?,
            refresh: self.encode_at(TokenType::Refresh, user_id, now)?,
        })
    }

    /// Mint a new access token from a refresh token that is valid and not revoked.
    ///
    /// # Errors
    /// Returns a [`SessionError`] describing why the refresh token was rejected.
    pub async fn refresh(&self, store: &dyn Store, refresh: &str) -> Result<String, SessionError> {
        let claims = self.decode(refresh, TokenType::Refresh)?;
        if store.is_token_revoked(&claims.jti).await? {
            return Err(SessionError::Revoked);
        }
        self.encode_at(TokenType::Access, claims.user_id, Utc::now().timestamp())
    }

    /// Put a refresh token on the deny-list. Fails if the token is unusable or
    /// was already revoked.
    ///
    /// # Errors
    /// Returns a [`SessionError`] describing why the token cannot be revoked.
    pub async fn revoke(&self, store: &dyn Store, refresh: &str) -> Result<Claims, SessionError> {
        let claims = self.decode(refresh, TokenType::Refresh)?;
        let expires_at =
            DateTime::<Utc>::from_timestamp(claims.exp, 0).ok_or(SessionError::Invalid)?;
        let inserted = store
            .revoke_token(RevokedToken {
                jti: claims.jti.clone(),
                user_id: claims.user_id,
                expires_at,
            })
            .await?;
        if !inserted {
            return Err(SessionError::Revoked);
        }
        Ok(claims)
    }

    /// Validate signature, expiry and type.
    ///
    /// # Errors
    /// Returns a [`SessionError`] when the token does not check out.
    pub fn decode(&self, token: &str, expected: TokenType) -> Result<Claims, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &validation,
        )
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => SessionError::Expired,
            _ => SessionError::Invalid,
        })?;

        if data.claims.token_type != expected {
            return Err(SessionError::WrongType);
        }
        Ok(data.claims)
    }

    fn encode_at(
        &self,
        token_type: TokenType,
        user_id: UserId,
        issued_at: i64,
    ) -> Result<String, SessionError> {
        let ttl = match token_type {
            TokenType::Access => self.access_ttl_seconds,
            TokenType::Refresh => self.refresh_ttl_seconds,
        };
        let claims = Claims {
            token_type,
            user_id,
            jti: Ulid::new().to_string(),
            iat: issued_at,
            exp: issued_at + ttl,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(SessionError::Encode)
    }
}
