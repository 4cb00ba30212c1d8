//! Auth state and configuration.

use secrecy::SecretString;

use crate::api::email::EmailQueue;
use crate::tokens::{AccountTokens, SessionIssuer};

const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_ACCOUNT_TOKEN_TTL_SECONDS: i64 = 3 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    public_base_url: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    account_token_ttl_seconds: i64,
    reset_conceal_unknown_email: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(public_base_url: String) -> Self {
        Self {
            public_base_url,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            account_token_ttl_seconds: DEFAULT_ACCOUNT_TOKEN_TTL_SECONDS,
            reset_conceal_unknown_email: false,
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_account_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.account_token_ttl_seconds = seconds;
        self
    }

    /// Answer reset requests for unknown emails with the same 200 as known ones.
    #[must_use]
    pub fn with_reset_conceal_unknown_email(mut self, conceal: bool) -> Self {
        self.reset_conceal_unknown_email = conceal;
        self
    }

    #[must_use]
    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub fn account_token_ttl_seconds(&self) -> i64 {
        self.account_token_ttl_seconds
    }

    pub(super) fn reset_conceal_unknown_email(&self) -> bool {
        self.reset_conceal_unknown_email
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_BASE_URL.to_string())
    }
}

/// Everything the auth handlers share: config, token generators and the mail queue.
pub struct AuthState {
    config: AuthConfig,
    account_tokens: AccountTokens,
    sessions: SessionIssuer,
    email: EmailQueue,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, secret: SecretString, email: EmailQueue) -> Self {
        let account_tokens =
            AccountTokens::new(secret.clone(), config.account_token_ttl_seconds());
        let sessions = SessionIssuer::new(
            secret,
            config.access_token_ttl_seconds(),
            config.refresh_token_ttl_seconds(),
        );
        Self {
            config,
            account_tokens,
            sessions,
            email,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn account_tokens(&self) -> &AccountTokens {
        &self.account_tokens
    }

    pub(crate) fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    pub(crate) fn email(&self) -> &EmailQueue {
        &self.email
    }
}

#[cfg(test)]
mod tests {
    use super::AuthConfig;

    #[test]
    fn defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.public_base_url(), "http://localhost:8080");
        assert_eq!(config.access_token_ttl_seconds(), 300);
        assert_eq!(config.refresh_token_ttl_seconds(), 86_400);
        assert_eq!(config.account_token_ttl_seconds(), 259_200);
        assert!(!config.reset_conceal_unknown_email());
    }

    #[test]
    fn builders_override() {
        let config = AuthConfig::new("https://app.example.com".to_string())
            .with_access_token_ttl_seconds(60)
            .with_refresh_token_ttl_seconds(120)
            .with_account_token_ttl_seconds(180)
            .with_reset_conceal_unknown_email(true);
        assert_eq!(config.public_base_url(), "https://app.example.com");
        assert_eq!(config.access_token_ttl_seconds(), 60);
        assert_eq!(config.refresh_token_ttl_seconds(), 120);
        assert_eq!(config.account_token_ttl_seconds(), 180);
        assert!(config.reset_conceal_unknown_email());
    }
}
