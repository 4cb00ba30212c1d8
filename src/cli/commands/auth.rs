use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SECRET_KEY: &str = "secret-key";
pub const ARG_PUBLIC_BASE_URL: &str = "public-base-url";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL: &str = "refresh-token-ttl-seconds";
pub const ARG_ACCOUNT_TOKEN_TTL: &str = "account-token-ttl-seconds";
pub const ARG_RESET_CONCEAL: &str = "reset-conceal-unknown-email";

#[derive(Debug)]
pub struct Options {
    pub secret_key: SecretString,
    pub public_base_url: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub account_token_ttl_seconds: i64,
    pub reset_conceal_unknown_email: bool,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the secret key is missing or blank.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret_key = matches
            .get_one::<String>(ARG_SECRET_KEY)
            .filter(|value| !value.trim().is_empty())
            .cloned()
            .with_context(|| format!("missing required argument: --{ARG_SECRET_KEY}"))?;

        let ttl = |id: &str| matches.get_one::<i64>(id).copied().unwrap_or_default();

        Ok(Self {
            secret_key: SecretString::from(secret_key),
            public_base_url: matches
                .get_one::<String>(ARG_PUBLIC_BASE_URL)
                .cloned()
                .unwrap_or_default(),
            access_token_ttl_seconds: ttl(ARG_ACCESS_TOKEN_TTL),
            refresh_token_ttl_seconds: ttl(ARG_REFRESH_TOKEN_TTL),
            account_token_ttl_seconds: ttl(ARG_ACCOUNT_TOKEN_TTL),
            reset_conceal_unknown_email: matches.get_flag(ARG_RESET_CONCEAL),
        })
    }
}

fn positive_seconds() -> clap::builder::RangedI64ValueParser<i64> {
    clap::value_parser!(i64).range(1..)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SECRET_KEY)
                .long(ARG_SECRET_KEY)
                .help("Key used to sign account links and JWTs")
                .env("BOILERPLATE_SECRET_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_PUBLIC_BASE_URL)
                .long(ARG_PUBLIC_BASE_URL)
                .help("Base URL used in email links and as the allowed CORS origin")
                .env("BOILERPLATE_PUBLIC_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long(ARG_ACCESS_TOKEN_TTL)
                .help("Access token lifetime in seconds")
                .env("BOILERPLATE_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("300")
                .value_parser(positive_seconds()),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL)
                .long(ARG_REFRESH_TOKEN_TTL)
                .help("Refresh token lifetime in seconds")
                .env("BOILERPLATE_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(positive_seconds()),
        )
        .arg(
            Arg::new(ARG_ACCOUNT_TOKEN_TTL)
                .long(ARG_ACCOUNT_TOKEN_TTL)
                .help("Lifetime of email verification and password reset links in seconds")
                .env("BOILERPLATE_ACCOUNT_TOKEN_TTL_SECONDS")
                .default_value("259200")
                .value_parser(positive_seconds()),
        )
        .arg(
            Arg::new(ARG_RESET_CONCEAL)
                .long(ARG_RESET_CONCEAL)
                .help("Answer password reset requests for unknown emails with 200")
                .env("BOILERPLATE_RESET_CONCEAL_UNKNOWN_EMAIL")
                .action(ArgAction::SetTrue),
        )
}
