//! Map parsed CLI arguments to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, auth, email};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let email_opts = email::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        secret_key: auth_opts.secret_key,
        public_base_url: auth_opts.public_base_url,
        access_token_ttl_seconds: auth_opts.access_token_ttl_seconds,
        refresh_token_ttl_seconds: auth_opts.refresh_token_ttl_seconds,
        account_token_ttl_seconds: auth_opts.account_token_ttl_seconds,
        reset_conceal_unknown_email: auth_opts.reset_conceal_unknown_email,
        email_from: email_opts.from,
        email_max_attempts: email_opts.max_attempts,
        email_backoff_base_seconds: email_opts.backoff_base_seconds,
        email_backoff_max_seconds: email_opts.backoff_max_seconds,
    }))
}
