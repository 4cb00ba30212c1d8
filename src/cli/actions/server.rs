use crate::{
    api::{
        self,
        email::{EmailWorkerConfig, LogEmailSender, spawn_email_worker},
        handlers::auth::{AuthConfig, AuthState},
    },
    cli::telemetry,
    storage,
};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub secret_key: SecretString,
    pub public_base_url: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub account_token_ttl_seconds: i64,
    pub reset_conceal_unknown_email: bool,
    pub email_from: String,
    pub email_max_attempts: u32,
    pub email_backoff_base_seconds: u64,
    pub email_backoff_max_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be reached or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store = storage::connect(&args.dsn).await?;

    let email_config = EmailWorkerConfig::new()
        .with_max_attempts(args.email_max_attempts)
        .with_backoff_base_seconds(args.email_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_backoff_max_seconds);
    let (email_queue, _worker) =
        spawn_email_worker(Arc::new(LogEmailSender::new(args.email_from)), email_config);

    let auth_config = AuthConfig::new(args.public_base_url)
        .with_access_token_ttl_seconds(args.access_token_ttl_seconds)
        .with_refresh_token_ttl_seconds(args.refresh_token_ttl_seconds)
        .with_account_token_ttl_seconds(args.account_token_ttl_seconds)
        .with_reset_conceal_unknown_email(args.reset_conceal_unknown_email);
    let auth_state = Arc::new(AuthState::new(auth_config, args.secret_key, email_queue));

    let app = api::app(store, auth_state)?;
    let result = api::serve(args.port, app).await;

    telemetry::shutdown_tracer();
    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("public_base_url", args.public_base_url.clone()),
        (
            "token_ttls",
            format!(
                "access={}s refresh={}s account={}s",
                args.access_token_ttl_seconds,
                args.refresh_token_ttl_seconds,
                args.account_token_ttl_seconds
            ),
        ),
        (
            "reset_conceal_unknown_email",
            args.reset_conceal_unknown_email.to_string(),
        ),
        ("email_from", args.email_from.clone()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} ({})\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
