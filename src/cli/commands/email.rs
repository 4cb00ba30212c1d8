use clap::{Arg, ArgMatches, Command};

pub const ARG_EMAIL_FROM: &str = "email-from";
pub const ARG_EMAIL_MAX_ATTEMPTS: &str = "email-max-attempts";
pub const ARG_EMAIL_BACKOFF_BASE: &str = "email-backoff-base-seconds";
pub const ARG_EMAIL_BACKOFF_MAX: &str = "email-backoff-max-seconds";

#[derive(Debug)]
pub struct Options {
    pub from: String,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            from: matches
                .get_one::<String>(ARG_EMAIL_FROM)
                .cloned()
                .unwrap_or_default(),
            max_attempts: matches
                .get_one::<u32>(ARG_EMAIL_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(5),
            backoff_base_seconds: matches
                .get_one::<u64>(ARG_EMAIL_BACKOFF_BASE)
                .copied()
                .unwrap_or(5),
            backoff_max_seconds: matches
                .get_one::<u64>(ARG_EMAIL_BACKOFF_MAX)
                .copied()
                .unwrap_or(300),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("Sender address for outgoing mail")
                .env("BOILERPLATE_EMAIL_FROM")
                .default_value("no-reply@boilerplate.dev"),
        )
        .arg(
            Arg::new(ARG_EMAIL_MAX_ATTEMPTS)
                .long(ARG_EMAIL_MAX_ATTEMPTS)
                .help("Delivery attempts per message before it is dropped")
                .env("BOILERPLATE_EMAIL_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_EMAIL_BACKOFF_BASE)
                .long(ARG_EMAIL_BACKOFF_BASE)
                .help("Base delay for the delivery retry backoff")
                .env("BOILERPLATE_EMAIL_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_EMAIL_BACKOFF_MAX)
                .long(ARG_EMAIL_BACKOFF_MAX)
                .help("Max delay for the delivery retry backoff")
                .env("BOILERPLATE_EMAIL_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}
