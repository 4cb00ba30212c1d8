use clap::{Arg, ArgAction, ArgMatches, Command, builder::ValueParser};

use crate::cli::telemetry::LogFormat;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_JSON: &str = "log-json";

/// Accepts a level name or a number `0..=5`.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>()
            && parsed <= 5
        {
            return Ok(parsed);
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn log_format(matches: &ArgMatches) -> LogFormat {
    if matches.get_flag(ARG_LOG_JSON) {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("BOILERPLATE_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .arg(
            Arg::new(ARG_LOG_JSON)
                .long(ARG_LOG_JSON)
                .help("Emit logs as JSON lines instead of the pretty format")
                .env("BOILERPLATE_LOG_JSON")
                .action(ArgAction::SetTrue),
        )
}
