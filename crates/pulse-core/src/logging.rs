//! Tracing subscriber setup.
//!
//! Filter precedence, highest first: `PULSE_LOG` directives, `RUST_LOG`, then the
//! configured `logging.level`. `logging.format` selects compact console output or
//! newline-delimited JSON on stderr.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::LoggingError;

/// Target prefix shared by every pulse crate.
pub const TARGET_PREFIX: &str = "pulse";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_env_filter(config, |key| std::env::var(key).ok())?;
    let stderr_is_tty = std::io::IsTerminal::is_terminal(&std::io::stderr());

    let result = if config.format.trim().eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(stderr_is_tty)
                    .with_target(true)
                    .compact(),
            )
            .try_init()
    };
    result.map_err(|_| LoggingError::AlreadyInstalled)
}

/// Resolve the filter directives through `lookup` (environment in production).
pub fn build_env_filter<F>(config: &LoggingConfig, lookup: F) -> Result<EnvFilter, LoggingError>
where
    F: Fn(&str) -> Option<String>,
{
    for key in ["PULSE_LOG", "RUST_LOG"] {
        if let Some(directives) = lookup(key).filter(|value| !value.trim().is_empty()) {
            if let Ok(filter) = EnvFilter::try_new(directives.trim()) {
                return Ok(filter);
            }
        }
    }

    let level = config.level.trim().to_ascii_lowercase();
    let directive = format!("warn,{TARGET_PREFIX}={level}");
    EnvFilter::try_new(&directive).map_err(|err| LoggingError::Filter {
        directive,
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::build_env_filter;
    use crate::config::LoggingConfig;

    #[test]
    fn configured_level_scopes_pulse_targets() {
        let config = LoggingConfig {
            level: "debug".into(),
            format: "console".into(),
        };
        let filter = match build_env_filter(&config, |_| None) {
            Ok(filter) => filter,
            Err(err) => panic!("filter: {err}"),
        };
        let rendered = filter.to_string();
        assert!(rendered.contains("pulse=debug"), "{rendered}");
    }

    #[test]
    fn pulse_log_takes_precedence_over_rust_log() {
        let config = LoggingConfig::default();
        let filter = build_env_filter(&config, |key| match key {
            "PULSE_LOG" => Some("pulse_console=trace".to_string()),
            "RUST_LOG" => Some("error".to_string()),
            _ => None,
        });
        match filter {
            Ok(filter) => assert_eq!(filter.to_string(), "pulse_console=trace"),
            Err(err) => panic!("filter: {err}"),
        }
    }

    #[test]
    fn unparseable_env_falls_back_to_config() {
        let config = LoggingConfig::default();
        let filter = build_env_filter(&config, |key| {
            (key == "PULSE_LOG").then(|| "pulse=[[[".to_string())
        });
        assert!(filter.is_ok());
    }
}
