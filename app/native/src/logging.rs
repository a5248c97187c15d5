//! Logging setup for the Winsync binary.
//!
//! Output goes to stderr so stdout stays clean for events and JSON. `RUST_LOG`
//! takes precedence over the configured level and the verbosity flags.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

/// How chatty the binary should be, from the command-line flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

/// Builds the filter directive for `winsync` from the config and flags.
#[must_use]
pub fn directive(config: &LoggingConfig, verbosity: Verbosity) -> String {
    let level = match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => config.level.as_str(),
        Verbosity::Verbose => "debug",
    };
    format!("winsync={level},winsync_lib={level}")
}

/// Installs the global subscriber.
///
/// Does nothing if a subscriber is already installed, so tests and embedders
/// keep theirs.
pub fn init(config: &LoggingConfig, verbosity: Verbosity, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive(config, verbosity)));

    let result = if json || config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if let Err(err) = result {
        tracing::debug!("logging already initialized: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_uses_config_level() {
        let config = LoggingConfig { level: "warn".to_string(), json: false };
        assert_eq!(directive(&config, Verbosity::Normal), "winsync=warn,winsync_lib=warn");
    }

    #[test]
    fn test_flags_override_config_level() {
        let config = LoggingConfig::default();
        assert!(directive(&config, Verbosity::Verbose).starts_with("winsync=debug"));
        assert!(directive(&config, Verbosity::Quiet).starts_with("winsync=error"));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let config = LoggingConfig::default();
        init(&config, Verbosity::Quiet, false);
        init(&config, Verbosity::Quiet, true);
    }
}
