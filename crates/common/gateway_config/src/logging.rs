//! Logging set-up of the gateway clients
//!
//! Log events are written to stderr, with colors when stderr is a terminal.
use crate::ConfigError;
use crate::LogConfig;
use std::io::IsTerminal;
use std::sync::Arc;
use tracing_subscriber::util::SubscriberInitExt;

pub const DEFAULT_MAX_LEVEL: tracing::Level = tracing::Level::INFO;

/// The basic subscriber
macro_rules! subscriber_builder {
    () => {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal() && yansi::Condition::no_color())
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
    };
}

/// Configures and enables logging taking into account env variables and file config.
///
/// 1. If `RUST_LOG` variable is set, it is used
/// 2. Otherwise the level of the `[log]` table is used, if any
/// 3. Otherwise the info level is used
///
/// Reports all the log events sent either with the `log` crate or the `tracing` crate.
pub fn log_init(config: &LogConfig) -> Result<(), ConfigError> {
    logger(config)?.init();
    Ok(())
}

fn logger(config: &LogConfig) -> Result<Arc<dyn tracing::Subscriber + Send + Sync>, ConfigError> {
    let log_level = config.max_level()?.unwrap_or(DEFAULT_MAX_LEVEL);
    let subscriber = subscriber_builder!();

    if std::env::var("RUST_LOG").is_ok() {
        return Ok(Arc::new(
            subscriber
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_file(true)
                .with_line_number(true)
                .finish(),
        ));
    }

    Ok(Arc::new(subscriber.with_max_level(log_level).finish()))
}

/// Initializes a tracing subscriber with a given log level if environment
/// variable `RUST_LOG` is not present.
pub fn set_log_level(log_level: tracing::Level) {
    let subscriber = subscriber_builder!();

    if std::env::var("RUST_LOG").is_ok() {
        subscriber
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    } else {
        subscriber.with_max_level(log_level).init();
    }
}
