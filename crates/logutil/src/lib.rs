//! Utilities for logging.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

/// Output format for the global logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingFormat {
    #[default]
    HumanReadable,
    Json,
    Compact,
}

/// Configure the global tracing subscriber.
///
/// `RUST_LOG` overrides the provided default level.
///
/// Panics if a global subscriber has already been set.
pub fn configure_global_logger(default_level: Level, format: LoggingFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let builder = SubscriberBuilder::default()
        .with_env_filter(env_filter)
        .with_file(true)
        .with_line_number(true);

    match format {
        LoggingFormat::HumanReadable => {
            let subscriber = builder.finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        LoggingFormat::Json => {
            let subscriber = builder.json().finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        LoggingFormat::Compact => {
            let subscriber = builder.compact().finish();
            tracing::subscriber::set_global_default(subscriber)
        }
    }
    .unwrap();
}

/// Install a subscriber writing through the test harness.
///
/// Safe to call from every test, only the first call installs anything.
pub fn init_test() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::DEBUG.into())
        .from_env_lossy();

    let subscriber = SubscriberBuilder::default()
        .with_test_writer()
        .with_env_filter(env_filter)
        .with_file(true)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_test_twice() {
        init_test();
        init_test();
        tracing::debug!("logger installed");
    }
}
