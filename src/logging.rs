/// Tracing subscriber setup.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, RunMode};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber once per process.
///
/// `RUST_LOG` wins over the configured level. Logs always go to stderr so the
/// console menu on stdout stays readable; ANSI colours are dropped in console mode
/// for the same reason.
pub fn init_logging(config: &Config) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let console = config.mode == RunMode::Console;
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(!console)
                .with_ansi(!console),
        );

        // Tests and embedders may have installed their own subscriber already
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already set; keeping it");
        }

        tracing::info!(mode = ?config.mode, level = %config.log_level, "Logging initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = Config::default();
        init_logging(&config);
        init_logging(&config);
        assert!(LOGGER_INITIALIZED.get().is_some());
    }
}
