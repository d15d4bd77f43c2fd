//! Tracing subscriber bootstrap.
//!
//! `RUST_LOG` wins over the configured level when it is set.

use crate::config::LoggingConfig;
use crate::error::{ServerError, ServerResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub fn init_logging(config: &LoggingConfig) -> ServerResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|err| ServerError::Config(format!("invalid log level `{}`: {}", config.level, err)))?,
    };

    let registry = Registry::default().with(filter);
    let installed = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(true)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };

    installed.map_err(|err| ServerError::Config(format!("logging already initialized: {err}")))?;
    tracing::debug!(level = %config.level, json = config.json, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialization_is_an_error_not_a_panic() {
        let config = LoggingConfig {
            level: "warn".into(),
            json: false,
        };
        let _ = init_logging(&config);
        assert!(matches!(init_logging(&config), Err(ServerError::Config(_))));
    }
}
