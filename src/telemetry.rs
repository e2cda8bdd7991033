//! Tracing subscriber setup.
//!
//! Logs always go to stderr; stdout belongs to the line channel.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// `RUST_LOG` wins over the configured level when set.
pub fn filter(settings: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
}

/// Installs the global subscriber. Fails if one is already set.
pub fn init(settings: &LoggingConfig) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(filter(settings));
    if settings.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().compact().with_target(true).with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_applies_without_rust_log() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let settings = LoggingConfig {
            level: "debug".into(),
            json: false,
        };
        assert_eq!(filter(&settings).to_string(), "debug");
    }

    #[test]
    fn second_init_is_rejected() {
        let settings = LoggingConfig {
            level: "warn".into(),
            json: true,
        };
        let _ = init(&settings);
        assert!(init(&settings).is_err());
    }
}
