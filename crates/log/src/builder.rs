//! Logger builder implementation

use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::{Config, Format};
use crate::error::LogError;

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Parse the filter directive without installing anything.
    pub fn filter(&self) -> Result<EnvFilter, LogError> {
        EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            directive: self.config.level.clone(),
            reason: e.to_string(),
        })
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already installed
    pub fn build(self) -> Result<(), LogError> {
        let filter = self.filter()?;
        let fmt_layer = self.fmt_layer();

        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(filter)
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
        let c = &self.config;
        let base = fmt::layer()
            .with_ansi(c.colors)
            .with_target(c.target)
            .with_thread_ids(c.thread_ids)
            .with_file(c.source)
            .with_line_number(c.source);

        match c.format {
            Format::Pretty => base.pretty().boxed(),
            Format::Compact => base.compact().boxed(),
            Format::Json => base.json().flatten_event(true).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_rejected() {
        let config = Config {
            level: "stratus=notalevel".to_string(),
            ..Config::default()
        };
        let err = LoggerBuilder::from_config(config).filter().unwrap_err();
        assert!(matches!(err, LogError::Filter { .. }));
    }

    #[test]
    fn valid_filter_parses() {
        let config = Config {
            level: "info,stratus_storage=trace".to_string(),
            ..Config::default()
        };
        assert!(LoggerBuilder::from_config(config).filter().is_ok());
    }
}
