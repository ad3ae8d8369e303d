//! Configuration types and presets

use serde::{Deserialize, Serialize};

/// Environment variable holding the filter directive.
pub const ENV_LOG: &str = "STRATUS_LOG";
/// Environment variable holding the output format.
pub const ENV_LOG_FORMAT: &str = "STRATUS_LOG_FORMAT";

/// How the agent's `tracing` output is filtered and rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filter directive (e.g., "info", "debug,stratus_storage=trace")
    pub level: String,

    /// Rendering of each event
    pub format: Format,

    /// ANSI colors (ignored for JSON)
    pub colors: bool,

    /// Include the event target
    pub target: bool,

    /// Include the emitting thread's id
    pub thread_ids: bool,

    /// Include `file:line`
    pub source: bool,
}

/// Event rendering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Human-readable, multi-line
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

impl Format {
    fn parse_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            colors: true,
            target: true,
            thread_ids: false,
            source: false,
        }
    }
}

impl Config {
    /// Defaults overridden from the environment
    ///
    /// `STRATUS_LOG` wins over `RUST_LOG`; `STRATUS_LOG_FORMAT` picks the
    /// format.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup(ENV_LOG).or_else(|| lookup("RUST_LOG")) {
            config.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.format = Format::parse_lossy(&format);
            if config.format == Format::Json {
                config.colors = false;
            }
        }

        config
    }

    /// Local runs: pretty, `debug`, with source locations
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            source: true,
            ..Self::default()
        }
    }

    /// Deployed agents: JSON at `info`
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            colors: false,
            ..Self::default()
        }
    }

    /// Test runs: compact `trace` without colors
    #[must_use]
    pub fn test() -> Self {
        Self {
            level: "trace".to_string(),
            format: Format::Compact,
            colors: false,
            ..Self::default()
        }
    }
}
