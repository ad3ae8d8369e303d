//! # Stratus Log
//!
//! `tracing` subscriber setup for the Stratus agent.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! fn main() -> Result<(), stratus_log::LogError> {
//!     stratus_log::auto_init()?;
//!
//!     tracing::info!(node = "worker-1", "agent starting");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod builder;
mod config;
mod error;

pub use builder::LoggerBuilder;
pub use config::{Config, ENV_LOG, ENV_LOG_FORMAT, Format};
pub use error::LogError;

/// Pick a configuration from the environment and build profile, then
/// install it.
///
/// `STRATUS_LOG` / `RUST_LOG` select [`Config::from_env`]; otherwise debug
/// builds get [`Config::development`] and release builds
/// [`Config::production`].
pub fn auto_init() -> Result<(), LogError> {
    if std::env::var(ENV_LOG).is_ok() || std::env::var("RUST_LOG").is_ok() {
        init_with(Config::from_env())
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Initialize with default configuration
pub fn init() -> Result<(), LogError> {
    init_with(Config::default())
}

/// Initialize with custom configuration
pub fn init_with(config: Config) -> Result<(), LogError> {
    LoggerBuilder::from_config(config).build()
}

/// Initialize for tests; a no-op if a subscriber is already installed.
pub fn init_test() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = init_with(Config::test());
}
