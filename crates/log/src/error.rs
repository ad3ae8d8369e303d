//! Error type for logger setup

/// Errors raised while installing the logger
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The filter directive could not be parsed
    #[error("invalid filter '{directive}': {reason}")]
    Filter {
        /// The rejected directive
        directive: String,
        /// Parser message
        reason: String,
    },

    /// The global subscriber could not be installed
    #[error("failed to initialise logger: {0}")]
    Init(String),
}
