//! Logging error types

use thiserror::Error;

/// Errors raised while installing the global subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive could not be parsed
    #[error("Invalid log filter {directive:?}: {message}")]
    InvalidFilter {
        /// Directive as given
        directive: String,
        /// Parser message
        message: String,
    },

    /// A global subscriber is already installed
    #[error("Tracing subscriber error: {0}")]
    AlreadyInitialized(String),
}

/// Result type for logging setup
pub type LoggingResult<T> = Result<T, LoggingError>;
