//! # Dhikr Common
//!
//! Shared error types, logging configuration, and timeout helpers used by the
//! dhikr counter offline worker crates.
//!
//! ## Features
//!
//! - Unified error type with backtrace support
//! - Logging configuration and setup
//! - Bounded network attempts via [`with_timeout`]
//! - Result extension traits

use std::time::Duration;
use thiserror::Error;

pub mod logging;
pub mod timeout;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use timeout::with_timeout;

/// Unified error type for the dhikr crates.
#[derive(Error, Debug)]
pub enum DhikrError {
    /// Network-related errors.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

impl DhikrError {
    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            DhikrError::Network { .. } => "network",
            DhikrError::Config { .. } => "config",
            DhikrError::Io(_) => "io",
            DhikrError::Timeout(_) => "timeout",
            DhikrError::InvalidArgument(_) => "invalid_argument",
            DhikrError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for dhikr operations.
pub type Result<T> = std::result::Result<T, DhikrError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| DhikrError::Internal {
            message: format!("{}: {}", message.into(), e),
            backtrace: Some(backtrace::Backtrace::new()),
        })
    }
}
