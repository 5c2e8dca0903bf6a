//! Unified error handling for the trendbot crate
//!
//! Domain modules keep their own error types ([`FetchError`],
//! [`ChannelError`], [`SchedulerError`]); this module wraps them in a single
//! [`Error`] for callers that cross module boundaries, such as the CLI.
//!
//! # Architecture
//!
//! - [`TrendbotErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors

use std::io;
use thiserror::Error;

pub use crate::notifications::ChannelError;
pub use crate::scheduler::SchedulerError;
pub use crate::sources::FetchError;

/// Common trait for trendbot error types
pub trait TrendbotErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Platform API errors (HTTP, auth, rate limit)
    Network,
    /// Alert delivery errors
    Notification,
    /// Decoding and serialization errors
    Parsing,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Scheduler and task errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Notification => "notification",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the trendbot crate
#[derive(Error, Debug)]
pub enum Error {
    /// Platform fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Notification channel errors
    #[error("Notification error: {0}")]
    Channel(#[from] ChannelError),

    /// Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TrendbotErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_retryable(),
            Self::Channel(e) => e.is_retryable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Database(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(FetchError::Decode(_)) => ErrorCategory::Parsing,
            Self::Fetch(FetchError::MissingCredentials(_)) => ErrorCategory::Config,
            Self::Fetch(_) | Self::Http(_) => ErrorCategory::Network,
            Self::Channel(ChannelError::InvalidConfig(_)) => ErrorCategory::Config,
            Self::Channel(_) => ErrorCategory::Notification,
            Self::Scheduler(SchedulerError::InvalidHour { .. })
            | Self::Scheduler(SchedulerError::InvalidInterval { .. }) => ErrorCategory::Config,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
