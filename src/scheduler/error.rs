//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// `run` called while a run is active
    AlreadyRunning,

    /// A periodic task panicked or was cancelled
    TaskFailed {
        reason: String,
    },

    /// Invalid hour value (must be 0-23)
    InvalidHour {
        hour: u32,
    },

    /// Zero or otherwise unusable task interval
    InvalidInterval {
        task: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "Scheduler is already running"),
            Self::TaskFailed { reason } => write!(f, "Scheduled task failed: {}", reason),
            Self::InvalidHour { hour } => {
                write!(f, "Invalid hour '{}'. Must be 0-23", hour)
            }
            Self::InvalidInterval { task } => {
                write!(f, "Invalid interval for task '{}': must be greater than 0", task)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<tokio::task::JoinError> for SchedulerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed {
            reason: err.to_string(),
        }
    }
}

impl SchedulerError {
    pub fn invalid_hour(hour: u32) -> Self {
        Self::InvalidHour { hour }
    }

    pub fn invalid_interval(task: impl Into<String>) -> Self {
        Self::InvalidInterval { task: task.into() }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AlreadyRunning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_hour_error() {
        let err = SchedulerError::invalid_hour(25);
        assert!(err.to_string().contains("25"));
        assert!(err.to_string().contains("0-23"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(SchedulerError::AlreadyRunning.is_recoverable());
        assert!(!SchedulerError::invalid_interval("reddit").is_recoverable());
    }

    #[tokio::test]
    async fn test_from_join_error() {
        let handle = tokio::spawn(async { panic!("boom") });
        let err: SchedulerError = handle.await.unwrap_err().into();
        assert!(matches!(err, SchedulerError::TaskFailed { .. }));
        assert!(err.to_string().contains("panicked"));
    }
}
