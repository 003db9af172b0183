//! Error types for the scheduler module

use std::fmt;

use crate::error::{ErrorCategory, QuillError};

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Invalid hour value (must be 0-23)
    InvalidHour { field: String, hour: u32 },

    /// UTC offset outside +/- 14 hours
    InvalidOffset { minutes: i32 },

    /// Trigger configuration error
    TriggerConfigError { field: String, reason: String },
}

impl SchedulerError {
    pub fn trigger_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TriggerConfigError {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHour { field, hour } => {
                write!(f, "Invalid {field} '{hour}'. Must be 0-23")
            }
            Self::InvalidOffset { minutes } => {
                write!(f, "Invalid UTC offset of {minutes} minutes")
            }
            Self::TriggerConfigError { field, reason } => {
                write!(f, "Trigger config error in '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl QuillError for SchedulerError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = SchedulerError::InvalidHour {
            field: String::from("start_hour"),
            hour: 25,
        };
        assert_eq!(err.to_string(), "Invalid start_hour '25'. Must be 0-23");

        let err = SchedulerError::trigger_config("tick_secs", "must be positive");
        assert!(err.to_string().contains("tick_secs"));
        assert!(!err.is_recoverable());
    }
}
