//! Unified error handling for the roomwatch crate
//!
//! Domain errors ([`FetchError`], [`StorageError`], [`RetryError`]) stay
//! available for code that only touches one layer. Everything that crosses a
//! layer boundary (the orchestrators, the application context, the CLI
//! commands) uses [`Error`], whose [`ErrorCategory`] drives the handling
//! strategy.
//!
//! # Usage
//!
//! ```rust,ignore
//! use roomwatch::error::Error;
//!
//! fn handle_error(err: Error) {
//!     if err.is_fatal() {
//!         panic!("cannot continue: {err}");
//!     } else {
//!         println!("Skipping ({}): {err}", err.category());
//!     }
//! }
//! ```

use chrono::NaiveDate;
use thiserror::Error;

pub use crate::utils::error::{FetchError, StorageError};
pub use crate::utils::retry::RetryError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transport failures, unexpected statuses, exhausted retries
    Network,
    /// Token acquisition or rejection
    Session,
    /// Database and I/O errors
    Storage,
    /// Version-history integrity violations
    Integrity,
    /// Configuration and validation errors
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Session => "session",
            Self::Storage => "storage",
            Self::Integrity => "integrity",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the roomwatch crate
#[derive(Error, Debug)]
pub enum Error {
    /// Single failed request to the remote source
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Every attempt of a remote operation failed
    #[error(transparent)]
    RetriesExhausted(#[from] RetryError<FetchError>),

    /// Repository errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A historical backfill observed an update to an already stored event
    #[error(
        "Historical integrity violation: event {event_id} on {date} was updated; \
         the backfill range overlaps already tracked data"
    )]
    HistoricalIntegrity { event_id: i64, date: NaiveDate },

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => fetch_category(e),
            Self::RetriesExhausted(e) => fetch_category(&e.source),
            Self::Storage(_) => ErrorCategory::Storage,
            Self::HistoricalIntegrity { .. } => ErrorCategory::Integrity,
            Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Errors that must stop the process rather than skip a day
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::HistoricalIntegrity { .. }
                | Self::Config(_)
                | Self::Storage(StorageError::EventNotFound(_))
        )
    }
}

fn fetch_category(err: &FetchError) -> ErrorCategory {
    match err {
        FetchError::TokenNotFound => ErrorCategory::Session,
        e if e.invalidates_session() => ErrorCategory::Session,
        _ => ErrorCategory::Network,
    }
}

/// Result type alias using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = Error::Fetch(FetchError::Status(503));
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(!err.is_fatal());

        let err = Error::Fetch(FetchError::Status(401));
        assert_eq!(err.category(), ErrorCategory::Session);

        let err = Error::Fetch(FetchError::TokenNotFound);
        assert_eq!(err.category(), ErrorCategory::Session);

        let err = Error::config("bad interval");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_retries_exhausted_keeps_source_category() {
        let err = Error::from(RetryError {
            operation: "fetch 2026-10-20".to_string(),
            attempts: 5,
            source: FetchError::Status(403),
        });
        assert_eq!(err.category(), ErrorCategory::Session);
        assert_eq!(
            err.to_string(),
            "fetch 2026-10-20 failed after 5 attempt(s): Unexpected HTTP status: 403"
        );
    }

    #[test]
    fn test_historical_integrity_is_fatal() {
        let err = Error::HistoricalIntegrity {
            event_id: 500,
            date: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
        };
        assert!(err.is_fatal());
        assert_eq!(err.category(), ErrorCategory::Integrity);
        assert!(err.to_string().contains("event 500 on 2025-03-04"));
    }

    #[test]
    fn test_missing_event_is_fatal() {
        let err = Error::from(StorageError::EventNotFound(9));
        assert!(err.is_fatal());
        assert_eq!(err.category(), ErrorCategory::Storage);
    }
}
