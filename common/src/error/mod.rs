//! Error types for the marketplace
//!
//! This module provides a unified error handling system for all services of
//! the marketplace. Every variant maps to a stable machine-checkable code so
//! that the outer layers (HTTP, CLI) can branch on the kind of failure without
//! parsing messages.

use std::fmt::Display;
use thiserror::Error;

/// Marketplace error type
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Category missing or inactive
    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    /// Meeting point missing
    #[error("Invalid meeting point: {0}")]
    InvalidMeetingPoint(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// State machine guard violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Ledger debit larger than the available balance
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Account is not active
    #[error("Account inactive: {0}")]
    AccountInactive(String),

    /// Actor is not the required party
    #[error("Authorization error: {0}")]
    AuthorizationError(String),

    /// Lock contention or deadlock in the store; the whole operation may be retried
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Database migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Decimal conversion error
    #[error("Decimal conversion error: {0}")]
    DecimalError(String),
}

impl Error {
    /// Stable code identifying the kind of error
    pub fn code(&self) -> &'static str {
        match self {
            Error::ValidationError(_) => "validation_error",
            Error::InvalidCategory(_) => "invalid_category",
            Error::InvalidMeetingPoint(_) => "invalid_meeting_point",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::InsufficientFunds(_) => "insufficient_funds",
            Error::AccountInactive(_) => "account_inactive",
            Error::AuthorizationError(_) => "authorization_error",
            Error::TransientStore(_) => "transient_store_error",
            Error::ConfigurationError(_) => "configuration_error",
            Error::Internal(_) => "internal_error",
            Error::Database(_) => "database_error",
            Error::Migration(_) => "migration_error",
            Error::Serialization(_) => "serialization_error",
            Error::DecimalError(_) => "decimal_error",
        }
    }

    /// Whether the caller may retry the whole operation from scratch
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientStore(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait to add context to error results
pub trait ErrorExt<T> {
    /// Add context information to an error
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T> ErrorExt<T> for Result<T> {
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|e| {
            let context = context_fn().to_string();
            match e {
                Error::ValidationError(msg) => Error::ValidationError(format!("{}: {}", context, msg)),
                Error::InvalidCategory(msg) => Error::InvalidCategory(format!("{}: {}", context, msg)),
                Error::InvalidMeetingPoint(msg) => Error::InvalidMeetingPoint(format!("{}: {}", context, msg)),
                Error::NotFound(msg) => Error::NotFound(format!("{}: {}", context, msg)),
                Error::Conflict(msg) => Error::Conflict(format!("{}: {}", context, msg)),
                Error::InsufficientFunds(msg) => Error::InsufficientFunds(format!("{}: {}", context, msg)),
                Error::AccountInactive(msg) => Error::AccountInactive(format!("{}: {}", context, msg)),
                Error::AuthorizationError(msg) => Error::AuthorizationError(format!("{}: {}", context, msg)),
                Error::TransientStore(msg) => Error::TransientStore(format!("{}: {}", context, msg)),
                Error::ConfigurationError(msg) => Error::ConfigurationError(format!("{}: {}", context, msg)),
                Error::Internal(msg) => Error::Internal(format!("{}: {}", context, msg)),
                Error::DecimalError(msg) => Error::DecimalError(format!("{}: {}", context, msg)),
                Error::Database(e) => Error::Database(e),
                Error::Migration(e) => Error::Migration(e),
                Error::Serialization(e) => Error::Serialization(e),
            }
        })
    }
}

/// Trait for converting other error types to our Error type
pub trait IntoError {
    /// Convert to Error
    fn into_error(self, message: &str) -> Error;
}

impl<E: std::error::Error> IntoError for E {
    fn into_error(self, message: &str) -> Error {
        Error::Internal(format!("{}: {}", message, self))
    }
}

// Postgres SQLSTATE codes that mean "try the whole unit again"
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const UNIQUE_VIOLATION: &str = "23505";

/// Classify sqlx errors so lock contention surfaces as a retryable failure
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|dbe| dbe.code().map(|c| c.into_owned()));

        match code.as_deref() {
            Some(DEADLOCK_DETECTED) | Some(SERIALIZATION_FAILURE) | Some(LOCK_NOT_AVAILABLE) => {
                Error::TransientStore(err.to_string())
            }
            Some(UNIQUE_VIOLATION) => Error::Conflict(err.to_string()),
            _ => match err {
                sqlx::Error::PoolTimedOut => Error::TransientStore("connection pool timed out".to_string()),
                other => Error::Database(other),
            },
        }
    }
}

/// From rust_decimal::Error
impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::DecimalError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    use sqlx::error::{DatabaseError, ErrorKind};

    use super::*;

    #[derive(Debug)]
    struct PgState(&'static str);

    impl fmt::Display for PgState {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "sqlstate {}", self.0)
        }
    }

    impl StdError for PgState {}

    impl DatabaseError for PgState {
        fn message(&self) -> &str {
            self.0
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn from_state(state: &'static str) -> Error {
        Error::from(sqlx::Error::Database(Box::new(PgState(state))))
    }

    #[test]
    fn test_lock_failures_are_transient() {
        for state in [DEADLOCK_DETECTED, SERIALIZATION_FAILURE, LOCK_NOT_AVAILABLE] {
            let err = from_state(state);
            assert_eq!(err.code(), "transient_store_error");
            assert!(err.is_retryable());
        }
        assert!(Error::from(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let err = from_state(UNIQUE_VIOLATION);
        assert_eq!(err.code(), "conflict");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_other_database_errors_are_not_retryable() {
        let err = from_state("42P01");
        assert_eq!(err.code(), "database_error");
        assert!(!err.is_retryable());
        assert!(!Error::NotFound("account".to_string()).is_retryable());
    }
}
