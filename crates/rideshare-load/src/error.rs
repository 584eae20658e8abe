//! Error types for the load/clear pipeline.

use thiserror::Error;

/// SQLSTATE codes retried as transient.
const RETRYABLE_SQLSTATES: &[&str] = &[
    // serialization_failure (CockroachDB transaction retry)
    "40001",
    // deadlock_detected
    "40P01",
    // lock_not_available
    "55P03",
    // query_canceled (statement timeout)
    "57014",
    // admin_shutdown / crash_shutdown / cannot_connect_now
    "57P01",
    "57P02",
    "57P03",
];

/// Errors that can occur while loading, clearing or verifying a region.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Bad or missing configuration, detected before any work starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection loss, serialization conflict or lock timeout.
    #[error("Transient database error: {0}")]
    Transient(String),

    /// Foreign key, uniqueness or check constraint violation.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Any other database error.
    #[error("Database error: {0}")]
    Database(String),

    /// The connection pool could not hand out a connection.
    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl LoadError {
    /// Whether retrying the same batch can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::Transient(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, LoadError::Configuration(_))
    }

    /// Classify a database error by its SQLSTATE code.
    pub fn from_sqlstate(code: &str, message: impl Into<String>) -> Self {
        let message = format!("{} (SQLSTATE {code})", message.into());
        if RETRYABLE_SQLSTATES.contains(&code) || code.starts_with("08") {
            LoadError::Transient(message)
        } else if code.starts_with("23") || code == "22P02" {
            LoadError::ConstraintViolation(message)
        } else {
            LoadError::Database(message)
        }
    }
}

impl From<tokio_postgres::Error> for LoadError {
    fn from(e: tokio_postgres::Error) -> Self {
        match e.as_db_error() {
            Some(db) => LoadError::from_sqlstate(db.code().code(), db.message()),
            // No server response: the connection failed or was closed
            None => LoadError::Transient(e.to_string()),
        }
    }
}
