//! Core error types for the sync engine.
//!
//! This module defines database-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use chrono::{NaiveDate, ParseError as ChronoParseError};
use thiserror::Error;

use crate::sync::ErrorCategory;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the sync engine.
///
/// Database-specific errors are wrapped in string form to keep this type
/// database-agnostic.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Provider operation failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Normalization failed: {0}")]
    Normalization(String),

    #[error("Balance materialization failed: {0}")]
    Materialization(#[from] MaterializationError),

    #[error("Market data import failed: {0}")]
    MarketData(String),

    #[error("Sync run state error: {0}")]
    SyncState(String),

    #[error("Sync cancelled: {0}")]
    Cancelled(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Category recorded alongside the message in `sync_stats.errors`.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Database(_) => ErrorCategory::Database,
            Error::Validation(_) => ErrorCategory::Validation,
            Error::Provider(ProviderError::Timeout { .. }) => ErrorCategory::Timeout,
            Error::Provider(ProviderError::AuthenticationRequired(_)) => {
                ErrorCategory::Authentication
            }
            Error::Provider(_) => ErrorCategory::ProviderImport,
            Error::Normalization(_) => ErrorCategory::Normalization,
            Error::Materialization(_) => ErrorCategory::Materialization,
            Error::MarketData(_) => ErrorCategory::MarketData,
            Error::Cancelled(_) => ErrorCategory::Cancelled,
            Error::SyncState(_) | Error::Unexpected(_) => ErrorCategory::Unexpected,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Database(DatabaseError::NotFound(_)))
    }
}

/// Database-agnostic error type for storage operations.
///
/// This enum uses `String` for all error details, allowing the storage layer
/// to convert storage-specific errors (Diesel, SQLite, etc.) into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish a database connection.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or configure the connection pool.
    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (e.g., duplicate key).
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// A foreign key constraint was violated.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Database migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Internal/unexpected database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Errors raised by provider gateways.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider request to {provider} timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },

    #[error("Provider connection requires re-authentication: {0}")]
    AuthenticationRequired(String),

    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("Malformed provider payload: {0}")]
    InvalidPayload(String),
}

/// Errors that occur while recomputing an account's balance series.
#[derive(Error, Debug)]
pub enum MaterializationError {
    #[error("Account {account_id} has no opening anchor; forward materialization needs one")]
    MissingOpeningAnchor { account_id: String },

    #[error("Account {account_id} has no provider-reported balance; reverse materialization needs one")]
    MissingReportedBalance { account_id: String },

    #[error("Invalid window for account {account_id}: {start} is after {end}")]
    InvalidWindow {
        account_id: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Balance overflow for account {account_id} on {date}")]
    Overflow { account_id: String, date: NaiveDate },
}

/// Validation errors for user input and data parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),

    #[error("Failed to parse decimal number: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Failed to parse date/time: {0}")]
    DateTimeParse(#[from] ChronoParseError),
}

// === From implementations for common error types ===

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::Validation(ValidationError::DecimalParse(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::InvalidInput(err.to_string()))
    }
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Validation(ValidationError::DateTimeParse(err))
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
