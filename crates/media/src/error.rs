//! Media Adapter Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A media adapter error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally. Lookups that can legitimately miss return `Option` instead of
/// an error; every kind here means the current mutation or query is dead.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The library database file does not exist (the adapter never creates it).
    #[display("library database not found: {}", _0.display())]
    MissingDatabase(#[error(not(source))] PathBuf),
    /// Query or transaction failure in the library database.
    #[display("library database error")]
    Database,
    /// A row held a value the data model cannot represent.
    #[display("invalid library data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}
