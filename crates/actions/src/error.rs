//! Action Log Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// An action log error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for action log operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("action log database error")]
    Database,
    #[display("action log migration error")]
    Migration,
    /// A stored row held a value the data model cannot represent.
    #[display("invalid action log data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}
