//! Service Error Types
//!
//! Errors for configuration and lifecycle. Operation errors keep the engine
//! crate's taxonomy; nothing here leaks onto the wire.

use derive_more::{Display, Error};

/// A service error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The config file is missing required data or malformed.
    #[display("configuration error: {_0}")]
    Config(#[error(not(source))] &'static str),
    /// Filesystem failure reading or writing service-owned files.
    #[display("filesystem error")]
    Io,
    /// A database failed to open or the derived state failed to build.
    #[display("startup failure")]
    Startup,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io | Self::Startup)
    }
}
