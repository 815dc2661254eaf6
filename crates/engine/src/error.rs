//! Engine Error Types
//!
//! The stable taxonomy every operation reports. Errors from the storage
//! crates are re-raised into one of these kinds before leaving the engine,
//! so consumers (the dispatcher, the transport) only ever see this set.

use derive_more::{Display, Error};

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally: fix the request, pick a different target, confirm a forced
/// shift, flip a config switch, or retry later.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Parameter parse or validation failure.
    #[display("bad request: {_0}")]
    BadRequest(#[error(not(source))] String),
    /// The item exists but cannot own markers (show, season, artist, album,
    /// track) for an operation that requires an episode or movie.
    #[display("item {_0} cannot own markers")]
    BadTarget(#[error(not(source))] i64),
    /// Marker id, item id, or operation name does not exist.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The proposed interval conflicts with another marker on the same parent.
    #[display("interval [{_0}, {_1}) overlaps an existing marker")]
    Overlap(#[error(not(source))] i64, i64),
    /// A bulk shift was refused because the subtree contains linked markers.
    #[display("subtree contains items with multiple markers; retry with force")]
    Conflict,
    /// A bulk shift was refused because markers would leave the playable range.
    #[display("shift would push markers outside the playable range")]
    Overflow,
    /// The operation needs a feature the configuration has switched off.
    #[display("feature disabled by configuration: {_0}")]
    FeatureDisabled(#[error(not(source))] &'static str),
    /// The service is suspended or its database handles are closed.
    #[display("service is unavailable")]
    Unavailable,
    /// Storage failure or invariant violation; the mutation was rolled back.
    #[display("internal storage error")]
    Internal,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable | Self::Internal)
    }
}
