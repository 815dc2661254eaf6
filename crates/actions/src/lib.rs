//! Durable, append-only history of marker mutations.
//!
//! The library database can lose our markers at any time: the media server
//! periodically regenerates its own analysis data and wipes guest rows along
//! with it. This crate is the service's memory. Every Add/Edit/Delete (and
//! the purge-side Restore/Ignore) is appended here, keyed by a *restore key*
//! that stays stable even when the library database renumbers marker ids.
//!
//! The log is not the source of truth for live markers — the library
//! database is. The log answers the question "what did we once know that
//! the library no longer shows?".

mod db;
pub mod error;
mod log;
mod models;

pub use crate::db::Database;
pub use crate::log::{ActionLog, RecordedAction};
pub use crate::models::{ActionEntry, ActionOp, KeySource, NewAction};
