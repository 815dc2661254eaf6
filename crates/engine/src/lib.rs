//! The marker mutation engine.
//!
//! Everything between the dispatcher and the databases lives here:
//!
//! - **CRUD** — add/edit/delete of a single marker with re-indexing and
//!   overlap rejection (via [`Engine`] methods).
//! - **Shift** — bulk time-shift over a show/season/item subtree with
//!   conflict detection and cut-off clamping ([`ShiftResult`]).
//! - **Purge reconciliation** — diffing the action log against the live
//!   library database to find markers the media server wiped, with restore
//!   and ignore ([`PurgedMarker`], [`SectionPurges`]).
//! - **Breakdown cache** — the in-memory `(intros, credits)` index behind
//!   aggregate statistics ([`Breakdown`], [`PackedBucket`]).
//!
//! The library database rows are owned by the media server, the history by
//! the action log, and everything in this crate is derived state plus the
//! locking that keeps the invariants true under concurrent requests.

mod cache;
mod crud;
mod engine;
pub mod error;
mod locks;
mod purge;
mod query;
mod shift;

pub use crate::cache::{Breakdown, PackedBucket};
pub use crate::engine::Engine;
pub use crate::purge::{PurgedMarker, SectionPurges};
pub use crate::shift::ShiftResult;
