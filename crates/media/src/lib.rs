//! Typed adapter over the media server's library database.
//!
//! The library database belongs to the media server; this service is a
//! guest writer. The crate treats the schema as given: it never creates the
//! file, never migrates it, and funnels every read and write through typed
//! queries so the rest of the workspace never sees SQL.
//!
//! # Architecture
//! - [`Database`]: pool management (WAL, pragmas, busy timeout).
//! - [`Adapter`]: the operation surface. Reads run off the pool; writes take
//!   an open transaction so one logical mutation commits atomically.
//! - [`models`]: the `Marker` / `MediaItem` value types plus private row
//!   structs mirroring the SQL shapes.
//! - [`fixture`]: the canonical seed tree for tests (here and downstream).

mod adapter;
mod db;
pub mod error;
pub mod fixture;
mod models;

pub use crate::adapter::{Adapter, MarkerableKind};
pub use crate::db::Database;
pub use crate::models::{
    LibrarySection, Marker, MarkerType, MediaItem, MetadataType, OverviewEntry, SubtreeMarker,
};
