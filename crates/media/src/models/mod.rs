mod item;
mod marker;
mod rows;

pub use self::item::{LibrarySection, MediaItem, MetadataType};
pub use self::marker::{Marker, MarkerType, SubtreeMarker};
pub use self::rows::OverviewEntry;
pub(crate) use self::rows::{ItemRow, MarkerRow, OverviewRow, SectionRow};
