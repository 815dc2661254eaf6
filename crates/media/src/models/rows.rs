use crate::error::{Error, ErrorKind};
use crate::models::{LibrarySection, Marker, MarkerType, MediaItem, MetadataType, SubtreeMarker};
use exn::{OptionExt, ResultExt};
use time::UtcDateTime;

/// A `media_markers` row joined with its ancestor chain and the parent's
/// runtime. Every marker query selects this shape so one row type covers
/// single-parent, multi-parent, and subtree listings.
#[derive(sqlx::FromRow)]
pub(crate) struct MarkerRow {
    pub(crate) id: i64,
    pub(crate) parent_id: i64,
    pub(crate) season_id: Option<i64>,
    pub(crate) show_id: Option<i64>,
    pub(crate) section_id: i64,
    pub(crate) duration: Option<i64>,
    pub(crate) marker_type: String,
    pub(crate) start_ms: i64,
    pub(crate) end_ms: i64,
    pub(crate) ord: i64,
    #[sqlx(rename = "final")]
    pub(crate) is_final: i64,
    pub(crate) user_created: i64,
    pub(crate) created_at: i64,
    pub(crate) updated_at: Option<i64>,
}

impl TryFrom<MarkerRow> for Marker {
    type Error = Error;
    fn try_from(row: MarkerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            parent_id: row.parent_id,
            season_id: row.season_id,
            show_id: row.show_id,
            section_id: row.section_id,
            start: row.start_ms,
            end: row.end_ms,
            index: i32::try_from(row.ord).or_raise(|| ErrorKind::InvalidData("marker index"))?,
            kind: row.marker_type.parse::<MarkerType>()?,
            is_final: row.is_final != 0,
            user_created: row.user_created != 0,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
            modified_at: row
                .updated_at
                .map(|at| UtcDateTime::from_unix_timestamp(at).or_raise(|| ErrorKind::InvalidData("modification date")))
                .transpose()?,
        })
    }
}

impl TryFrom<MarkerRow> for SubtreeMarker {
    type Error = Error;
    fn try_from(row: MarkerRow) -> Result<Self, Self::Error> {
        let duration = row.duration.ok_or_raise(|| ErrorKind::InvalidData("parent duration"))?;
        Ok(Self { marker: Marker::try_from(row)?, duration })
    }
}

/// A `metadata_items` row with the grandparent id joined in, enough to
/// resolve the full ancestor chain for any item type.
#[derive(sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub(crate) id: i64,
    pub(crate) metadata_type: i64,
    pub(crate) parent_id: Option<i64>,
    pub(crate) grandparent_id: Option<i64>,
    pub(crate) section_id: i64,
    pub(crate) title: String,
    pub(crate) duration: Option<i64>,
}

impl TryFrom<ItemRow> for MediaItem {
    type Error = Error;
    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let kind = MetadataType::try_from(row.metadata_type)?;
        let (season_id, show_id) = match kind {
            MetadataType::Episode => (row.parent_id, row.grandparent_id),
            MetadataType::Season => (None, row.parent_id),
            _ => (None, None),
        };
        Ok(Self {
            id: row.id,
            kind,
            parent_id: row.parent_id,
            season_id,
            show_id,
            section_id: row.section_id,
            title: row.title,
            duration: row.duration,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SectionRow {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) section_type: i64,
}

impl TryFrom<SectionRow> for LibrarySection {
    type Error = Error;
    fn try_from(row: SectionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            kind: MetadataType::try_from(row.section_type)?,
        })
    }
}

/// One `(leaf item, marker type)` group from the section overview query.
/// Leaves without markers appear once with `kind = None`.
#[derive(Debug, Clone)]
pub struct OverviewEntry {
    pub parent_id: i64,
    pub kind: Option<MarkerType>,
    pub count: u32,
}

#[derive(sqlx::FromRow)]
pub(crate) struct OverviewRow {
    pub(crate) parent_id: i64,
    pub(crate) marker_type: Option<String>,
    pub(crate) markers: i64,
}

impl TryFrom<OverviewRow> for OverviewEntry {
    type Error = Error;
    fn try_from(row: OverviewRow) -> Result<Self, Self::Error> {
        Ok(Self {
            parent_id: row.parent_id,
            kind: row.marker_type.map(|t| t.parse::<MarkerType>()).transpose()?,
            count: u32::try_from(row.markers).or_raise(|| ErrorKind::InvalidData("marker count"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker_row() -> MarkerRow {
        MarkerRow {
            id: 7,
            parent_id: 1000,
            season_id: Some(100),
            show_id: Some(10),
            section_id: 1,
            duration: Some(600_000),
            marker_type: "credits".to_string(),
            start_ms: 550_000,
            end_ms: 600_000,
            ord: 1,
            is_final: 1,
            user_created: 0,
            created_at: 1_771_177_811,
            updated_at: None,
        }
    }

    #[test]
    fn test_marker_row_to_model() {
        let marker = Marker::try_from(marker_row()).unwrap();
        assert_eq!(marker.kind, MarkerType::Credits);
        assert!(marker.is_final);
        assert_eq!(marker.index, 1);
        assert_eq!(marker.modified_at, None);
    }

    #[test]
    fn test_subtree_marker_requires_duration() {
        let mut row = marker_row();
        row.duration = None;
        assert!(SubtreeMarker::try_from(row).is_err());
    }

    #[test]
    fn test_item_row_resolves_episode_ancestry() {
        let row = ItemRow {
            id: 1000,
            metadata_type: 4,
            parent_id: Some(100),
            grandparent_id: Some(10),
            section_id: 1,
            title: "Pilot".to_string(),
            duration: Some(600_000),
        };
        let item = MediaItem::try_from(row).unwrap();
        assert_eq!(item.season_id, Some(100));
        assert_eq!(item.show_id, Some(10));
    }

    #[test]
    fn test_item_row_movie_has_no_ancestry() {
        let row = ItemRow {
            id: 2000,
            metadata_type: 1,
            parent_id: None,
            grandparent_id: None,
            section_id: 2,
            title: "Feature".to_string(),
            duration: Some(5_400_000),
        };
        let item = MediaItem::try_from(row).unwrap();
        assert_eq!(item.season_id, None);
        assert_eq!(item.show_id, None);
    }
}
