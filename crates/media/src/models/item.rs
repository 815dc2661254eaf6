use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::{Error, ErrorKind};
use serde::Serialize;

/// Metadata type of a library item, using the numeric codes the library
/// database stores in `metadata_items.metadata_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataType {
    Movie = 1,
    Show = 2,
    Season = 3,
    Episode = 4,
    Artist = 8,
    Album = 9,
    Track = 10,
}

impl MetadataType {
    /// The numeric code stored in the library database.
    pub fn code(&self) -> i64 {
        *self as i64
    }

    /// Only episodes and movies have a runtime and may own markers.
    pub fn is_markerable(&self) -> bool {
        matches!(self, Self::Episode | Self::Movie)
    }

    /// Whether markers exist somewhere underneath an item of this type, so
    /// it can serve as the root of a bulk operation.
    pub fn is_subtree_root(&self) -> bool {
        matches!(self, Self::Movie | Self::Show | Self::Season | Self::Episode)
    }
}
impl TryFrom<i64> for MetadataType {
    type Error = Error;
    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Self::Movie,
            2 => Self::Show,
            3 => Self::Season,
            4 => Self::Episode,
            8 => Self::Artist,
            9 => Self::Album,
            10 => Self::Track,
            _ => exn::bail!(ErrorKind::InvalidData("metadata type")),
        })
    }
}
impl Display for MetadataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Movie => "movie",
            Self::Show => "show",
            Self::Season => "season",
            Self::Episode => "episode",
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Track => "track",
        };
        write!(f, "{name}")
    }
}

/// A row of the library's `metadata_items` hierarchy, with the ancestor
/// chain already resolved for episodes and seasons.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: MetadataType,
    /// Immediate parent (season for episodes, show for seasons)
    pub parent_id: Option<i64>,
    /// Containing season; present only for episodes
    pub season_id: Option<i64>,
    /// Containing show; present for episodes and seasons
    pub show_id: Option<i64>,
    pub section_id: i64,
    pub title: String,
    /// Runtime in milliseconds; episodes and movies only
    pub duration: Option<i64>,
}

/// A library section (one per media library the server exposes).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySection {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MetadataType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, MetadataType::Movie)]
    #[case(4, MetadataType::Episode)]
    #[case(10, MetadataType::Track)]
    fn test_codes_round_trip(#[case] code: i64, #[case] expected: MetadataType) {
        assert_eq!(MetadataType::try_from(code).unwrap(), expected);
        assert_eq!(expected.code(), code);
    }

    #[test]
    fn test_unknown_code_is_rejected() {
        assert!(MetadataType::try_from(7).is_err());
    }

    #[rstest]
    #[case(MetadataType::Episode, true)]
    #[case(MetadataType::Movie, true)]
    #[case(MetadataType::Show, false)]
    #[case(MetadataType::Track, false)]
    fn test_markerable(#[case] kind: MetadataType, #[case] expected: bool) {
        assert_eq!(kind.is_markerable(), expected);
    }
}
