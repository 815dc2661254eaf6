use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use crate::error::{Error, ErrorKind};
use serde::Serialize;
use time::UtcDateTime;

/// Marker type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerType {
    /// Skippable opening titles
    Intro,
    /// End credits; at most one per item may be flagged final
    Credits,
    /// Advertisement break (recorded-TV sources)
    Commercial,
}

impl MarkerType {
    /// Returns the wire string for the marker type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerType::Intro => "intro",
            MarkerType::Credits => "credits",
            MarkerType::Commercial => "commercial",
        }
    }
}
impl TryFrom<String> for MarkerType {
    type Error = Error;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.as_str().parse()
    }
}
impl FromStr for MarkerType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "intro" => Self::Intro,
            "credits" => Self::Credits,
            "commercial" => Self::Commercial,
            _ => exn::bail!(ErrorKind::InvalidData("marker type")),
        })
    }
}
impl Display for MarkerType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// A half-open `[start, end)` millisecond interval attached to a media item.
///
/// Markers live in the media server's library database; the numeric `id` is
/// assigned there on insertion and may be renumbered by the server behind
/// our back (which is what the action log's restore keys compensate for).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    /// Row id in the library database
    pub id: i64,
    /// The episode or movie owning this marker
    pub parent_id: i64,
    /// Containing season; absent for movies
    pub season_id: Option<i64>,
    /// Containing show; absent for movies
    pub show_id: Option<i64>,
    /// Containing library section
    pub section_id: i64,
    /// Inclusive start offset, milliseconds
    pub start: i64,
    /// Exclusive end offset, milliseconds
    pub end: i64,
    /// 0-based ordinal within the parent when sorted by `start`
    pub index: i32,
    /// Marker type
    #[serde(rename = "type")]
    pub kind: MarkerType,
    /// Whether a credits marker is the last credits of the work
    #[serde(rename = "final")]
    pub is_final: bool,
    /// True when this service (or any non-native source) created the marker
    pub user_created: bool,
    #[serde(serialize_with = "unix_seconds")]
    pub created_at: UtcDateTime,
    #[serde(serialize_with = "unix_seconds_opt")]
    pub modified_at: Option<UtcDateTime>,
}

impl Marker {
    /// Whether two half-open intervals intersect. Touching endpoints
    /// (`a.end == b.start`) do not count as an overlap.
    pub fn overlaps(&self, other: &Marker) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A marker paired with its parent's runtime, as enumerated for bulk
/// operations over a subtree.
#[derive(Debug, Clone)]
pub struct SubtreeMarker {
    pub marker: Marker,
    /// Runtime of the owning episode or movie, milliseconds
    pub duration: i64,
}

fn unix_seconds<S: serde::Serializer>(at: &UtcDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(at.unix_timestamp())
}

fn unix_seconds_opt<S: serde::Serializer>(at: &Option<UtcDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
    match at {
        Some(at) => serializer.serialize_some(&at.unix_timestamp()),
        None => serializer.serialize_none(),
    }
}
