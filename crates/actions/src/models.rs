use crate::error::{Error, ErrorKind};
use cuemark_media::{Marker, MarkerType};
use exn::ResultExt;
use time::UtcDateTime;

/// The five operations the log records. Numeric codes are the stored form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOp {
    Add = 1,
    Edit = 2,
    Delete = 3,
    Restore = 4,
    Ignore = 5,
}
impl ActionOp {
    pub(crate) fn code(&self) -> i64 {
        *self as i64
    }
}
impl TryFrom<i64> for ActionOp {
    type Error = Error;
    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Self::Add,
            2 => Self::Edit,
            3 => Self::Delete,
            4 => Self::Restore,
            5 => Self::Ignore,
            _ => exn::bail!(ErrorKind::InvalidData("action op")),
        })
    }
}

/// How [`record`](crate::ActionLog::record) resolves the restore key for a
/// new entry.
#[derive(Debug, Clone, Copy)]
pub enum KeySource {
    /// Allocate a fresh key: the marker is being born.
    Fresh,
    /// Reuse a known key: restores and ignores stay linked to the original
    /// history.
    Reuse(i64),
    /// Look up the key of the marker's most recent entry; allocate fresh if
    /// the log has never seen this marker (it was created natively by the
    /// media server).
    LatestForMarker,
}

/// A fully materialized log entry.
#[derive(Debug, Clone)]
pub struct ActionEntry {
    /// Monotonic operation id (the row id)
    pub op_id: i64,
    pub op: ActionOp,
    /// The library-side marker id at the time of the operation
    pub marker_id: i64,
    /// Stable identity across library-side renumbering
    pub restore_key: i64,
    pub parent_id: i64,
    pub season_id: Option<i64>,
    pub show_id: Option<i64>,
    pub section_id: i64,
    pub kind: MarkerType,
    pub is_final: bool,
    pub start: i64,
    pub end: i64,
    /// Previous interval, edits only
    pub old_start: Option<i64>,
    pub old_end: Option<i64>,
    pub user_created: bool,
    pub ignored: bool,
    pub recorded_at: UtcDateTime,
}

/// A not-yet-recorded entry; [`record`](crate::ActionLog::record) assigns
/// the op id, restore key and timestamp.
#[derive(Debug, Clone)]
pub struct NewAction {
    pub op: ActionOp,
    pub marker_id: i64,
    pub key: KeySource,
    pub parent_id: i64,
    pub season_id: Option<i64>,
    pub show_id: Option<i64>,
    pub section_id: i64,
    pub kind: MarkerType,
    pub is_final: bool,
    pub start: i64,
    pub end: i64,
    pub old_start: Option<i64>,
    pub old_end: Option<i64>,
    pub user_created: bool,
    pub ignored: bool,
}

impl NewAction {
    /// An entry capturing a marker's current state.
    pub fn for_marker(op: ActionOp, marker: &Marker, key: KeySource) -> Self {
        Self {
            op,
            marker_id: marker.id,
            key,
            parent_id: marker.parent_id,
            season_id: marker.season_id,
            show_id: marker.show_id,
            section_id: marker.section_id,
            kind: marker.kind,
            is_final: marker.is_final,
            start: marker.start,
            end: marker.end,
            old_start: None,
            old_end: None,
            user_created: marker.user_created,
            ignored: false,
        }
    }

    /// Attach the pre-edit interval (edits only).
    pub fn with_previous(mut self, old_start: i64, old_end: i64) -> Self {
        self.old_start = Some(old_start);
        self.old_end = Some(old_end);
        self
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ActionRow {
    pub(crate) id: i64,
    pub(crate) op: i64,
    pub(crate) marker_id: i64,
    pub(crate) restore_key: i64,
    pub(crate) parent_id: i64,
    pub(crate) season_id: Option<i64>,
    pub(crate) show_id: Option<i64>,
    pub(crate) section_id: i64,
    pub(crate) marker_type: String,
    #[sqlx(rename = "final")]
    pub(crate) is_final: i64,
    pub(crate) start_ms: i64,
    pub(crate) end_ms: i64,
    pub(crate) old_start_ms: Option<i64>,
    pub(crate) old_end_ms: Option<i64>,
    pub(crate) user_created: i64,
    pub(crate) ignored: i64,
    pub(crate) recorded_at: i64,
}

impl TryFrom<ActionRow> for ActionEntry {
    type Error = Error;
    fn try_from(row: ActionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            op_id: row.id,
            op: ActionOp::try_from(row.op)?,
            marker_id: row.marker_id,
            restore_key: row.restore_key,
            parent_id: row.parent_id,
            season_id: row.season_id,
            show_id: row.show_id,
            section_id: row.section_id,
            kind: row.marker_type.parse::<MarkerType>().or_raise(|| ErrorKind::InvalidData("marker type"))?,
            is_final: row.is_final != 0,
            start: row.start_ms,
            end: row.end_ms,
            old_start: row.old_start_ms,
            old_end: row.old_end_ms,
            user_created: row.user_created != 0,
            ignored: row.ignored != 0,
            recorded_at: UtcDateTime::from_unix_timestamp(row.recorded_at)
                .or_raise(|| ErrorKind::InvalidData("recording date"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, ActionOp::Add)]
    #[case(3, ActionOp::Delete)]
    #[case(5, ActionOp::Ignore)]
    fn test_op_codes_round_trip(#[case] code: i64, #[case] expected: ActionOp) {
        assert_eq!(ActionOp::try_from(code).unwrap(), expected);
        assert_eq!(expected.code(), code);
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        assert!(ActionOp::try_from(6).is_err());
    }
}
