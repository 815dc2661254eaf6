//! The append-only action log.
//!
//! Every committed marker mutation lands here as one entry. Entries are
//! never updated or deleted; the newest entry for a restore key is that
//! marker's last known state, which is exactly what the purge reconciler
//! needs when the media server wipes the live rows.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{ActionEntry, ActionRow, KeySource, NewAction};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

/// The id pair a successful append returns.
#[derive(Debug, Clone, Copy)]
pub struct RecordedAction {
    pub op_id: i64,
    pub restore_key: i64,
}

/// Append and query handle for the action log.
#[derive(Debug, Clone)]
pub struct ActionLog {
    pool: SqlitePool,
}
impl From<&Database> for ActionLog {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl ActionLog {
    /// Append one entry, resolving its restore key per [`KeySource`].
    ///
    /// Key resolution and the insert run in one transaction so a freshly
    /// allocated key can never leak without its entry.
    pub async fn record(&self, action: NewAction) -> Result<RecordedAction> {
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let restore_key = match action.key {
            KeySource::Reuse(key) => key,
            KeySource::Fresh => Self::allocate_key(&mut tx, now).await?,
            KeySource::LatestForMarker => {
                let existing: Option<i64> = sqlx::query_scalar(include_str!("../queries/key_for_marker.sql"))
                    .bind(action.marker_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                match existing {
                    Some(key) => key,
                    None => Self::allocate_key(&mut tx, now).await?,
                }
            },
        };
        let op_id = sqlx::query_scalar::<_, i64>(include_str!("../queries/insert_action.sql"))
            .bind(action.op.code())
            .bind(action.marker_id)
            .bind(restore_key)
            .bind(action.parent_id)
            .bind(action.season_id)
            .bind(action.show_id)
            .bind(action.section_id)
            .bind(action.kind.as_str())
            .bind(action.is_final)
            .bind(action.start)
            .bind(action.end)
            .bind(action.old_start)
            .bind(action.old_end)
            .bind(action.user_created)
            .bind(action.ignored)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(RecordedAction { op_id, restore_key })
    }

    /// The last known state of every marker the log still considers alive:
    /// the newest entry per restore key, excluding keys whose newest entry
    /// is a Delete or an Ignore. This is the purge-candidate feed.
    pub async fn latest_states(&self) -> Result<Vec<ActionEntry>> {
        sqlx::query_as::<_, ActionRow>(include_str!("../queries/latest_states.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .into_iter()
            .map(ActionEntry::try_from)
            .collect()
    }

    /// Full history for one restore key, oldest first.
    pub async fn entries_for_key(&self, restore_key: i64) -> Result<Vec<ActionEntry>> {
        sqlx::query_as::<_, ActionRow>(include_str!("../queries/entries_for_key.sql"))
            .bind(restore_key)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .into_iter()
            .map(ActionEntry::try_from)
            .collect()
    }

    async fn allocate_key(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, now: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(include_str!("../queries/insert_key.sql"))
            .bind(now)
            .fetch_one(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionOp;
    use cuemark_media::{Marker, MarkerType};
    use time::UtcDateTime;

    fn marker(id: i64, start: i64, end: i64) -> Marker {
        Marker {
            id,
            parent_id: 1000,
            season_id: Some(100),
            show_id: Some(10),
            section_id: 1,
            start,
            end,
            index: 0,
            kind: MarkerType::Intro,
            is_final: false,
            user_created: true,
            created_at: UtcDateTime::now(),
            modified_at: None,
        }
    }

    #[tokio::test]
    async fn test_add_then_edit_share_a_key() {
        let db = Database::connect_in_memory().await.unwrap();
        let log = ActionLog::from(&db);
        let m = marker(7, 0, 30_000);
        let added = log.record(NewAction::for_marker(ActionOp::Add, &m, KeySource::Fresh)).await.unwrap();
        let edited = log
            .record(NewAction::for_marker(ActionOp::Edit, &m, KeySource::LatestForMarker).with_previous(0, 20_000))
            .await
            .unwrap();
        assert_eq!(added.restore_key, edited.restore_key);
        assert!(edited.op_id > added.op_id);

        let history = log.entries_for_key(added.restore_key).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].old_end, Some(20_000));
    }

    #[tokio::test]
    async fn test_native_marker_gets_a_fresh_key_on_first_edit() {
        let db = Database::connect_in_memory().await.unwrap();
        let log = ActionLog::from(&db);
        let recorded = log
            .record(NewAction::for_marker(ActionOp::Edit, &marker(42, 0, 30_000), KeySource::LatestForMarker))
            .await
            .unwrap();
        assert!(recorded.restore_key > 0);
    }

    #[tokio::test]
    async fn test_latest_states_excludes_deleted_and_ignored() {
        let db = Database::connect_in_memory().await.unwrap();
        let log = ActionLog::from(&db);

        let alive = marker(1, 0, 30_000);
        log.record(NewAction::for_marker(ActionOp::Add, &alive, KeySource::Fresh)).await.unwrap();

        let deleted = marker(2, 40_000, 50_000);
        let key = log.record(NewAction::for_marker(ActionOp::Add, &deleted, KeySource::Fresh)).await.unwrap();
        log.record(NewAction::for_marker(ActionOp::Delete, &deleted, KeySource::Reuse(key.restore_key)))
            .await
            .unwrap();

        let ignored = marker(3, 60_000, 70_000);
        let key = log.record(NewAction::for_marker(ActionOp::Add, &ignored, KeySource::Fresh)).await.unwrap();
        let mut entry = NewAction::for_marker(ActionOp::Ignore, &ignored, KeySource::Reuse(key.restore_key));
        entry.ignored = true;
        log.record(entry).await.unwrap();

        let states = log.latest_states().await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].marker_id, 1);
        assert_eq!(states[0].op, ActionOp::Add);
    }

    #[tokio::test]
    async fn test_latest_state_reflects_newest_edit() {
        let db = Database::connect_in_memory().await.unwrap();
        let log = ActionLog::from(&db);
        let mut m = marker(9, 0, 30_000);
        let key = log.record(NewAction::for_marker(ActionOp::Add, &m, KeySource::Fresh)).await.unwrap();
        m.start = 5_000;
        log.record(
            NewAction::for_marker(ActionOp::Edit, &m, KeySource::Reuse(key.restore_key)).with_previous(0, 30_000),
        )
        .await
        .unwrap();
        let states = log.latest_states().await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].start, 5_000);
    }
}
