//! Typed operations against the library database.
//!
//! Reads run straight off the pool; writes take an open [`Transaction`] so
//! the engine can compose one logical mutation (insert + re-index, delete +
//! re-index, bulk shift) into a single atomic unit. The adapter knows the
//! schema; it knows nothing about marker invariants, which are the engine's
//! responsibility.

use crate::error::{ErrorKind, Result};
use crate::models::{
    ItemRow, LibrarySection, Marker, MarkerRow, MarkerType, MediaItem, OverviewEntry, OverviewRow, SectionRow,
    SubtreeMarker,
};
use crate::Database;
use exn::ResultExt;
use futures::TryStreamExt;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use time::UtcDateTime;

/// Adapter over the library database.
///
/// Cheap to clone (the pool is internally reference-counted). Lookups that
/// can legitimately miss return `Ok(None)`; the caller decides whether a
/// miss is an error.
#[derive(Debug, Clone)]
pub struct Adapter {
    pool: SqlitePool,
}
impl From<&Database> for Adapter {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Adapter {
    /* ===== *\
    |  Reads  |
    \* ===== */

    /// Fetch an item with its ancestor chain resolved.
    pub async fn get_item(&self, id: i64) -> Result<Option<MediaItem>> {
        sqlx::query_as::<_, ItemRow>(include_str!("../queries/get_item.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .map(MediaItem::try_from)
            .transpose()
    }

    /// Fetch a single marker by its library row id.
    pub async fn get_marker(&self, id: i64) -> Result<Option<Marker>> {
        sqlx::query_as::<_, MarkerRow>(include_str!("../queries/get_marker.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .map(Marker::try_from)
            .transpose()
    }

    /// All markers of one episode or movie, sorted by start offset.
    pub async fn list_markers(&self, parent_id: i64) -> Result<Vec<Marker>> {
        sqlx::query_as::<_, MarkerRow>(include_str!("../queries/list_markers.sql"))
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .into_iter()
            .map(Marker::try_from)
            .collect()
    }

    /// Markers for a batch of parents, keyed by parent. Every requested
    /// parent is present in the result, markerless ones with an empty list.
    pub async fn markers_for_parents(&self, parent_ids: &[i64]) -> Result<HashMap<i64, Vec<Marker>>> {
        let mut map: HashMap<i64, Vec<Marker>> = parent_ids.iter().map(|id| (*id, Vec::new())).collect();
        if parent_ids.is_empty() {
            return Ok(map);
        }
        // Same shape as queries/list_markers.sql, but the IN list forces a
        // dynamically built query.
        let mut query = sqlx::QueryBuilder::<Sqlite>::new(
            "SELECT m.id, m.metadata_item_id AS parent_id, \
             CASE WHEN e.metadata_type = 4 THEN e.parent_id END AS season_id, \
             CASE WHEN e.metadata_type = 4 THEN s.parent_id END AS show_id, \
             e.library_section_id AS section_id, e.duration AS duration, \
             m.marker_type, m.start_ms, m.end_ms, m.ord, m.final, m.user_created, m.created_at, m.updated_at \
             FROM media_markers m \
             JOIN metadata_items e ON e.id = m.metadata_item_id \
             LEFT JOIN metadata_items s ON s.id = e.parent_id \
             WHERE m.metadata_item_id IN (",
        );
        let mut ids = query.separated(", ");
        for id in parent_ids {
            ids.push_bind(*id);
        }
        query.push(") ORDER BY m.metadata_item_id, m.start_ms, m.id");
        let rows: Vec<MarkerRow> =
            query.build_query_as().fetch_all(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        for row in rows {
            let marker = Marker::try_from(row)?;
            map.entry(marker.parent_id).or_default().push(marker);
        }
        Ok(map)
    }

    /// Every marker underneath a subtree root (show, season, episode or
    /// movie), each paired with its parent's runtime.
    pub async fn subtree_markers(&self, root_id: i64) -> Result<Vec<SubtreeMarker>> {
        sqlx::query_as::<_, MarkerRow>(include_str!("../queries/subtree_markers.sql"))
            .bind(root_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .into_iter()
            .map(SubtreeMarker::try_from)
            .collect()
    }

    /// Every marker in a library section. Streamed row-by-row; sections can
    /// hold tens of thousands of markers.
    pub async fn section_markers(&self, section_id: i64) -> Result<Vec<SubtreeMarker>> {
        let mut rows = sqlx::query_as::<_, MarkerRow>(include_str!("../queries/section_markers.sql"))
            .bind(section_id)
            .fetch(&self.pool);
        let mut markers = Vec::new();
        while let Some(row) = rows.try_next().await.or_raise(|| ErrorKind::Database)? {
            markers.push(SubtreeMarker::try_from(row)?);
        }
        Ok(markers)
    }

    /// Direct children of an item, filtered to one metadata type.
    pub async fn list_children(&self, parent_id: i64, kind: MarkerableKind) -> Result<Vec<MediaItem>> {
        sqlx::query_as::<_, ItemRow>(include_str!("../queries/list_children.sql"))
            .bind(parent_id)
            .bind(kind.code())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .into_iter()
            .map(MediaItem::try_from)
            .collect()
    }

    /// All library sections.
    pub async fn sections(&self) -> Result<Vec<LibrarySection>> {
        sqlx::query_as::<_, SectionRow>(include_str!("../queries/sections.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .into_iter()
            .map(LibrarySection::try_from)
            .collect()
    }

    /// Top-level items of a section (shows or movies).
    pub async fn section_items(&self, section_id: i64) -> Result<Vec<MediaItem>> {
        sqlx::query_as::<_, ItemRow>(include_str!("../queries/section_items.sql"))
            .bind(section_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?
            .into_iter()
            .map(MediaItem::try_from)
            .collect()
    }

    /// Per-leaf, per-type marker counts for a whole section, including
    /// leaves without markers. One pass, streamed; this is the cache
    /// rebuild feed.
    pub async fn section_overview(&self, section_id: i64) -> Result<Vec<OverviewEntry>> {
        let mut rows = sqlx::query_as::<_, OverviewRow>(include_str!("../queries/section_overview.sql"))
            .bind(section_id)
            .fetch(&self.pool);
        let mut entries = Vec::new();
        while let Some(row) = rows.try_next().await.or_raise(|| ErrorKind::Database)? {
            entries.push(OverviewEntry::try_from(row)?);
        }
        Ok(entries)
    }

    /* ====== *\
    |  Writes  |
    \* ====== */

    /// Open a transaction for one logical mutation.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool.begin().await.or_raise(|| ErrorKind::Database)
    }

    /// Insert a marker row, returning the id the library database assigned.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_marker(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        parent_id: i64,
        start: i64,
        end: i64,
        index: i32,
        kind: MarkerType,
        is_final: bool,
        user_created: bool,
        created_at: UtcDateTime,
    ) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(include_str!("../queries/insert_marker.sql"))
            .bind(parent_id)
            .bind(kind.as_str())
            .bind(start)
            .bind(end)
            .bind(i64::from(index))
            .bind(is_final)
            .bind(user_created)
            .bind(created_at.unix_timestamp())
            .fetch_one(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Rewrite every mutable column of a marker row from the model.
    pub async fn update_marker(&self, tx: &mut Transaction<'static, Sqlite>, marker: &Marker) -> Result<()> {
        sqlx::query(include_str!("../queries/update_marker.sql"))
            .bind(marker.start)
            .bind(marker.end)
            .bind(i64::from(marker.index))
            .bind(marker.kind.as_str())
            .bind(marker.is_final)
            .bind(marker.user_created)
            .bind(marker.modified_at.map(|at| at.unix_timestamp()))
            .bind(marker.id)
            .execute(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Update only a marker's ordinal.
    pub async fn update_marker_index(&self, tx: &mut Transaction<'static, Sqlite>, id: i64, index: i32) -> Result<()> {
        sqlx::query(include_str!("../queries/update_marker_index.sql"))
            .bind(i64::from(index))
            .bind(id)
            .execute(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Delete a marker row.
    pub async fn delete_marker(&self, tx: &mut Transaction<'static, Sqlite>, id: i64) -> Result<()> {
        sqlx::query(include_str!("../queries/delete_marker.sql"))
            .bind(id)
            .execute(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}

/// The two metadata types [`Adapter::list_children`] can filter on.
/// Restricting the argument keeps arbitrary codes out of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerableKind {
    Season,
    Episode,
}
impl MarkerableKind {
    fn code(&self) -> i64 {
        match self {
            Self::Season => 3,
            Self::Episode => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{self, EPISODE_DURATION};

    async fn add(adapter: &Adapter, parent: i64, start: i64, end: i64, kind: MarkerType, index: i32) -> i64 {
        let mut tx = adapter.begin().await.unwrap();
        let id = adapter
            .insert_marker(&mut tx, parent, start, end, index, kind, false, true, UtcDateTime::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_get_item_resolves_ancestry() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = fixture::seed(&db).await.unwrap();
        let episode = adapter(&db).get_item(tree.episodes[0]).await.unwrap().unwrap();
        assert_eq!(episode.season_id, Some(tree.season));
        assert_eq!(episode.show_id, Some(tree.show));
        assert_eq!(episode.duration, Some(EPISODE_DURATION));
        assert!(adapter(&db).get_item(999_999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_markers_sorted_and_contextualized() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = fixture::seed(&db).await.unwrap();
        let a = adapter(&db);
        add(&a, tree.episodes[0], 60_000, 90_000, MarkerType::Credits, 1).await;
        add(&a, tree.episodes[0], 0, 30_000, MarkerType::Intro, 0).await;
        let markers = a.list_markers(tree.episodes[0]).await.unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].kind, MarkerType::Intro);
        assert_eq!(markers[0].section_id, tree.tv_section);
        assert_eq!(markers[1].show_id, Some(tree.show));
    }

    #[tokio::test]
    async fn test_subtree_covers_show_season_episode() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = fixture::seed(&db).await.unwrap();
        let a = adapter(&db);
        add(&a, tree.episodes[0], 0, 30_000, MarkerType::Intro, 0).await;
        add(&a, tree.episodes[1], 0, 30_000, MarkerType::Intro, 0).await;
        add(&a, tree.movie, 0, 30_000, MarkerType::Intro, 0).await;

        let by_show = a.subtree_markers(tree.show).await.unwrap();
        assert_eq!(by_show.len(), 2);
        assert!(by_show.iter().all(|m| m.duration == EPISODE_DURATION));
        let by_season = a.subtree_markers(tree.season).await.unwrap();
        assert_eq!(by_season.len(), 2);
        let by_episode = a.subtree_markers(tree.episodes[0]).await.unwrap();
        assert_eq!(by_episode.len(), 1);
        let by_movie = a.subtree_markers(tree.movie).await.unwrap();
        assert_eq!(by_movie.len(), 1);
    }

    #[tokio::test]
    async fn test_markers_for_parents_prefills_empty() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = fixture::seed(&db).await.unwrap();
        let a = adapter(&db);
        add(&a, tree.episodes[0], 0, 30_000, MarkerType::Intro, 0).await;
        let map = a.markers_for_parents(&[tree.episodes[0], tree.episodes[1]]).await.unwrap();
        assert_eq!(map[&tree.episodes[0]].len(), 1);
        assert!(map[&tree.episodes[1]].is_empty());
    }

    #[tokio::test]
    async fn test_section_overview_includes_markerless_leaves() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = fixture::seed(&db).await.unwrap();
        let a = adapter(&db);
        add(&a, tree.episodes[0], 0, 30_000, MarkerType::Intro, 0).await;
        add(&a, tree.episodes[0], 550_000, 600_000, MarkerType::Credits, 1).await;
        let overview = a.section_overview(tree.tv_section).await.unwrap();
        // Episode 0 has two typed groups; episodes 1 and 2 appear with None.
        assert_eq!(overview.iter().filter(|e| e.parent_id == tree.episodes[0]).count(), 2);
        assert!(overview.iter().any(|e| e.parent_id == tree.episodes[1] && e.kind.is_none() && e.count == 0));
    }

    #[tokio::test]
    async fn test_update_and_delete_round_trip() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = fixture::seed(&db).await.unwrap();
        let a = adapter(&db);
        let id = add(&a, tree.episodes[0], 0, 30_000, MarkerType::Intro, 0).await;

        let mut marker = a.get_marker(id).await.unwrap().unwrap();
        marker.start = 5_000;
        marker.modified_at = Some(UtcDateTime::now());
        let mut tx = a.begin().await.unwrap();
        a.update_marker(&mut tx, &marker).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(a.get_marker(id).await.unwrap().unwrap().start, 5_000);

        let mut tx = a.begin().await.unwrap();
        a.delete_marker(&mut tx, id).await.unwrap();
        tx.commit().await.unwrap();
        assert!(a.get_marker(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollback_leaves_no_trace() {
        let db = Database::connect_in_memory().await.unwrap();
        let tree = fixture::seed(&db).await.unwrap();
        let a = adapter(&db);
        let mut tx = a.begin().await.unwrap();
        a.insert_marker(&mut tx, tree.episodes[0], 0, 30_000, 0, MarkerType::Intro, false, true, UtcDateTime::now())
            .await
            .unwrap();
        drop(tx); // rollback
        assert!(a.list_markers(tree.episodes[0]).await.unwrap().is_empty());
    }

    fn adapter(db: &Database) -> Adapter {
        Adapter::from(db)
    }
}
