//! The engine value: every component the operations need, wired once.
//!
//! No process-wide state. The service constructs one [`Engine`] per
//! Running period and hands it (or sub-borrows of it) to whoever needs it;
//! suspend drops the whole value after closing its pools.

use crate::cache::MarkerCache;
use crate::error::{ErrorKind, Result};
use crate::locks::Locks;
use crate::purge::PurgedIndex;
use cuemark_actions::ActionLog;
use cuemark_media::{Adapter, Marker};
use exn::ResultExt;

#[derive(Debug)]
pub struct Engine {
    media_db: cuemark_media::Database,
    actions_db: Option<cuemark_actions::Database>,
    pub(crate) media: Adapter,
    pub(crate) actions: Option<ActionLog>,
    pub(crate) cache: Option<MarkerCache>,
    pub(crate) purged: PurgedIndex,
    pub(crate) locks: Locks,
}

impl Engine {
    /// Wire an engine over open database handles.
    ///
    /// `actions_db = None` disables the action log and every purge
    /// operation (`backup_actions = false`); `extended_stats = false`
    /// disables the breakdown cache and makes stats queries scan live.
    pub fn new(
        media_db: cuemark_media::Database,
        actions_db: Option<cuemark_actions::Database>,
        extended_stats: bool,
    ) -> Self {
        Self {
            media: Adapter::from(&media_db),
            actions: actions_db.as_ref().map(ActionLog::from),
            media_db,
            actions_db,
            cache: extended_stats.then(MarkerCache::new),
            purged: PurgedIndex::default(),
            locks: Locks::new(),
        }
    }

    /// Build the derived state: breakdown cache first, then the purged
    /// index (which wants the live DB settled).
    pub async fn bootstrap(&self) -> Result<()> {
        if self.cache.is_some() {
            self.rebuild_cache().await?;
        }
        if self.actions.is_some() {
            crate::purge::reconcile(self).await?;
        }
        Ok(())
    }

    /// Repopulate the breakdown cache from one overview scan per section.
    pub async fn rebuild_cache(&self) -> Result<()> {
        let Some(cache) = &self.cache else {
            exn::bail!(ErrorKind::FeatureDisabled("extendedMarkerStats"));
        };
        let sections = self.media.sections().await.or_raise(|| ErrorKind::Internal)?;
        for section in &sections {
            let overview = self.media.section_overview(section.id).await.or_raise(|| ErrorKind::Internal)?;
            cache.load_section(section.id, &overview).await;
        }
        tracing::info!(sections = sections.len(), "breakdown cache rebuilt");
        Ok(())
    }

    /// Close both pools, waiting for in-flight transactions to finish.
    pub async fn close(&self) {
        self.media_db.close().await;
        if let Some(db) = &self.actions_db {
            db.close().await;
        }
    }

    /// The action log, or `FeatureDisabled` when `backup_actions` is off.
    pub(crate) fn log(&self) -> Result<&ActionLog> {
        match &self.actions {
            Some(log) => Ok(log),
            None => exn::bail!(ErrorKind::FeatureDisabled("backupActions")),
        }
    }
}

/// The operation surface. Thin delegation; the semantics live in the
/// per-concern modules.
impl Engine {
    pub async fn add(
        &self,
        parent_id: i64,
        start: i64,
        end: i64,
        kind: cuemark_media::MarkerType,
        is_final: bool,
    ) -> Result<Marker> {
        crate::crud::add(self, parent_id, start, end, kind, is_final).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn edit(
        &self,
        id: i64,
        start: i64,
        end: i64,
        kind: cuemark_media::MarkerType,
        is_final: bool,
        user_created: bool,
    ) -> Result<Marker> {
        crate::crud::edit(self, id, start, end, kind, is_final, user_created).await
    }

    pub async fn delete(&self, id: i64) -> Result<Marker> {
        crate::crud::delete(self, id).await
    }

    pub async fn check_shift(&self, root_id: i64) -> Result<crate::shift::ShiftResult> {
        crate::shift::check_shift(self, root_id).await
    }

    pub async fn shift(
        &self,
        root_id: i64,
        d_start: i64,
        d_end: i64,
        force: bool,
        ignored: &std::collections::HashSet<i64>,
    ) -> Result<crate::shift::ShiftResult> {
        crate::shift::shift(self, root_id, d_start, d_end, force, ignored).await
    }

    /// Re-diff the action log against the live library database.
    pub async fn reconcile(&self) -> Result<()> {
        crate::purge::reconcile(self).await
    }

    pub async fn all_purges(&self, section_id: i64) -> Result<crate::purge::SectionPurges> {
        crate::purge::all_purges(self, section_id).await
    }

    pub async fn purge_check(&self, root_id: i64) -> Result<Vec<crate::purge::PurgedMarker>> {
        crate::purge::purge_check(self, root_id).await
    }

    pub async fn restore(&self, old_marker_id: i64, section_id: i64) -> Result<Marker> {
        crate::purge::restore(self, old_marker_id, section_id).await
    }

    pub async fn ignore_purge(&self, old_marker_id: i64, section_id: i64) -> Result<()> {
        crate::purge::ignore(self, old_marker_id, section_id).await
    }

    pub async fn libraries(&self) -> Result<Vec<cuemark_media::LibrarySection>> {
        crate::query::libraries(self).await
    }

    pub async fn section_items(&self, section_id: i64) -> Result<Vec<cuemark_media::MediaItem>> {
        crate::query::section_items(self, section_id).await
    }

    pub async fn seasons(&self, show_id: i64) -> Result<Vec<cuemark_media::MediaItem>> {
        crate::query::seasons(self, show_id).await
    }

    pub async fn episodes(&self, season_id: i64) -> Result<Vec<cuemark_media::MediaItem>> {
        crate::query::episodes(self, season_id).await
    }

    pub async fn markers_for_parents(
        &self,
        parent_ids: &[i64],
    ) -> Result<std::collections::HashMap<i64, Vec<Marker>>> {
        crate::query::markers_for_parents(self, parent_ids).await
    }

    pub async fn section_stats(&self, section_id: i64) -> Result<crate::cache::Breakdown> {
        crate::query::section_stats(self, section_id).await
    }

    pub async fn subtree_stats(&self, root_id: i64) -> Result<crate::cache::Breakdown> {
        crate::query::subtree_stats(self, root_id).await
    }
}

/// Assert I1–I4 over one parent's would-be post-commit state. The slice
/// must already be sorted and re-indexed; any violation here is an engine
/// bug, reported as `Internal` before anything is written.
pub(crate) fn verify_parent_state(markers: &[Marker], duration: i64) -> Result<()> {
    for (rank, marker) in markers.iter().enumerate() {
        let mut violation = None;
        if usize::try_from(marker.index).ok() != Some(rank) {
            violation = Some("indices must be contiguous and ordered by start");
        } else if marker.start < 0 || marker.start >= marker.end || marker.end > duration {
            violation = Some("interval must satisfy 0 <= start < end <= duration");
        } else if marker.is_final && marker.kind != cuemark_media::MarkerType::Credits {
            violation = Some("only credits markers may be final");
        } else if rank > 0 && markers[rank - 1].end > marker.start {
            violation = Some("markers of one parent must not overlap");
        }
        if let Some(invariant) = violation {
            tracing::error!(marker = marker.id, parent = marker.parent_id, invariant, "marker invariant violated");
            exn::bail!(ErrorKind::Internal);
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::*;
    use cuemark_media::fixture::{self, Fixture};

    /// An engine over fresh in-memory databases with the canonical fixture
    /// tree, action log and cache enabled.
    pub(crate) async fn engine() -> (Engine, Fixture) {
        let media_db = cuemark_media::Database::connect_in_memory().await.unwrap();
        let tree = fixture::seed(&media_db).await.unwrap();
        let actions_db = cuemark_actions::Database::connect_in_memory().await.unwrap();
        let engine = Engine::new(media_db, Some(actions_db), true);
        engine.bootstrap().await.unwrap();
        (engine, tree)
    }

    /// Same tree, but with the action log disabled.
    pub(crate) async fn engine_without_log() -> (Engine, Fixture) {
        let media_db = cuemark_media::Database::connect_in_memory().await.unwrap();
        let tree = fixture::seed(&media_db).await.unwrap();
        let engine = Engine::new(media_db, None, true);
        engine.bootstrap().await.unwrap();
        (engine, tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuemark_media::{MarkerType, Marker};
    use time::UtcDateTime;

    fn marker(index: i32, start: i64, end: i64) -> Marker {
        Marker {
            id: i64::from(index) + 1,
            parent_id: 1000,
            season_id: None,
            show_id: None,
            section_id: 1,
            start,
            end,
            index,
            kind: MarkerType::Intro,
            is_final: false,
            user_created: true,
            created_at: UtcDateTime::now(),
            modified_at: None,
        }
    }

    #[test]
    fn test_verify_accepts_touching_endpoints() {
        let markers = [marker(0, 0, 1000), marker(1, 1000, 2000)];
        assert!(verify_parent_state(&markers, 600_000).is_ok());
    }

    #[test]
    fn test_verify_rejects_gap_in_indices() {
        let markers = [marker(0, 0, 1000), marker(2, 2000, 3000)];
        assert!(verify_parent_state(&markers, 600_000).is_err());
    }

    #[test]
    fn test_verify_rejects_overlap() {
        let markers = [marker(0, 0, 1500), marker(1, 1000, 2000)];
        assert!(verify_parent_state(&markers, 600_000).is_err());
    }

    #[test]
    fn test_verify_rejects_final_intro() {
        let mut bad = marker(0, 0, 1000);
        bad.is_final = true;
        assert!(verify_parent_state(&[bad], 600_000).is_err());
    }
}
