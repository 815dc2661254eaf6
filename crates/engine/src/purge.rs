//! Purge detection and recovery.
//!
//! The media server periodically regenerates its own analysis data and can
//! wipe our marker rows in the process. The action log is the service's
//! memory: reconciliation walks the log's last-known states, checks each
//! against the live library database, and indexes whatever has gone
//! missing. The user can then restore a purged marker (re-adding it through
//! the normal CRUD path, re-linked to its original history) or ignore it
//! permanently.
//!
//! The live database is the source of truth throughout; the index is
//! derived state, rebuilt on every reconcile.

use crate::crud::{self, Provenance};
use crate::engine::Engine;
use crate::error::{ErrorKind, Result};
use cuemark_actions::{ActionEntry, ActionOp, KeySource, NewAction};
use cuemark_media::{Marker, MarkerType};
use exn::{OptionExt, ResultExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// The last known state of a marker the library database no longer has.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgedMarker {
    /// The library-side id the marker had when last seen
    pub marker_id: i64,
    #[serde(skip)]
    pub restore_key: i64,
    pub parent_id: i64,
    pub season_id: Option<i64>,
    pub show_id: Option<i64>,
    pub section_id: i64,
    #[serde(rename = "type")]
    pub kind: MarkerType,
    #[serde(rename = "final")]
    pub is_final: bool,
    pub start: i64,
    pub end: i64,
    pub user_created: bool,
    /// When the log last recorded the marker
    #[serde(serialize_with = "unix_seconds")]
    pub last_seen_at: UtcDateTime,
}

impl From<ActionEntry> for PurgedMarker {
    fn from(entry: ActionEntry) -> Self {
        Self {
            marker_id: entry.marker_id,
            restore_key: entry.restore_key,
            parent_id: entry.parent_id,
            season_id: entry.season_id,
            show_id: entry.show_id,
            section_id: entry.section_id,
            kind: entry.kind,
            is_final: entry.is_final,
            start: entry.start,
            end: entry.end,
            user_created: entry.user_created,
            last_seen_at: entry.recorded_at,
        }
    }
}

/// Every purge known for one section, grouped by owning item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionPurges {
    pub section_id: i64,
    pub items: BTreeMap<i64, Vec<PurgedMarker>>,
}

/// section → parent → purged markers, rebuilt by every reconcile.
#[derive(Debug, Default)]
pub(crate) struct PurgedIndex {
    sections: RwLock<HashMap<i64, HashMap<i64, Vec<PurgedMarker>>>>,
}

impl PurgedIndex {
    async fn replace(&self, next: HashMap<i64, HashMap<i64, Vec<PurgedMarker>>>) {
        *self.sections.write().await = next;
    }

    async fn for_section(&self, section_id: i64) -> BTreeMap<i64, Vec<PurgedMarker>> {
        let sections = self.sections.read().await;
        sections.get(&section_id).map(|parents| parents.iter().map(|(k, v)| (*k, v.clone())).collect()).unwrap_or_default()
    }

    async fn find(&self, section_id: i64, marker_id: i64) -> Option<PurgedMarker> {
        let sections = self.sections.read().await;
        sections
            .get(&section_id)?
            .values()
            .flat_map(|markers| markers.iter())
            .find(|m| m.marker_id == marker_id)
            .cloned()
    }

    async fn remove(&self, section_id: i64, marker_id: i64) {
        let mut sections = self.sections.write().await;
        if let Some(parents) = sections.get_mut(&section_id) {
            for markers in parents.values_mut() {
                markers.retain(|m| m.marker_id != marker_id);
            }
            parents.retain(|_, markers| !markers.is_empty());
        }
    }
}

/// Diff the action log against the live library database and rebuild the
/// purged index from whatever the library lost.
pub(crate) async fn reconcile(engine: &Engine) -> Result<()> {
    let log = engine.log()?;
    let candidates = log.latest_states().await.or_raise(|| ErrorKind::Internal)?;

    let mut parent_ids: Vec<i64> = candidates.iter().map(|entry| entry.parent_id).collect();
    parent_ids.sort_unstable();
    parent_ids.dedup();
    let live = engine.media.markers_for_parents(&parent_ids).await.or_raise(|| ErrorKind::Internal)?;

    let mut purged: HashMap<i64, HashMap<i64, Vec<PurgedMarker>>> = HashMap::new();
    let mut count = 0usize;
    for candidate in candidates {
        // A marker survives if its id is still live, or if an identical
        // marker exists on the same parent (the server renumbered it).
        let alive = live.get(&candidate.parent_id).is_some_and(|markers| {
            markers.iter().any(|m| {
                m.id == candidate.marker_id
                    || (m.start == candidate.start && m.end == candidate.end && m.kind == candidate.kind)
            })
        });
        if alive {
            continue;
        }
        count += 1;
        purged
            .entry(candidate.section_id)
            .or_default()
            .entry(candidate.parent_id)
            .or_default()
            .push(PurgedMarker::from(candidate));
    }
    if count > 0 {
        tracing::info!(count, "markers missing from the library database");
    }
    engine.purged.replace(purged).await;
    Ok(())
}

/// Every known purge in a section.
pub(crate) async fn all_purges(engine: &Engine, section_id: i64) -> Result<SectionPurges> {
    engine.log()?;
    Ok(SectionPurges { section_id, items: engine.purged.for_section(section_id).await })
}

/// Purges underneath one subtree root (show, season, episode or movie).
pub(crate) async fn purge_check(engine: &Engine, root_id: i64) -> Result<Vec<PurgedMarker>> {
    engine.log()?;
    let root = engine
        .media
        .get_item(root_id)
        .await
        .or_raise(|| ErrorKind::Internal)?
        .ok_or_raise(|| ErrorKind::NotFound(format!("item {root_id}")))?;
    if !root.kind.is_subtree_root() {
        exn::bail!(ErrorKind::BadTarget(root_id));
    }
    let by_parent = engine.purged.for_section(root.section_id).await;
    let mut purges: Vec<PurgedMarker> = by_parent
        .into_values()
        .flatten()
        .filter(|p| p.parent_id == root_id || p.season_id == Some(root_id) || p.show_id == Some(root_id))
        .collect();
    purges.sort_by_key(|p| (p.parent_id, p.start, p.marker_id));
    Ok(purges)
}

/// Re-add a purged marker through the CRUD path, linked to its original
/// restore key. On failure (most commonly `Overlap` with a marker the
/// library regenerated in the meantime) the index entry stays put so the
/// user can resolve and retry.
pub(crate) async fn restore(engine: &Engine, old_marker_id: i64, section_id: i64) -> Result<Marker> {
    engine.log()?;
    let candidate = engine
        .purged
        .find(section_id, old_marker_id)
        .await
        .ok_or_raise(|| ErrorKind::NotFound(format!("purged marker {old_marker_id}")))?;
    let marker = crud::add_inner(
        engine,
        candidate.parent_id,
        candidate.start,
        candidate.end,
        candidate.kind,
        candidate.is_final,
        Provenance::Restore { key: candidate.restore_key },
    )
    .await?;
    engine.purged.remove(section_id, old_marker_id).await;
    tracing::info!(marker = marker.id, was = old_marker_id, "purged marker restored");
    Ok(marker)
}

/// Mark a purge as permanently uninteresting. The history stays in the
/// log; the marker just stops showing up as purged.
pub(crate) async fn ignore(engine: &Engine, old_marker_id: i64, section_id: i64) -> Result<()> {
    let log = engine.log()?;
    let candidate = engine
        .purged
        .find(section_id, old_marker_id)
        .await
        .ok_or_raise(|| ErrorKind::NotFound(format!("purged marker {old_marker_id}")))?;
    let entry = NewAction {
        op: ActionOp::Ignore,
        marker_id: candidate.marker_id,
        key: KeySource::Reuse(candidate.restore_key),
        parent_id: candidate.parent_id,
        season_id: candidate.season_id,
        show_id: candidate.show_id,
        section_id: candidate.section_id,
        kind: candidate.kind,
        is_final: candidate.is_final,
        start: candidate.start,
        end: candidate.end,
        old_start: None,
        old_end: None,
        user_created: candidate.user_created,
        ignored: true,
    };
    log.record(entry).await.or_raise(|| ErrorKind::Internal)?;
    engine.purged.remove(section_id, old_marker_id).await;
    tracing::info!(marker = old_marker_id, "purged marker ignored");
    Ok(())
}

fn unix_seconds<S: serde::Serializer>(at: &UtcDateTime, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_i64(at.unix_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crud;
    use crate::engine::testkit;

    /// Simulate the media server wiping a marker row behind our back.
    async fn wipe(engine: &Engine, marker_id: i64) {
        // The adapter refuses to delete outside a transaction on purpose;
        // the foreign application has no such scruples.
        let mut tx = engine.media.begin().await.unwrap();
        engine.media.delete_marker(&mut tx, marker_id).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_round_trip() {
        let (engine, tree) = testkit::engine().await;
        let episode = tree.episodes[0];
        let marker = crud::add(&engine, episode, 15_000, 45_000, MarkerType::Intro, false).await.unwrap();

        wipe(&engine, marker.id).await;
        reconcile(&engine).await.unwrap();

        let purges = purge_check(&engine, episode).await.unwrap();
        assert_eq!(purges.len(), 1);
        assert_eq!((purges[0].start, purges[0].end), (15_000, 45_000));

        let restored = restore(&engine, marker.id, tree.tv_section).await.unwrap();
        assert_eq!((restored.start, restored.end, restored.kind), (15_000, 45_000, MarkerType::Intro));
        assert!(purge_check(&engine, episode).await.unwrap().is_empty());

        // The restore is linked to the original history.
        let history = engine.actions.as_ref().unwrap().entries_for_key(1).await.unwrap();
        assert_eq!(history.last().unwrap().op, ActionOp::Restore);
    }

    #[tokio::test]
    async fn test_reconcile_keeps_live_markers_out() {
        let (engine, tree) = testkit::engine().await;
        let kept = crud::add(&engine, tree.episodes[0], 0, 30_000, MarkerType::Intro, false).await.unwrap();
        let lost = crud::add(&engine, tree.episodes[1], 0, 30_000, MarkerType::Intro, false).await.unwrap();

        wipe(&engine, lost.id).await;
        reconcile(&engine).await.unwrap();

        let purges = all_purges(&engine, tree.tv_section).await.unwrap();
        assert_eq!(purges.items.len(), 1);
        assert!(purges.items.contains_key(&tree.episodes[1]));
        assert!(!purges.items.values().flatten().any(|p| p.marker_id == kept.id));
    }

    #[tokio::test]
    async fn test_renumbered_marker_is_not_a_purge() {
        let (engine, tree) = testkit::engine().await;
        let episode = tree.episodes[0];
        let marker = crud::add(&engine, episode, 0, 30_000, MarkerType::Intro, false).await.unwrap();

        // The server wiped the row but regenerated an identical marker
        // under a new id: fingerprint match, not a purge.
        wipe(&engine, marker.id).await;
        let mut tx = engine.media.begin().await.unwrap();
        engine
            .media
            .insert_marker(&mut tx, episode, 0, 30_000, 0, MarkerType::Intro, false, false, UtcDateTime::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        reconcile(&engine).await.unwrap();
        assert!(purge_check(&engine, episode).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subtree_filters_apply() {
        let (engine, tree) = testkit::engine().await;
        let marker = crud::add(&engine, tree.episodes[0], 0, 30_000, MarkerType::Intro, false).await.unwrap();
        wipe(&engine, marker.id).await;
        reconcile(&engine).await.unwrap();

        assert_eq!(purge_check(&engine, tree.show).await.unwrap().len(), 1);
        assert_eq!(purge_check(&engine, tree.season).await.unwrap().len(), 1);
        assert_eq!(purge_check(&engine, tree.episodes[0]).await.unwrap().len(), 1);
        assert!(purge_check(&engine, tree.episodes[1]).await.unwrap().is_empty());
        assert!(purge_check(&engine, tree.movie).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_into_overlap_fails_and_keeps_the_purge() {
        let (engine, tree) = testkit::engine().await;
        let episode = tree.episodes[0];
        let marker = crud::add(&engine, episode, 10_000, 40_000, MarkerType::Intro, false).await.unwrap();
        wipe(&engine, marker.id).await;
        reconcile(&engine).await.unwrap();

        // Something new moved into the old spot.
        crud::add(&engine, episode, 20_000, 50_000, MarkerType::Intro, false).await.unwrap();

        let err = restore(&engine, marker.id, tree.tv_section).await.unwrap_err();
        assert!(matches!(err.current_value(), ErrorKind::Overlap(_, _)));
        assert_eq!(purge_check(&engine, episode).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ignore_hides_without_forgetting() {
        let (engine, tree) = testkit::engine().await;
        let episode = tree.episodes[0];
        let marker = crud::add(&engine, episode, 0, 30_000, MarkerType::Intro, false).await.unwrap();
        wipe(&engine, marker.id).await;
        reconcile(&engine).await.unwrap();

        ignore(&engine, marker.id, tree.tv_section).await.unwrap();
        assert!(purge_check(&engine, episode).await.unwrap().is_empty());

        // Still hidden after a fresh reconcile: the Ignore entry supersedes.
        reconcile(&engine).await.unwrap();
        assert!(purge_check(&engine, episode).await.unwrap().is_empty());

        // The history survives in the log.
        let history = engine.actions.as_ref().unwrap().entries_for_key(1).await.unwrap();
        assert_eq!(history.last().unwrap().op, ActionOp::Ignore);
        assert!(history.last().unwrap().ignored);
    }

    #[tokio::test]
    async fn test_purge_surface_requires_the_action_log() {
        let (engine, tree) = testkit::engine_without_log().await;
        let err = purge_check(&engine, tree.episodes[0]).await.unwrap_err();
        assert!(matches!(err.current_value(), ErrorKind::FeatureDisabled(_)));
        let err = restore(&engine, 1, tree.tv_section).await.unwrap_err();
        assert!(matches!(err.current_value(), ErrorKind::FeatureDisabled(_)));
    }
}
