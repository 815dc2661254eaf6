//! Read-only enumeration and aggregate queries.

use crate::cache::{Breakdown, ItemCounts, counts_from_overview};
use crate::engine::Engine;
use crate::error::{ErrorKind, Result};
use cuemark_media::{LibrarySection, Marker, MarkerableKind, MediaItem, MetadataType};
use exn::{OptionExt, ResultExt};
use std::collections::HashMap;

pub(crate) async fn libraries(engine: &Engine) -> Result<Vec<LibrarySection>> {
    engine.media.sections().await.or_raise(|| ErrorKind::Internal)
}

pub(crate) async fn section_items(engine: &Engine, section_id: i64) -> Result<Vec<MediaItem>> {
    engine.media.section_items(section_id).await.or_raise(|| ErrorKind::Internal)
}

pub(crate) async fn seasons(engine: &Engine, show_id: i64) -> Result<Vec<MediaItem>> {
    require_item(engine, show_id).await?;
    engine.media.list_children(show_id, MarkerableKind::Season).await.or_raise(|| ErrorKind::Internal)
}

pub(crate) async fn episodes(engine: &Engine, season_id: i64) -> Result<Vec<MediaItem>> {
    require_item(engine, season_id).await?;
    engine.media.list_children(season_id, MarkerableKind::Episode).await.or_raise(|| ErrorKind::Internal)
}

pub(crate) async fn markers_for_parents(engine: &Engine, parent_ids: &[i64]) -> Result<HashMap<i64, Vec<Marker>>> {
    engine.media.markers_for_parents(parent_ids).await.or_raise(|| ErrorKind::Internal)
}

/// Aggregate statistics for a whole section. Served from the cache when the
/// extended-stats feature is on; otherwise one overview scan answers the
/// question directly.
pub(crate) async fn section_stats(engine: &Engine, section_id: i64) -> Result<Breakdown> {
    if let Some(cache) = &engine.cache {
        return Ok(cache.breakdown(section_id).await);
    }
    let overview = engine.media.section_overview(section_id).await.or_raise(|| ErrorKind::Internal)?;
    let counts = counts_from_overview(&overview);
    Ok(Breakdown::from_counts(counts.values()))
}

/// Aggregate statistics rolled up under one show, season, episode or
/// movie: the sum of its leaves' buckets.
pub(crate) async fn subtree_stats(engine: &Engine, root_id: i64) -> Result<Breakdown> {
    let root = require_item(engine, root_id).await?;
    let leaves = match root.kind {
        MetadataType::Episode | MetadataType::Movie => vec![root.id],
        MetadataType::Season => episode_ids(engine, root.id).await?,
        MetadataType::Show => {
            let mut leaves = Vec::new();
            for season in
                engine.media.list_children(root.id, MarkerableKind::Season).await.or_raise(|| ErrorKind::Internal)?
            {
                leaves.extend(episode_ids(engine, season.id).await?);
            }
            leaves
        },
        _ => exn::bail!(ErrorKind::BadTarget(root_id)),
    };
    if let Some(cache) = &engine.cache {
        return Ok(cache.breakdown_for(root.section_id, &leaves).await);
    }
    let markers = engine.media.markers_for_parents(&leaves).await.or_raise(|| ErrorKind::Internal)?;
    let counts: Vec<ItemCounts> = markers
        .values()
        .map(|markers| {
            let mut item = ItemCounts::default();
            for marker in markers {
                item.adjust(marker.kind, 1);
            }
            item
        })
        .collect();
    Ok(Breakdown::from_counts(counts.iter()))
}

async fn episode_ids(engine: &Engine, season_id: i64) -> Result<Vec<i64>> {
    Ok(engine
        .media
        .list_children(season_id, MarkerableKind::Episode)
        .await
        .or_raise(|| ErrorKind::Internal)?
        .into_iter()
        .map(|episode| episode.id)
        .collect())
}

async fn require_item(engine: &Engine, id: i64) -> Result<MediaItem> {
    engine
        .media
        .get_item(id)
        .await
        .or_raise(|| ErrorKind::Internal)?
        .ok_or_raise(|| ErrorKind::NotFound(format!("item {id}")))
}
