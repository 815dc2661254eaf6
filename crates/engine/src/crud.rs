//! Single-marker Add / Edit / Delete.
//!
//! Every mutation follows the same shape: resolve and validate, take the
//! per-parent lock, rebuild the parent's would-be state in memory, check the
//! invariants, then write the whole thing in one transaction. The cache
//! delta and the action log entry happen strictly after commit, so a failed
//! transaction leaves no trace anywhere.

use crate::engine::{Engine, verify_parent_state};
use crate::error::{ErrorKind, Result};
use cuemark_actions::{ActionOp, KeySource, NewAction};
use cuemark_media::{Marker, MarkerType, MediaItem};
use exn::{OptionExt, ResultExt};
use time::UtcDateTime;

/// Who is creating the marker: a user request (fresh history) or a purge
/// restore (re-linked to the original history).
pub(crate) enum Provenance {
    User,
    Restore { key: i64 },
}

pub(crate) async fn add(
    engine: &Engine,
    parent_id: i64,
    start: i64,
    end: i64,
    kind: MarkerType,
    is_final: bool,
) -> Result<Marker> {
    add_inner(engine, parent_id, start, end, kind, is_final, Provenance::User).await
}

/// Shared Add path; restores come through here too so they inherit the
/// overlap rules and re-indexing.
pub(crate) async fn add_inner(
    engine: &Engine,
    parent_id: i64,
    start: i64,
    end: i64,
    kind: MarkerType,
    is_final: bool,
    provenance: Provenance,
) -> Result<Marker> {
    // Add is strict about the flag; only Edit silently clears it.
    if is_final && kind != MarkerType::Credits {
        exn::bail!(ErrorKind::BadRequest("only credits markers can be final".to_string()));
    }
    let item = markerable_item(engine, parent_id).await?;
    let duration = duration_of(&item)?;
    validate_interval(start, end, duration)?;

    let _guard = engine.locks.parent(parent_id).await;
    let siblings = engine.media.list_markers(parent_id).await.or_raise(|| ErrorKind::Internal)?;
    if siblings.iter().any(|m| m.start < end && start < m.end) {
        exn::bail!(ErrorKind::Overlap(start, end));
    }

    let now = UtcDateTime::now();
    let rank = siblings.iter().filter(|m| (m.start, m.end) < (start, end)).count();
    let rank = i32::try_from(rank).or_raise(|| ErrorKind::Internal)?;

    let mut tx = engine.media.begin().await.or_raise(|| ErrorKind::Internal)?;
    let id = engine
        .media
        .insert_marker(&mut tx, parent_id, start, end, rank, kind, is_final, true, now)
        .await
        .or_raise(|| ErrorKind::Internal)?;
    let mut state = Vec::with_capacity(siblings.len() + 1);
    for sibling in siblings {
        let mut next = sibling;
        if next.index >= rank {
            next.index += 1;
            engine.media.update_marker_index(&mut tx, next.id, next.index).await.or_raise(|| ErrorKind::Internal)?;
        }
        state.push(next);
    }
    let marker = Marker {
        id,
        parent_id,
        season_id: item.season_id,
        show_id: item.show_id,
        section_id: item.section_id,
        start,
        end,
        index: rank,
        kind,
        is_final,
        user_created: true,
        created_at: now,
        modified_at: None,
    };
    state.push(marker.clone());
    state.sort_by_key(|m| (m.start, m.end, m.id));
    // A violation here drops the transaction, rolling the insert back.
    verify_parent_state(&state, duration)?;
    tx.commit().await.or_raise(|| ErrorKind::Internal)?;

    if let Some(cache) = &engine.cache {
        cache.delta(item.section_id, parent_id, kind, 1).await;
    }
    if let Some(log) = &engine.actions {
        let (op, key) = match provenance {
            Provenance::User => (ActionOp::Add, KeySource::Fresh),
            Provenance::Restore { key } => (ActionOp::Restore, KeySource::Reuse(key)),
        };
        log.record(NewAction::for_marker(op, &marker, key)).await.or_raise(|| ErrorKind::Internal)?;
    }
    tracing::info!(marker = marker.id, parent = parent_id, kind = %kind, "marker added");
    Ok(marker)
}

pub(crate) async fn edit(
    engine: &Engine,
    id: i64,
    start: i64,
    end: i64,
    kind: MarkerType,
    is_final: bool,
    user_created: bool,
) -> Result<Marker> {
    let existing = engine
        .media
        .get_marker(id)
        .await
        .or_raise(|| ErrorKind::Internal)?
        .ok_or_raise(|| ErrorKind::NotFound(format!("marker {id}")))?;
    let is_final = if is_final && kind != MarkerType::Credits {
        tracing::warn!(marker = id, kind = %kind, "clearing the final flag on a non-credits marker");
        false
    } else {
        is_final
    };
    let item = markerable_item(engine, existing.parent_id).await?;
    let duration = duration_of(&item)?;
    validate_interval(start, end, duration)?;

    let _guard = engine.locks.parent(existing.parent_id).await;
    let mut state = engine.media.list_markers(existing.parent_id).await.or_raise(|| ErrorKind::Internal)?;
    // The first lookup ran outside the lock; the sibling list is authoritative.
    let target_pos = state
        .iter()
        .position(|m| m.id == id)
        .ok_or_raise(|| ErrorKind::NotFound(format!("marker {id}")))?;

    let now = UtcDateTime::now();
    {
        let target = &mut state[target_pos];
        target.start = start;
        target.end = end;
        target.kind = kind;
        target.is_final = is_final;
        target.user_created = user_created;
        target.modified_at = Some(now);
    }
    state.sort_by_key(|m| (m.start, m.end, m.id));
    if state.windows(2).any(|pair| pair[0].overlaps(&pair[1])) {
        exn::bail!(ErrorKind::Overlap(start, end));
    }
    let mut index_updates = Vec::new();
    for (rank, marker) in state.iter_mut().enumerate() {
        let rank = i32::try_from(rank).or_raise(|| ErrorKind::Internal)?;
        if marker.index != rank {
            if marker.id != id {
                index_updates.push((marker.id, rank));
            }
            marker.index = rank;
        }
    }
    verify_parent_state(&state, duration)?;
    let updated = state.iter().find(|m| m.id == id).cloned().ok_or_raise(|| ErrorKind::Internal)?;

    let mut tx = engine.media.begin().await.or_raise(|| ErrorKind::Internal)?;
    engine.media.update_marker(&mut tx, &updated).await.or_raise(|| ErrorKind::Internal)?;
    for (sibling_id, rank) in index_updates {
        engine.media.update_marker_index(&mut tx, sibling_id, rank).await.or_raise(|| ErrorKind::Internal)?;
    }
    tx.commit().await.or_raise(|| ErrorKind::Internal)?;

    if let Some(cache) = &engine.cache
        && existing.kind != kind
    {
        cache.delta(item.section_id, existing.parent_id, existing.kind, -1).await;
        cache.delta(item.section_id, existing.parent_id, kind, 1).await;
    }
    if let Some(log) = &engine.actions {
        let entry = NewAction::for_marker(ActionOp::Edit, &updated, KeySource::LatestForMarker)
            .with_previous(existing.start, existing.end);
        log.record(entry).await.or_raise(|| ErrorKind::Internal)?;
    }
    tracing::info!(marker = id, parent = existing.parent_id, "marker edited");
    Ok(updated)
}

pub(crate) async fn delete(engine: &Engine, id: i64) -> Result<Marker> {
    let existing = engine
        .media
        .get_marker(id)
        .await
        .or_raise(|| ErrorKind::Internal)?
        .ok_or_raise(|| ErrorKind::NotFound(format!("marker {id}")))?;
    let item = markerable_item(engine, existing.parent_id).await?;
    let duration = duration_of(&item)?;

    let _guard = engine.locks.parent(existing.parent_id).await;
    let siblings = engine.media.list_markers(existing.parent_id).await.or_raise(|| ErrorKind::Internal)?;
    if !siblings.iter().any(|m| m.id == id) {
        exn::bail!(ErrorKind::NotFound(format!("marker {id}")));
    }
    let mut state: Vec<Marker> = siblings.into_iter().filter(|m| m.id != id).collect();

    let mut tx = engine.media.begin().await.or_raise(|| ErrorKind::Internal)?;
    engine.media.delete_marker(&mut tx, id).await.or_raise(|| ErrorKind::Internal)?;
    for (rank, marker) in state.iter_mut().enumerate() {
        let rank = i32::try_from(rank).or_raise(|| ErrorKind::Internal)?;
        if marker.index != rank {
            engine.media.update_marker_index(&mut tx, marker.id, rank).await.or_raise(|| ErrorKind::Internal)?;
            marker.index = rank;
        }
    }
    verify_parent_state(&state, duration)?;
    tx.commit().await.or_raise(|| ErrorKind::Internal)?;

    if let Some(cache) = &engine.cache {
        cache.delta(item.section_id, existing.parent_id, existing.kind, -1).await;
    }
    if let Some(log) = &engine.actions {
        log.record(NewAction::for_marker(ActionOp::Delete, &existing, KeySource::LatestForMarker))
            .await
            .or_raise(|| ErrorKind::Internal)?;
    }
    tracing::info!(marker = id, parent = existing.parent_id, "marker deleted");
    Ok(existing)
}

async fn markerable_item(engine: &Engine, id: i64) -> Result<MediaItem> {
    let item = engine
        .media
        .get_item(id)
        .await
        .or_raise(|| ErrorKind::Internal)?
        .ok_or_raise(|| ErrorKind::NotFound(format!("item {id}")))?;
    if !item.kind.is_markerable() {
        exn::bail!(ErrorKind::BadTarget(id));
    }
    Ok(item)
}

fn duration_of(item: &MediaItem) -> Result<i64> {
    // Episodes and movies always carry a runtime; a missing one is corrupt
    // library data, not a caller mistake.
    item.duration.ok_or_raise(|| ErrorKind::Internal)
}

fn validate_interval(start: i64, end: i64, duration: i64) -> Result<()> {
    if start < 0 {
        exn::bail!(ErrorKind::BadRequest(format!("start {start} must be non-negative")));
    }
    if start >= end {
        exn::bail!(ErrorKind::BadRequest(format!("start {start} must precede end {end}")));
    }
    if end > duration {
        exn::bail!(ErrorKind::BadRequest(format!("end {end} exceeds the item runtime {duration}")));
    }
    Ok(())
}
