//! Bulk time-shift over a subtree.
//!
//! Shifts every selected marker's start and/or end by signed millisecond
//! deltas, classifying each candidate first:
//!
//! - **Error** — the shifted interval has no usable playable range left
//!   (`end' <= 0`, `start' >= duration`, or `end' <= start'`). Never
//!   written, even under force.
//! - **Cutoff** — one endpoint leaves `[0, duration]` but the interval
//!   survives; clamped on commit.
//! - **Clean** — both endpoints stay inside the item.
//!
//! A parent with more than one retained marker is a *linked conflict*; the
//! shift refuses to proceed without `force` so the caller can confirm (or
//! trim the selection via the ignore list).

use crate::engine::{Engine, verify_parent_state};
use crate::error::{ErrorKind, Result};
use cuemark_actions::{ActionOp, KeySource, NewAction};
use cuemark_media::{Marker, MediaItem};
use exn::{OptionExt, ResultExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use time::UtcDateTime;

/// Outcome of a shift or shift preview.
///
/// `applied = false` with `conflict` or `overflow` set means the operation
/// refused and nothing was written; `markers` then carries the candidates
/// so the caller can build an ignore list. On success `markers` holds the
/// post-shift state of every marker that was written.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftResult {
    pub applied: bool,
    pub conflict: bool,
    pub overflow: bool,
    #[serde(rename = "allMarkers")]
    pub markers: Vec<Marker>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Fate {
    Clean,
    Cutoff,
    Error,
}

fn classify(marker: &Marker, d_start: i64, d_end: i64, duration: i64) -> (i64, i64, Fate) {
    let start = marker.start + d_start;
    let end = marker.end + d_end;
    // `end' <= start'` is always Error, even with both endpoints in range.
    if end <= 0 || start >= duration || end <= start {
        return (start, end, Fate::Error);
    }
    if start < 0 || end > duration {
        return (start.max(0), end.min(duration), Fate::Cutoff);
    }
    (start, end, Fate::Clean)
}

/// Enumerate a subtree without mutating: every marker plus the linked flag.
pub(crate) async fn check_shift(engine: &Engine, root_id: i64) -> Result<ShiftResult> {
    let root = subtree_root(engine, root_id).await?;
    let subtree = engine.media.subtree_markers(root.id).await.or_raise(|| ErrorKind::Internal)?;
    let mut per_parent: HashMap<i64, usize> = HashMap::new();
    for entry in &subtree {
        *per_parent.entry(entry.marker.parent_id).or_default() += 1;
    }
    Ok(ShiftResult {
        applied: false,
        conflict: per_parent.values().any(|&count| count > 1),
        overflow: false,
        markers: subtree.into_iter().map(|entry| entry.marker).collect(),
    })
}

pub(crate) async fn shift(
    engine: &Engine,
    root_id: i64,
    d_start: i64,
    d_end: i64,
    force: bool,
    ignored: &HashSet<i64>,
) -> Result<ShiftResult> {
    if d_start == 0 && d_end == 0 {
        exn::bail!(ErrorKind::BadRequest("a shift of (0, 0) does nothing".to_string()));
    }
    let root = subtree_root(engine, root_id).await?;

    let _guard = engine.locks.subtree().await;
    let subtree = engine.media.subtree_markers(root.id).await.or_raise(|| ErrorKind::Internal)?;

    let retained: Vec<&Marker> =
        subtree.iter().map(|entry| &entry.marker).filter(|m| !ignored.contains(&m.id)).collect();
    let mut per_parent: HashMap<i64, usize> = HashMap::new();
    for marker in &retained {
        *per_parent.entry(marker.parent_id).or_default() += 1;
    }
    let linked = per_parent.values().any(|&count| count > 1);
    let any_error = subtree
        .iter()
        .filter(|entry| !ignored.contains(&entry.marker.id))
        .any(|entry| matches!(classify(&entry.marker, d_start, d_end, entry.duration).2, Fate::Error));

    if linked && !force {
        return Ok(ShiftResult {
            applied: false,
            conflict: true,
            overflow: any_error,
            markers: retained.into_iter().cloned().collect(),
        });
    }
    if any_error && !force {
        return Ok(ShiftResult {
            applied: false,
            conflict: false,
            overflow: true,
            markers: retained.into_iter().cloned().collect(),
        });
    }

    // Plan the post-shift state of every parent. Ignored and Error markers
    // keep their intervals but still take part in re-indexing; clamping can
    // reorder equal starts, so each parent is re-sorted wholesale.
    struct Planned {
        marker: Marker,
        mutated: bool,
        index_changed: bool,
        old_start: i64,
        old_end: i64,
    }
    let now = UtcDateTime::now();
    let mut parents: HashMap<i64, (i64, Vec<Planned>)> = HashMap::new();
    for entry in &subtree {
        let marker = &entry.marker;
        let slot = parents.entry(marker.parent_id).or_insert_with(|| (entry.duration, Vec::new()));
        let untouched = || Planned {
            marker: marker.clone(),
            mutated: false,
            index_changed: false,
            old_start: marker.start,
            old_end: marker.end,
        };
        if ignored.contains(&marker.id) {
            slot.1.push(untouched());
            continue;
        }
        let (start, end, fate) = classify(marker, d_start, d_end, entry.duration);
        match fate {
            Fate::Error => {
                tracing::warn!(marker = marker.id, parent = marker.parent_id, "no usable interval after shift; marker left untouched");
                slot.1.push(untouched());
            },
            Fate::Clean | Fate::Cutoff => {
                let mut planned = untouched();
                planned.marker.start = start;
                planned.marker.end = end;
                planned.marker.modified_at = Some(now);
                planned.mutated = true;
                slot.1.push(planned);
            },
        }
    }

    for (duration, planned) in parents.values_mut() {
        planned.sort_by_key(|p| (p.marker.start, p.marker.end, p.marker.id));
        for (rank, p) in planned.iter_mut().enumerate() {
            let rank = i32::try_from(rank).or_raise(|| ErrorKind::Internal)?;
            if p.marker.index != rank {
                p.marker.index = rank;
                p.index_changed = true;
            }
        }
        // Unequal deltas can push former neighbours into each other; refuse
        // rather than commit a state that breaks the no-overlap invariant.
        if let Some(pair) = planned.windows(2).find(|pair| pair[0].marker.overlaps(&pair[1].marker)) {
            exn::bail!(ErrorKind::Overlap(pair[1].marker.start, pair[1].marker.end));
        }
        let state: Vec<Marker> = planned.iter().map(|p| p.marker.clone()).collect();
        verify_parent_state(&state, *duration)?;
    }

    let mut tx = engine.media.begin().await.or_raise(|| ErrorKind::Internal)?;
    for (_, planned) in parents.values() {
        for p in planned {
            if p.mutated {
                engine.media.update_marker(&mut tx, &p.marker).await.or_raise(|| ErrorKind::Internal)?;
            } else if p.index_changed {
                engine
                    .media
                    .update_marker_index(&mut tx, p.marker.id, p.marker.index)
                    .await
                    .or_raise(|| ErrorKind::Internal)?;
            }
        }
    }
    tx.commit().await.or_raise(|| ErrorKind::Internal)?;

    let mut shifted: Vec<(i64, i64, Marker)> = Vec::new();
    for (_, planned) in parents.into_values() {
        for p in planned {
            if p.mutated {
                shifted.push((p.old_start, p.old_end, p.marker));
            }
        }
    }
    shifted.sort_by_key(|(_, _, m)| (m.parent_id, m.start, m.id));
    if let Some(log) = &engine.actions {
        for (old_start, old_end, marker) in &shifted {
            let entry = NewAction::for_marker(ActionOp::Edit, marker, KeySource::LatestForMarker)
                .with_previous(*old_start, *old_end);
            log.record(entry).await.or_raise(|| ErrorKind::Internal)?;
        }
    }
    tracing::info!(root = root.id, count = shifted.len(), d_start, d_end, "markers shifted");
    Ok(ShiftResult {
        applied: true,
        conflict: false,
        overflow: false,
        markers: shifted.into_iter().map(|(_, _, m)| m).collect(),
    })
}

async fn subtree_root(engine: &Engine, id: i64) -> Result<MediaItem> {
    let item = engine
        .media
        .get_item(id)
        .await
        .or_raise(|| ErrorKind::Internal)?
        .ok_or_raise(|| ErrorKind::NotFound(format!("item {id}")))?;
    if !item.kind.is_subtree_root() {
        exn::bail!(ErrorKind::BadTarget(id));
    }
    Ok(item)
}
