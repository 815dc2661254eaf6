//! Locking discipline for marker mutations.
//!
//! Two layers:
//! - a subtree reader/writer lock: CRUD holds it shared, bulk shift holds
//!   it exclusive, so CRUD against parents under a shifting subtree queues
//!   behind the shift;
//! - a per-parent mutex map serializing CRUD on the same parent, which is
//!   what keeps index contiguity and overlap checks sound under concurrent
//!   requests.
//!
//! The database transaction always nests inside these guards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub(crate) struct Locks {
    tree: RwLock<()>,
    parents: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one CRUD mutation on one parent.
pub(crate) struct ParentGuard<'a> {
    _tree: RwLockReadGuard<'a, ()>,
    _parent: OwnedMutexGuard<()>,
}

impl Locks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serialize against other CRUD on the same parent and against any
    /// in-flight bulk shift.
    pub(crate) async fn parent(&self, parent_id: i64) -> ParentGuard<'_> {
        let tree = self.tree.read().await;
        let slot = {
            let mut parents = self.parents.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(parents.entry(parent_id).or_default())
        };
        ParentGuard { _tree: tree, _parent: slot.lock_owned().await }
    }

    /// Exclusive hold over the whole tree for a bulk shift.
    pub(crate) async fn subtree(&self) -> RwLockWriteGuard<'_, ()> {
        self.tree.write().await
    }
}
