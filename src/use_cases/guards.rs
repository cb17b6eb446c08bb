//! In-process coordination: one live call per transaction id, and one
//! state-mutating call per group at a time.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Critical sections below never panic; recover the data if one did.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transaction ids with a call currently executing.
#[derive(Default)]
pub struct InFlightRegistry {
    ids: Mutex<HashSet<Uuid>>,
}

impl InFlightRegistry {
    /// Marks `id` as processing. Returns `None` when it already is.
    pub fn claim(self: &Arc<Self>, id: Uuid) -> Option<InFlightGuard> {
        if !lock(&self.ids).insert(id) {
            return None;
        }
        Some(InFlightGuard {
            registry: Arc::clone(self),
            id,
        })
    }

    #[cfg(test)]
    fn is_in_flight(&self, id: Uuid) -> bool {
        lock(&self.ids).contains(&id)
    }
}

pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.registry.ids).remove(&self.id);
    }
}

/// Per-root async mutexes, created on demand and dropped when unused.
#[derive(Default)]
pub struct GroupLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl GroupLocks {
    pub async fn acquire(self: &Arc<Self>, root_id: Uuid) -> GroupGuard {
        let mutex = Arc::clone(lock(&self.locks).entry(root_id).or_default());
        let guard = mutex.clone().lock_owned().await;
        GroupGuard {
            locks: Arc::clone(self),
            root_id,
            mutex,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock(&self.locks).len()
    }
}

pub struct GroupGuard {
    locks: Arc<GroupLocks>,
    root_id: Uuid,
    mutex: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        let mut locks = lock(&self.locks.locks);
        self.guard.take();
        // Only the map and this guard still reference the mutex.
        if Arc::strong_count(&self.mutex) == 2 {
            locks.remove(&self.root_id);
        }
    }
}
