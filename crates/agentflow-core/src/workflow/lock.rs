//! Per-workflow critical sections.
//!
//! Every mutation of a workflow aggregate (the workflow record plus its step
//! statuses) runs while that workflow's mutex is held. Different workflows
//! lock independently. The map only ever hands out clones of the inner
//! `Arc`, so no `DashMap` guard lives across an `.await`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct WorkflowLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl WorkflowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `workflow_id`.
    pub async fn acquire(&self, workflow_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(workflow_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Release `guard` and forget the entry for `workflow_id` when no other
    /// task holds or waits on it.
    ///
    /// Called at the end of every critical section. Every waiter keeps its
    /// own clone of the mutex, so a strong count of 2 (the map plus `guard`)
    /// means nobody else references it. Only a guard holder removes the
    /// entry.
    pub fn release(&self, workflow_id: &Uuid, guard: OwnedMutexGuard<()>) {
        let held = OwnedMutexGuard::mutex(&guard);
        self.locks.remove_if(workflow_id, |_, lock| {
            Arc::ptr_eq(lock, held) && Arc::strong_count(lock) == 2
        });
        drop(guard);
    }

    /// Number of workflows with a live lock entry (held or awaited).
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
