//! Active-task registry: every task from submission until it is cancelled or
//! completes without repeating. Safely readable from any thread.

use crate::owner::Owner;
use crate::task::{Task, TaskId};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct ActiveTasks<O: Owner> {
    tasks: DashMap<TaskId, Arc<Task<O>>>,

    // Kept separately because DashMap's `len` iterates all shards.
    size: AtomicUsize,
}

impl<O: Owner> ActiveTasks<O> {
    pub(crate) fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            size: AtomicUsize::new(0),
        }
    }

    pub(crate) fn insert(&self, task: Arc<Task<O>>) {
        if self.tasks.insert(task.id(), task).is_none() {
            self.size.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn remove(&self, id: TaskId) -> Option<Arc<Task<O>>> {
        self.tasks.remove(&id).map(|(_id, task)| {
            self.size.fetch_sub(1, Ordering::Relaxed);
            task
        })
    }

    pub(crate) fn get(&self, id: TaskId) -> Option<Arc<Task<O>>> {
        self.tasks.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Force the size counter, for exercising capacity limits without
    /// allocating billions of entries.
    #[cfg(test)]
    pub(crate) fn seed_size(&self, n: usize) {
        self.size.store(n, Ordering::Relaxed);
    }

    /// Snapshot of all active tasks. Used by the query surface and the bulk
    /// cancellation paths; never called from the hot dispatch loop.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Task<O>>> {
        self.tasks
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskBody;
    use crate::test_utils::*;
    use parking_lot::Mutex;

    fn task(id: i32) -> Arc<Task<TestOwner>> {
        Arc::new(Task::new(
            TaskId(id),
            test_owner("owner"),
            TaskBody::Callback(Mutex::new(Box::new(|| {}))),
            true,
            None,
        ))
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = ActiveTasks::new();
        registry.insert(task(1));
        registry.insert(task(2));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(TaskId(1)));
        assert_eq!(registry.get(TaskId(2)).unwrap().id(), TaskId(2));

        assert!(registry.remove(TaskId(1)).is_some());
        assert!(registry.remove(TaskId(1)).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reinsert_same_id_keeps_size() {
        let registry = ActiveTasks::new();
        registry.insert(task(7));
        registry.insert(task(7));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = ActiveTasks::new();
        registry.insert(task(1));
        let snapshot = registry.snapshot();
        registry.remove(TaskId(1));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 0);
    }
}
