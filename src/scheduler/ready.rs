//! Tick-ordered ready queue. Dispatch thread only.

use crate::owner::Owner;
use crate::task::Task;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Priority queue keyed by next-run tick ascending, then creation order
/// ascending, so tasks eligible on the same tick dispatch FIFO.
pub(crate) struct ReadyQueue<O: Owner> {
    heap: BinaryHeap<Entry<O>>,
}

struct Entry<O: Owner> {
    /// Snapshot taken at insertion; `next_run` on the task only changes on
    /// the dispatch thread, between queue residencies.
    next_run: u64,
    created_at: u64,
    task: Arc<Task<O>>,
}

impl<O: Owner> PartialEq for Entry<O> {
    fn eq(&self, other: &Self) -> bool {
        self.next_run == other.next_run && self.created_at == other.created_at
    }
}

impl<O: Owner> Eq for Entry<O> {}

impl<O: Owner> PartialOrd for Entry<O> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<O: Owner> Ord for Entry<O> {
    // Inverted so the BinaryHeap max-heap yields the smallest key first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .next_run
            .cmp(&self.next_run)
            .then_with(|| other.created_at.cmp(&self.created_at))
    }
}

impl<O: Owner> ReadyQueue<O> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub(crate) fn push(&mut self, task: Arc<Task<O>>) {
        self.heap.push(Entry {
            next_run: task.next_run(),
            created_at: task.created_at(),
            task,
        });
    }

    /// Pop the head if it is due at `current_tick`.
    pub(crate) fn pop_ready(&mut self, current_tick: u64) -> Option<Arc<Task<O>>> {
        if self.heap.peek()?.next_run > current_tick {
            return None;
        }
        self.heap.pop().map(|entry| entry.task)
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&Arc<Task<O>>) -> bool) {
        self.heap.retain(|entry| keep(&entry.task));
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskBody, TaskId};
    use crate::test_utils::*;
    use parking_lot::Mutex;

    fn task_at(id: i32, next_run: u64) -> Arc<Task<TestOwner>> {
        let task = Arc::new(Task::new(
            TaskId(id),
            test_owner("owner"),
            TaskBody::Callback(Mutex::new(Box::new(|| {}))),
            true,
            None,
        ));
        task.set_next_run(next_run);
        task
    }

    #[test]
    fn test_orders_by_next_run() {
        let mut queue = ReadyQueue::new();
        queue.push(task_at(1, 30));
        queue.push(task_at(2, 10));
        queue.push(task_at(3, 20));

        assert_eq!(queue.pop_ready(100).unwrap().id(), TaskId(2));
        assert_eq!(queue.pop_ready(100).unwrap().id(), TaskId(3));
        assert_eq!(queue.pop_ready(100).unwrap().id(), TaskId(1));
        assert!(queue.pop_ready(100).is_none());
    }

    #[test]
    fn test_same_tick_is_fifo_by_creation() {
        let mut queue = ReadyQueue::new();
        // Created in id order; all due on the same tick.
        let first = task_at(1, 5);
        let second = task_at(2, 5);
        let third = task_at(3, 5);
        queue.push(third.clone());
        queue.push(first.clone());
        queue.push(second.clone());

        assert_eq!(queue.pop_ready(5).unwrap().id(), first.id());
        assert_eq!(queue.pop_ready(5).unwrap().id(), second.id());
        assert_eq!(queue.pop_ready(5).unwrap().id(), third.id());
    }

    #[test]
    fn test_not_due_stays_queued() {
        let mut queue = ReadyQueue::new();
        queue.push(task_at(1, 50));
        assert!(queue.pop_ready(49).is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_ready(50).is_some());
    }

    #[test]
    fn test_retain_drops_matches() {
        let mut queue = ReadyQueue::new();
        queue.push(task_at(1, 1));
        queue.push(task_at(2, 2));
        queue.push(task_at(3, 3));

        queue.retain(|task| task.id() != TaskId(2));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_ready(10).unwrap().id(), TaskId(1));
        assert_eq!(queue.pop_ready(10).unwrap().id(), TaskId(3));
    }
}
