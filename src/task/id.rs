use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque id that uniquely identifies a task relative to all other
/// currently active tasks.
///
/// Ids are handed out monotonically by the scheduler, wrap after `i32::MAX`,
/// and are collision-checked against the active registry on allocation, so an
/// id may be re-used once its task is gone.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct TaskId(pub(crate) i32);

impl TaskId {
    pub(crate) fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Creation-order stamp used only as a FIFO tie-break between tasks that
/// become eligible on the same tick.
pub(crate) fn next_created_at() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}
