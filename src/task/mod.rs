//! Task records and the handles exposed to submitters.
//!
//! A [`Task`] is the scheduler-internal record: owner, body, period state
//! machine, next-run tick, and (for asynchronous tasks) the set of worker
//! threads currently executing it. Submitters only ever hold a
//! [`TaskHandle`], which exposes the id/owner/cancel surface.

use crate::owner::Owner;
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) mod future;
pub(crate) mod id;
pub(crate) mod period;

pub use future::ScheduledFuture;
pub use id::TaskId;
pub use period::PeriodState;

use future::FutureDriver;
use period::PeriodCell;

/// The unit of work carried by a task. Exactly one shape per task, fixed at
/// construction.
pub(crate) enum TaskBody<O: Owner> {
    /// Fire-and-forget callback.
    Callback(Mutex<Box<dyn FnMut() + Send>>),
    /// Callback that receives the live handle, so the body can inspect or
    /// cancel its own task.
    Observer(Mutex<Box<dyn FnMut(&TaskHandle<O>) + Send>>),
    /// Value-producing callable behind a [`ScheduledFuture`].
    Future(Arc<dyn FutureDriver>),
}

impl<O: Owner> TaskBody<O> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            TaskBody::Callback(_) => "callback",
            TaskBody::Observer(_) => "observer",
            TaskBody::Future(_) => "future",
        }
    }
}

pub(crate) struct Task<O: Owner> {
    id: TaskId,
    owner: Arc<O>,
    body: TaskBody<O>,
    sync: bool,
    period: PeriodCell,
    /// Tick at which the task next becomes eligible. Written only by the
    /// dispatch thread, read from anywhere.
    next_run: AtomicU64,
    created_at: u64,
    /// Worker threads currently executing the body. Only populated for
    /// asynchronous tasks; normally 0 or 1 entries.
    workers: Mutex<SmallVec<[Worker; 1]>>,
}

impl<O: Owner> Task<O> {
    pub(crate) fn new(
        id: TaskId,
        owner: Arc<O>,
        body: TaskBody<O>,
        sync: bool,
        period: Option<u64>,
    ) -> Self {
        Self {
            id,
            owner,
            body,
            sync,
            period: PeriodCell::new(period),
            next_run: AtomicU64::new(0),
            created_at: id::next_created_at(),
            workers: Mutex::new(SmallVec::new()),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn owner(&self) -> &Arc<O> {
        &self.owner
    }

    pub(crate) fn is_sync(&self) -> bool {
        self.sync
    }

    pub(crate) fn body_kind(&self) -> &'static str {
        self.body.kind()
    }

    pub(crate) fn created_at(&self) -> u64 {
        self.created_at
    }

    pub(crate) fn next_run(&self) -> u64 {
        self.next_run.load(Ordering::Acquire)
    }

    pub(crate) fn set_next_run(&self, tick: u64) {
        self.next_run.store(tick, Ordering::Release);
    }

    pub(crate) fn period_raw(&self) -> i64 {
        self.period.raw()
    }

    pub(crate) fn period_state(&self) -> PeriodState {
        self.period.state()
    }

    pub(crate) fn will_run(&self) -> bool {
        self.period.will_run()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.period.is_cancelled()
    }

    /// Mark the task cancelled. Waiters blocked on a future-backed task are
    /// woken so they can observe the cancellation. Returns false if the
    /// period already reached a terminal state.
    pub(crate) fn cancel(&self) -> bool {
        let cancelled = self.period.cancel();
        if cancelled {
            if let TaskBody::Future(driver) = &self.body {
                driver.wake_waiters();
            }
        }
        cancelled
    }

    /// Execute the body once. Runs on the dispatch thread for synchronous
    /// tasks and on a pool worker for asynchronous ones; panics propagate to
    /// the caller, which is responsible for catching and logging them.
    pub(crate) fn run(&self, handle: &TaskHandle<O>) {
        match &self.body {
            TaskBody::Callback(f) => {
                let mut f = f.lock();
                (*f)();
            }
            TaskBody::Observer(f) => {
                let mut f = f.lock();
                (*f)(handle);
            }
            TaskBody::Future(driver) => driver.drive(&self.period),
        }
    }

    pub(crate) fn push_worker(&self, worker: Worker) {
        self.workers.lock().push(worker);
    }

    pub(crate) fn pop_worker(&self, worker: &Worker) {
        self.workers.lock().retain(|w| w != worker);
    }

    pub(crate) fn has_workers(&self) -> bool {
        !self.workers.lock().is_empty()
    }

    pub(crate) fn workers(&self) -> Vec<Worker> {
        self.workers.lock().iter().cloned().collect()
    }
}

impl<O: Owner> fmt::Debug for Task<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("owner", &self.owner.name())
            .field("body", &self.body.kind())
            .field("sync", &self.sync)
            .field("period", &self.period.state())
            .field("next_run", &self.next_run())
            .finish()
    }
}

/// Handle returned from every submission.
///
/// Cloneable and freely shareable across threads; cancelling through the
/// handle routes through the scheduler's cancellation protocol so pending
/// queue entries are purged as well.
pub struct TaskHandle<O: Owner> {
    pub(crate) task: Arc<Task<O>>,
    scheduler: Scheduler<O>,
}

impl<O: Owner> TaskHandle<O> {
    pub(crate) fn new(task: Arc<Task<O>>, scheduler: Scheduler<O>) -> Self {
        Self { task, scheduler }
    }

    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    pub fn owner(&self) -> &Arc<O> {
        self.task.owner()
    }

    /// True for tasks that run inline on the dispatch thread.
    pub fn is_sync(&self) -> bool {
        self.task.is_sync()
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    /// Current period state, mostly useful for diagnostics.
    pub fn period_state(&self) -> PeriodState {
        self.task.period_state()
    }

    /// Cancel this task. Synchronous tasks not yet popped are guaranteed
    /// never to run; an asynchronous body already on a worker thread finishes
    /// its in-flight execution, but its repeat is suppressed.
    pub fn cancel(&self) {
        self.scheduler.cancel_task(self.id());
    }
}

impl<O: Owner> Clone for TaskHandle<O> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<O: Owner> fmt::Debug for TaskHandle<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task", &self.task)
            .finish()
    }
}

/// Descriptor of a worker thread currently executing an asynchronous task
/// body. Flattened across all tasks by
/// [`Scheduler::active_workers`](crate::Scheduler::active_workers).
#[derive(Debug, Clone)]
pub struct Worker {
    task_id: TaskId,
    owner: String,
    thread: std::thread::Thread,
}

impl Worker {
    pub(crate) fn current(task_id: TaskId, owner: &str) -> Self {
        Self {
            task_id,
            owner: owner.to_owned(),
            thread: std::thread::current(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Name of the owner the executing task belongs to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn thread(&self) -> &std::thread::Thread {
        &self.thread
    }
}

impl PartialEq for Worker {
    fn eq(&self, other: &Self) -> bool {
        self.task_id == other.task_id && self.thread.id() == other.thread.id()
    }
}

impl Eq for Worker {}
