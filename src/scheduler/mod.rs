//! The scheduler engine: submission chain, ready queue, active registry, and
//! the per-tick dispatch loop.
//!
//! Concurrency model: exactly one thread (the host's main loop) calls
//! [`Scheduler::heartbeat`]. Everything that thread owns — the ready queue,
//! the temp list, the chain's consumer side — sits behind an uncontended
//! mutex that doubles as the single-consumer guard for the chain. Everything
//! cross-thread (submissions, cancellation, queries, period state) goes
//! through atomics, the lock-free chain, or the concurrent registry, so the
//! dispatch loop never blocks and producers never wait for a tick.

use crate::error::{ScheduleError, panic_message};
use crate::owner::Owner;
use crate::task::future::FutureInner;
use crate::task::{ScheduledFuture, Task, TaskBody, TaskHandle, TaskId, Worker};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

mod builder;
mod chain;
mod command;
mod pool;
mod ready;
mod registry;
mod trail;


pub use builder::TaskBuilder;

use chain::Chain;
use command::Command;
use pool::WorkerPool;
use ready::ReadyQueue;
use registry::ActiveTasks;
use trail::{DebugTrail, RECENT_TICKS};

/// Sentinel for "no synchronous task is currently executing". Real ids are
/// always positive.
const NO_CURRENT_TASK: i32 = 0;

/// Tick-driven task scheduler, generic over the opaque [`Owner`] identity.
///
/// Cheap to clone; all clones share one engine. See the crate docs for the
/// driving contract: `heartbeat(tick)` once per logical tick, ticks
/// non-decreasing, always from the same thread.
pub struct Scheduler<O: Owner> {
    shared: Arc<Shared<O>>,
}

struct Shared<O: Owner> {
    /// Lock-free MPSC handoff from producers to the dispatch loop.
    chain: Chain<O>,

    /// All tasks from submission until cancelled or completed-without-repeat.
    runners: ActiveTasks<O>,

    /// Dispatch-thread state. Only `heartbeat` takes this lock (uncontended
    /// in correct usage); it also serializes `chain.pop`.
    core: Mutex<Core<O>>,

    trail: Mutex<DebugTrail>,

    /// Last tick passed to `heartbeat`. Read by submitters to stamp next-run.
    current_tick: AtomicU64,

    /// Id of the synchronous task currently executing inline, if any.
    current_task: AtomicI32,

    /// Next id candidate. Wraps back to 1 past `i32::MAX`; collisions are
    /// checked against the registry.
    ids: AtomicI32,

    pool: WorkerPool,
}

struct Core<O: Owner> {
    ready: ReadyQueue<O>,
    /// Periodic tasks re-stamped during the current heartbeat. Kept out of
    /// the ready queue until the tick ends so a task never re-observes
    /// itself mid-loop.
    temp: Vec<Arc<Task<O>>>,
}

impl<O: Owner> Scheduler<O> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                chain: Chain::new(),
                runners: ActiveTasks::new(),
                core: Mutex::new(Core {
                    ready: ReadyQueue::new(),
                    temp: Vec::new(),
                }),
                trail: Mutex::new(DebugTrail::new()),
                current_tick: AtomicU64::new(0),
                current_task: AtomicI32::new(NO_CURRENT_TASK),
                ids: AtomicI32::new(1),
                pool: WorkerPool::new(),
            }),
        }
    }

    // === Submission ===

    /// One-shot synchronous task on the next heartbeat.
    pub fn run_task<F>(&self, owner: Arc<O>, f: F) -> Result<TaskHandle<O>, ScheduleError>
    where
        F: FnMut() + Send + 'static,
    {
        self.build_task(owner, f).schedule()
    }

    /// One-shot asynchronous task on the next heartbeat.
    pub fn run_task_async<F>(&self, owner: Arc<O>, f: F) -> Result<TaskHandle<O>, ScheduleError>
    where
        F: FnMut() + Send + 'static,
    {
        self.build_task(owner, f).asynchronous().schedule()
    }

    /// One-shot synchronous task after `delay` ticks.
    pub fn run_task_later<F>(
        &self,
        owner: Arc<O>,
        f: F,
        delay: u64,
    ) -> Result<TaskHandle<O>, ScheduleError>
    where
        F: FnMut() + Send + 'static,
    {
        self.build_task(owner, f).delay(delay).schedule()
    }

    /// One-shot asynchronous task after `delay` ticks.
    pub fn run_task_later_async<F>(
        &self,
        owner: Arc<O>,
        f: F,
        delay: u64,
    ) -> Result<TaskHandle<O>, ScheduleError>
    where
        F: FnMut() + Send + 'static,
    {
        self.build_task(owner, f)
            .delay(delay)
            .asynchronous()
            .schedule()
    }

    /// Synchronous task repeating every `period` ticks after `delay`.
    pub fn run_task_timer<F>(
        &self,
        owner: Arc<O>,
        f: F,
        delay: u64,
        period: u64,
    ) -> Result<TaskHandle<O>, ScheduleError>
    where
        F: FnMut() + Send + 'static,
    {
        self.build_task(owner, f).delay(delay).period(period).schedule()
    }

    /// Asynchronous task repeating every `period` ticks after `delay`.
    pub fn run_task_timer_async<F>(
        &self,
        owner: Arc<O>,
        f: F,
        delay: u64,
        period: u64,
    ) -> Result<TaskHandle<O>, ScheduleError>
    where
        F: FnMut() + Send + 'static,
    {
        self.build_task(owner, f)
            .delay(delay)
            .period(period)
            .asynchronous()
            .schedule()
    }

    /// Builder with a fire-and-forget callback body.
    pub fn build_task<F>(&self, owner: Arc<O>, f: F) -> TaskBuilder<O>
    where
        F: FnMut() + Send + 'static,
    {
        TaskBuilder::new(
            self.clone(),
            owner,
            TaskBody::Callback(Mutex::new(Box::new(f))),
        )
    }

    /// Builder with an observer body: the callback receives the live handle,
    /// so the task can inspect or cancel itself from inside its own body.
    pub fn build_task_observed<F>(&self, owner: Arc<O>, f: F) -> TaskBuilder<O>
    where
        F: FnMut(&TaskHandle<O>) + Send + 'static,
    {
        TaskBuilder::new(
            self.clone(),
            owner,
            TaskBody::Observer(Mutex::new(Box::new(f))),
        )
    }

    /// Submit a value-producing callable and receive the future handle
    /// immediately; the callable runs on the dispatch thread during a later
    /// heartbeat, like any other synchronous task.
    pub fn call_method<T, F>(
        &self,
        owner: Arc<O>,
        f: F,
    ) -> Result<ScheduledFuture<T, O>, ScheduleError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let inner = Arc::new(FutureInner::new(Box::new(f)));
        let handle = self.submit(owner, TaskBody::Future(inner.clone()), true, 0, None)?;
        Ok(ScheduledFuture::new(handle.task, inner, self.clone()))
    }

    /// The single primitive every scheduling entry point funnels into.
    pub(crate) fn submit(
        &self,
        owner: Arc<O>,
        body: TaskBody<O>,
        sync: bool,
        delay: u64,
        period: Option<u64>,
    ) -> Result<TaskHandle<O>, ScheduleError> {
        if !owner.is_active() {
            return Err(ScheduleError::InactiveOwner {
                owner: owner.name().to_owned(),
            });
        }

        let id = self.next_id()?;
        let task = Arc::new(Task::new(id, owner, body, sync, period));
        task.set_next_run(self.current_tick().saturating_add(delay));

        // Registered before it is even drained, so cancellation and queries
        // see the task from the moment the caller holds a handle.
        self.shared.runners.insert(Arc::clone(&task));
        self.shared.chain.push(Command::Schedule(Arc::clone(&task)));

        tracing::debug!(
            task_id = %id,
            owner = task.owner().name(),
            sync,
            next_run = task.next_run(),
            "task scheduled"
        );

        Ok(TaskHandle::new(task, self.clone()))
    }

    fn next_id(&self) -> Result<TaskId, ScheduleError> {
        let active = self.shared.runners.len();
        if active >= i32::MAX as usize {
            return Err(ScheduleError::IdsExhausted { active });
        }

        loop {
            // The closure always returns Some, so fetch_update cannot fail.
            let raw = self
                .shared
                .ids
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                    Some(if v == i32::MAX { 1 } else { v + 1 })
                })
                .unwrap_or(1);
            let id = TaskId(raw);
            if !self.shared.runners.contains(id) {
                return Ok(id);
            }
        }
    }

    // === Cancellation ===

    /// Cancel a single task by id.
    ///
    /// `is_cancelled()` flips immediately. A synchronous task not yet popped
    /// from the ready queue is guaranteed never to run; an asynchronous body
    /// already executing on a worker finishes in flight, with only its repeat
    /// suppressed.
    pub fn cancel_task(&self, id: TaskId) {
        if let Some(task) = self.shared.runners.get(id) {
            self.cancel_record(&task);
        }
        self.shared.chain.push(Command::CancelById(id));
    }

    /// Cancel every task scheduled by `owner` (matched by `Arc` identity),
    /// leaving other owners' tasks untouched.
    pub fn cancel_tasks(&self, owner: &Arc<O>) {
        for task in self.shared.runners.snapshot() {
            if Arc::ptr_eq(task.owner(), owner) {
                self.cancel_record(&task);
            }
        }
        self.shared.chain.push(Command::CancelByOwner(Arc::clone(owner)));
    }

    /// Cancel everything. Typically used when the host shuts down.
    pub fn cancel_all(&self) {
        for task in self.shared.runners.snapshot() {
            self.cancel_record(&task);
        }
        self.shared.chain.push(Command::CancelAll);
    }

    /// Mark one task cancelled and drop it from the registry when nothing is
    /// still executing it. Async tasks with a live worker keep their entry;
    /// the worker removes it when the in-flight body finishes.
    fn cancel_record(&self, task: &Arc<Task<O>>) {
        if !task.cancel() {
            return;
        }
        if task.is_sync() || !task.has_workers() {
            self.shared.runners.remove(task.id());
        }
        tracing::debug!(task_id = %task.id(), owner = task.owner().name(), "task cancelled");
    }

    // === Queries ===

    /// Last tick passed to [`heartbeat`](Self::heartbeat).
    pub fn current_tick(&self) -> u64 {
        self.shared.current_tick.load(Ordering::Acquire)
    }

    /// True while the task body is executing: inline on the dispatch thread
    /// for synchronous tasks, on at least one pool worker for asynchronous
    /// ones.
    pub fn is_currently_running(&self, id: TaskId) -> bool {
        if self.shared.current_task.load(Ordering::Acquire) == id.as_i32() {
            return true;
        }
        self.shared
            .runners
            .get(id)
            .is_some_and(|task| !task.is_sync() && task.has_workers())
    }

    /// True while the task still has a dispatch ahead of it. Future-backed
    /// tasks stop being "queued" the moment their callable is claimed.
    pub fn is_queued(&self, id: TaskId) -> bool {
        self.shared.runners.get(id).is_some_and(|task| task.will_run())
    }

    /// Worker descriptors of every thread currently executing an
    /// asynchronous task body, flattened across tasks.
    pub fn active_workers(&self) -> Vec<Worker> {
        let mut workers = Vec::new();
        for task in self.shared.runners.snapshot() {
            if !task.is_sync() {
                workers.extend(task.workers());
            }
        }
        workers
    }

    /// Handles to every task that will still run: pending in the submission
    /// chain, waiting in the ready queue, or registered as periodic.
    pub fn pending_tasks(&self) -> Vec<TaskHandle<O>> {
        self.shared
            .runners
            .snapshot()
            .into_iter()
            .filter(|task| task.will_run())
            .map(|task| TaskHandle::new(task, self.clone()))
            .collect()
    }

    // === Dispatch ===

    /// Run one tick: drain submissions, execute everything due at
    /// `current_tick`, re-enqueue periodic tasks, prune the debug trail.
    ///
    /// Must be called from a single thread with non-decreasing tick numbers
    /// (ticks may be skipped, never rewound); the scheduler does not validate
    /// this. Never blocks: synchronous bodies run inline and panics are
    /// caught and logged, so one misbehaving task cannot halt the loop.
    pub fn heartbeat(&self, current_tick: u64) {
        let mut core = self.shared.core.lock();
        self.shared
            .current_tick
            .store(current_tick, Ordering::Release);

        self.drain(&mut core);

        while let Some(task) = core.ready.pop_ready(current_tick) {
            if task.is_cancelled() {
                if task.is_sync() {
                    self.shared.runners.remove(task.id());
                }
                self.drain(&mut core);
                continue;
            }

            if task.is_sync() {
                self.run_sync(&task);
            } else {
                self.dispatch_async(current_tick, &task);
            }

            match task.period_raw() {
                period if period > 0 => {
                    task.set_next_run(current_tick.saturating_add(period as u64));
                    core.temp.push(Arc::clone(&task));
                }
                _ if task.is_sync() => {
                    // One-shot (or self-cancelled) and fully executed; async
                    // tasks remove themselves from the worker thread instead,
                    // since only the worker knows when the body finished.
                    self.shared.runners.remove(task.id());
                }
                _ => {}
            }

            if task.is_sync() {
                // Scheduling side effects of the body (submissions, cancels)
                // become visible before the next pop, which is what makes
                // main-thread scheduling sequentially consistent.
                self.drain(&mut core);
            }
        }

        for task in std::mem::take(&mut core.temp) {
            core.ready.push(task);
        }

        self.shared.trail.lock().prune(current_tick);
    }

    fn run_sync(&self, task: &Arc<Task<O>>) {
        self.shared
            .current_task
            .store(task.id().as_i32(), Ordering::Release);

        let handle = TaskHandle::new(Arc::clone(task), self.clone());
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task.run(&handle))) {
            tracing::error!(
                task_id = %task.id(),
                owner = task.owner().name(),
                "synchronous task body panicked: {}",
                panic_message(payload.as_ref())
            );
        }

        self.shared
            .current_task
            .store(NO_CURRENT_TASK, Ordering::Release);
    }

    fn dispatch_async(&self, current_tick: u64, task: &Arc<Task<O>>) {
        self.shared.trail.lock().record(
            current_tick + RECENT_TICKS,
            task.owner().name().to_owned(),
            task.body_kind(),
        );

        let scheduler = self.clone();
        let task = Arc::clone(task);
        self.shared.pool.execute(move || run_async(scheduler, task));
    }

    /// Move every published submission into the ready queue and execute
    /// cancellation commands inline, in submission order.
    fn drain(&self, core: &mut Core<O>) {
        while let Some(cmd) = self.shared.chain.pop() {
            match cmd {
                Command::Schedule(task) => {
                    if task.will_run() {
                        core.ready.push(task);
                    } else {
                        // Cancelled before it was ever drained.
                        self.shared.runners.remove(task.id());
                    }
                }
                Command::CancelById(id) => self.purge(core, |task| task.id() == id),
                Command::CancelByOwner(owner) => {
                    self.purge(core, |task| Arc::ptr_eq(task.owner(), &owner))
                }
                Command::CancelAll => self.purge(core, |_| true),
            }
        }
    }

    /// Drop matching tasks from the ready queue and temp list, cancelling
    /// any that a racing direct cancel has not already reached.
    fn purge(&self, core: &mut Core<O>, matches: impl Fn(&Arc<Task<O>>) -> bool) {
        core.ready.retain(|task| {
            if matches(task) {
                self.cancel_record(task);
                false
            } else {
                true
            }
        });
        core.temp.retain(|task| {
            if matches(task) {
                self.cancel_record(task);
                false
            } else {
                true
            }
        });
    }
}

/// Body of one asynchronous execution, run on a pool worker. The worker owns
/// the registry bookkeeping for its task: only it knows when the out-of-band
/// body has truly finished.
fn run_async<O: Owner>(scheduler: Scheduler<O>, task: Arc<Task<O>>) {
    let worker = Worker::current(task.id(), task.owner().name());
    task.push_worker(worker.clone());

    let handle = TaskHandle::new(Arc::clone(&task), scheduler.clone());
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task.run(&handle))) {
        tracing::error!(
            task_id = %task.id(),
            owner = task.owner().name(),
            "asynchronous task body panicked on worker thread: {}",
            panic_message(payload.as_ref())
        );
    }

    task.pop_worker(&worker);
    if task.period_raw() < 1 && !task.has_workers() {
        scheduler.shared.runners.remove(task.id());
    }
}

impl<O: Owner> Default for Scheduler<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Owner> Clone for Scheduler<O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<O: Owner> fmt::Display for Scheduler<O> {
    /// Renders the debug trail of recently dispatched asynchronous tasks.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.shared.trail.lock().render(self.current_tick(), f)
    }
}

impl<O: Owner> fmt::Debug for Scheduler<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("current_tick", &self.current_tick())
            .field("active_tasks", &self.shared.runners.len())
            .finish()
    }
}
