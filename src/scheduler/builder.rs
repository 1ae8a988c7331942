use crate::error::ScheduleError;
use crate::owner::Owner;
use crate::scheduler::Scheduler;
use crate::task::{TaskBody, TaskHandle};
use std::sync::Arc;

/// Configures and submits a task.
///
/// Created by [`Scheduler::build_task`] and [`Scheduler::build_task_observed`].
/// Unset delay means "next heartbeat"; unset period means one-shot; a period
/// of 0 is coerced to 1.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use tickwork::{Owner, Scheduler};
/// # #[derive(Debug)] struct P;
/// # impl Owner for P { fn name(&self) -> &str { "p" } }
/// # let scheduler = Scheduler::new();
/// # let plugin = Arc::new(P);
/// scheduler
///     .build_task(plugin, || { /* work */ })
///     .delay(10)
///     .period(20)
///     .asynchronous()
///     .schedule()
///     .unwrap();
/// ```
pub struct TaskBuilder<O: Owner> {
    scheduler: Scheduler<O>,
    owner: Arc<O>,
    body: TaskBody<O>,
    delay: u64,
    period: Option<u64>,
    sync: bool,
}

impl<O: Owner> TaskBuilder<O> {
    pub(crate) fn new(scheduler: Scheduler<O>, owner: Arc<O>, body: TaskBody<O>) -> Self {
        Self {
            scheduler,
            owner,
            body,
            delay: 0,
            period: None,
            sync: true,
        }
    }

    /// Ticks to wait before the first run.
    pub fn delay(mut self, ticks: u64) -> Self {
        self.delay = ticks;
        self
    }

    /// Ticks between runs. 0 is coerced to 1 so a repeating period can never
    /// collide with the internal sentinels.
    pub fn period(mut self, ticks: u64) -> Self {
        self.period = Some(ticks);
        self
    }

    /// Run the body on the worker pool instead of the dispatch thread.
    pub fn asynchronous(mut self) -> Self {
        self.sync = false;
        self
    }

    /// Validate and enqueue. The returned handle is live immediately, even
    /// though the task only enters the ready queue on the next heartbeat.
    pub fn schedule(self) -> Result<TaskHandle<O>, ScheduleError> {
        self.scheduler
            .submit(self.owner, self.body, self.sync, self.delay, self.period)
    }
}
