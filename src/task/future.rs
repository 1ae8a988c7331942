//! Future-backed tasks: submit a value-producing callable, receive a handle
//! with blocking/timeout retrieval, cancellation-aware.
//!
//! The callable itself runs on the dispatch thread like any other synchronous
//! task; only the retrieving caller ever blocks.

use crate::error::{FutureError, panic_message};
use crate::owner::Owner;
use crate::scheduler::Scheduler;
use crate::task::period::PeriodCell;
use crate::task::{PeriodState, Task, TaskId};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Type-erased execution protocol of a future-backed task.
///
/// The task record cannot be generic over the produced value, so the body
/// holds the driver as a trait object and the typed [`ScheduledFuture`] holds
/// the concrete [`FutureInner`].
pub(crate) trait FutureDriver: Send + Sync {
    /// Claim the task and run the callable, recording the outcome and waking
    /// all waiters. A failed claim means the task was cancelled first; the
    /// callable must not run.
    fn drive(&self, period: &PeriodCell);

    /// Wake threads blocked in `get()` so they can re-observe the period
    /// state. Called on every cancellation.
    fn wake_waiters(&self);
}

pub(crate) struct FutureInner<T> {
    callable: Mutex<Option<Box<dyn FnOnce() -> T + Send>>>,
    /// `Ok` holds the produced value, `Err` the captured panic message. The
    /// period word, not this slot, is the source of truth for completion.
    outcome: Mutex<Option<Result<T, String>>>,
    done: Condvar,
}

impl<T: Send + 'static> FutureInner<T> {
    pub(crate) fn new(callable: Box<dyn FnOnce() -> T + Send>) -> Self {
        Self {
            callable: Mutex::new(Some(callable)),
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }
}

impl<T: Send + 'static> FutureDriver for FutureInner<T> {
    fn drive(&self, period: &PeriodCell) {
        if !period.claim_future() {
            // Cancelled before processing; the cancel path already woke the
            // waiters and `get()` reports the cancellation.
            return;
        }

        let callable = self.callable.lock().take();
        let result = match callable {
            Some(f) => catch_unwind(AssertUnwindSafe(f)).map_err(|p| panic_message(p.as_ref())),
            // claim_future() succeeds at most once, so the slot is always
            // populated here; keep the terminal transition anyway.
            None => Err("future callable already consumed".to_owned()),
        };

        // Publish outcome and terminal state under the same lock `get()`
        // holds while checking, so no wakeup can be missed.
        let mut slot = self.outcome.lock();
        *slot = Some(result);
        period.finish_future();
        drop(slot);

        self.done.notify_all();
    }

    fn wake_waiters(&self) {
        // Taking the lock orders this notification after any waiter that is
        // between its state check and parking.
        let _slot = self.outcome.lock();
        self.done.notify_all();
    }
}

/// Handle to a submitted value-producing callable.
///
/// Returned immediately by
/// [`Scheduler::call_method`](crate::Scheduler::call_method); the callable
/// runs during a later heartbeat. Exactly one of {value, captured panic,
/// cancellation} is ever observed, and repeated [`get`](Self::get) calls
/// after completion return the same outcome.
pub struct ScheduledFuture<T, O: Owner> {
    task: Arc<Task<O>>,
    inner: Arc<FutureInner<T>>,
    scheduler: Scheduler<O>,
}

impl<T: Send + 'static, O: Owner> ScheduledFuture<T, O> {
    pub(crate) fn new(
        task: Arc<Task<O>>,
        inner: Arc<FutureInner<T>>,
        scheduler: Scheduler<O>,
    ) -> Self {
        Self {
            task,
            inner,
            scheduler,
        }
    }

    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    /// Cancel the task. Succeeds only while the callable has not started;
    /// blocked `get()` callers observe [`FutureError::Cancelled`].
    pub fn cancel(&self) {
        self.scheduler.cancel_task(self.task.id());
    }

    /// Block the calling thread until the callable completes or the task is
    /// cancelled. Never call this from the dispatch thread: the callable runs
    /// on that thread, so it would deadlock.
    pub fn get(&self) -> Result<T, FutureError>
    where
        T: Clone,
    {
        let mut outcome = self.inner.outcome.lock();
        loop {
            if let Some(result) = self.terminal_outcome(&outcome) {
                return result;
            }
            self.inner.done.wait(&mut outcome);
        }
    }

    /// Like [`get`](Self::get), but gives up with [`FutureError::TimedOut`]
    /// once `timeout` elapses with the task still pending.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, FutureError>
    where
        T: Clone,
    {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.inner.outcome.lock();
        loop {
            if let Some(result) = self.terminal_outcome(&outcome) {
                return result;
            }
            if self.inner.done.wait_until(&mut outcome, deadline).timed_out() {
                // One last look: completion may have raced the timeout.
                return match self.terminal_outcome(&outcome) {
                    Some(result) => result,
                    None => Err(FutureError::TimedOut),
                };
            }
        }
    }

    fn terminal_outcome(
        &self,
        outcome: &Option<Result<T, String>>,
    ) -> Option<Result<T, FutureError>>
    where
        T: Clone,
    {
        match self.task.period_state() {
            PeriodState::Cancelled => Some(Err(FutureError::Cancelled)),
            PeriodState::DoneFuture => Some(match outcome {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(msg)) => Err(FutureError::Failed(msg.clone())),
                // DoneFuture is only ever stored together with the outcome.
                None => Err(FutureError::Cancelled),
            }),
            _ => None,
        }
    }
}

impl<T, O: Owner> fmt::Debug for ScheduledFuture<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledFuture")
            .field("task", &self.task)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inner_of(f: impl FnOnce() -> i32 + Send + 'static) -> FutureInner<i32> {
        FutureInner::new(Box::new(f))
    }

    #[test]
    fn test_drive_records_value() {
        let period = PeriodCell::new(None);
        let inner = inner_of(|| 2 + 2);

        inner.drive(&period);

        assert_eq!(period.state(), PeriodState::DoneFuture);
        assert_eq!(*inner.outcome.lock(), Some(Ok(4)));
    }

    #[test]
    fn test_drive_captures_panic() {
        let period = PeriodCell::new(None);
        let inner = inner_of(|| panic!("kaboom"));

        inner.drive(&period);

        assert_eq!(period.state(), PeriodState::DoneFuture);
        assert_eq!(*inner.outcome.lock(), Some(Err("kaboom".to_owned())));
    }

    #[test]
    fn test_drive_skips_cancelled_task() {
        let period = PeriodCell::new(None);
        assert!(period.cancel());

        let inner = inner_of(|| unreachable!("cancelled callable must not run"));
        inner.drive(&period);

        assert_eq!(period.state(), PeriodState::Cancelled);
        assert_eq!(*inner.outcome.lock(), None);
    }
}
