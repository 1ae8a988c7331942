use std::sync::atomic::{AtomicI64, Ordering};

// Raw period word. Positive values are ticks between runs; everything else is
// a sentinel. Zero is never a resting state: it is coerced to 1 at
// construction so a repeating period can never collide with a sentinel.
pub(crate) const NO_REPEATING: i64 = -1;
pub(crate) const CANCEL: i64 = -2;
pub(crate) const PROCESS_FOR_FUTURE: i64 = -3;
pub(crate) const DONE_FOR_FUTURE: i64 = -4;

/// Decoded view of a task's period word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodState {
    /// Eligible to run exactly once.
    OneShot,
    /// Re-enqueued every `n` ticks after each dispatch.
    Repeating(u64),
    /// Terminal: the task will never run (again).
    Cancelled,
    /// Future only: the callable is currently executing.
    ProcessingFuture,
    /// Future only, terminal: a value or captured panic is available.
    DoneFuture,
}

/// The period state machine, shared between the dispatch thread, worker
/// threads, and cancelling threads.
///
/// Legal transitions: `OneShot`/`Repeating` -> `Cancelled`;
/// `OneShot -> ProcessingFuture -> DoneFuture` for future-backed tasks, with
/// `Cancelled` reachable from any non-terminal state. `Cancelled` and
/// `DoneFuture` are terminal.
#[derive(Debug)]
pub(crate) struct PeriodCell(AtomicI64);

impl PeriodCell {
    /// `None` is one-shot; `Some(0)` is coerced to a period of 1.
    pub(crate) fn new(period: Option<u64>) -> Self {
        let raw = match period {
            None => NO_REPEATING,
            Some(n) => (n.max(1)).min(i64::MAX as u64) as i64,
        };
        Self(AtomicI64::new(raw))
    }

    pub(crate) fn raw(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> PeriodState {
        match self.raw() {
            NO_REPEATING => PeriodState::OneShot,
            CANCEL => PeriodState::Cancelled,
            PROCESS_FOR_FUTURE => PeriodState::ProcessingFuture,
            DONE_FOR_FUTURE => PeriodState::DoneFuture,
            n => PeriodState::Repeating(n as u64),
        }
    }

    /// True while the task still has a dispatch ahead of it.
    pub(crate) fn will_run(&self) -> bool {
        self.raw() >= NO_REPEATING
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.raw() == CANCEL
    }

    /// Transition to `Cancelled`. Returns false if the cell already reached a
    /// terminal state, in which case nothing changes.
    pub(crate) fn cancel(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| match raw {
                CANCEL | DONE_FOR_FUTURE => None,
                _ => Some(CANCEL),
            })
            .is_ok()
    }

    /// Claim a future-backed task for execution. Fails iff the task was
    /// cancelled first, in which case the callable must not run.
    pub(crate) fn claim_future(&self) -> bool {
        self.0
            .compare_exchange(
                NO_REPEATING,
                PROCESS_FOR_FUTURE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn finish_future(&self) {
        self.0.store(DONE_FOR_FUTURE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::one_shot(None, PeriodState::OneShot)]
    #[case::zero_coerced(Some(0), PeriodState::Repeating(1))]
    #[case::repeating(Some(20), PeriodState::Repeating(20))]
    fn test_new_normalizes(#[case] period: Option<u64>, #[case] expected: PeriodState) {
        assert_eq!(PeriodCell::new(period).state(), expected);
    }

    #[test]
    fn test_cancel_is_terminal() {
        let cell = PeriodCell::new(Some(5));
        assert!(cell.will_run());
        assert!(cell.cancel());
        assert!(cell.is_cancelled());
        assert!(!cell.will_run());

        // Second cancel is a no-op, and a cancelled future can't be claimed.
        assert!(!cell.cancel());
        assert!(!cell.claim_future());
        assert_eq!(cell.state(), PeriodState::Cancelled);
    }

    #[test]
    fn test_future_claim_and_finish() {
        let cell = PeriodCell::new(None);
        assert!(cell.claim_future());
        assert_eq!(cell.state(), PeriodState::ProcessingFuture);
        assert!(!cell.will_run());

        cell.finish_future();
        assert_eq!(cell.state(), PeriodState::DoneFuture);

        // DoneFuture is terminal: cancel no longer applies.
        assert!(!cell.cancel());
        assert_eq!(cell.state(), PeriodState::DoneFuture);
    }

    #[test]
    fn test_double_claim_fails() {
        let cell = PeriodCell::new(None);
        assert!(cell.claim_future());
        assert!(!cell.claim_future());
    }
}
