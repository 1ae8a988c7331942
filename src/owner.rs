use std::fmt;

/// Opaque identity on whose behalf tasks are scheduled.
///
/// The scheduler never inspects an owner beyond this trait: it is used for
/// bulk cancellation (matched by `Arc` pointer identity), for the activity
/// check at submission time, and for logging and the debug trail.
///
/// A host embedding the scheduler typically implements this for its
/// plugin/module handle type.
pub trait Owner: Send + Sync + fmt::Debug + 'static {
    /// Whether this owner may still schedule work.
    ///
    /// Submissions on behalf of an inactive owner are rejected with
    /// [`ScheduleError::InactiveOwner`](crate::ScheduleError::InactiveOwner)
    /// before any queue interaction. Defaults to always active.
    fn is_active(&self) -> bool {
        true
    }

    /// Short name used in logs and the debug trail.
    fn name(&self) -> &str;
}
