use std::any::Any;
use thiserror::Error;

/// Errors returned at submission time, before any queue interaction.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The owner was torn down (or otherwise disabled) and may no longer
    /// schedule work.
    #[error("owner `{owner}` is not active")]
    InactiveOwner {
        /// Name of the rejected owner.
        owner: String,
    },

    /// Every representable task id is currently in use.
    #[error("task id space exhausted: {active} tasks are active")]
    IdsExhausted {
        /// Number of currently active tasks.
        active: usize,
    },
}

/// Errors surfaced by [`ScheduledFuture::get`](crate::ScheduledFuture::get).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FutureError {
    /// The task was cancelled before its callable produced a value.
    #[error("task was cancelled before completion")]
    Cancelled,

    /// The callable panicked; the payload message is preserved.
    #[error("task body panicked: {0}")]
    Failed(String),

    /// The timeout elapsed while the task was still pending.
    #[error("timed out waiting for task result")]
    TimedOut,
}

/// Best-effort extraction of a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
