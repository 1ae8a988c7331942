use crate::owner::Owner;
use crate::task::{Task, TaskId};
use std::fmt;
use std::sync::Arc;

/// What producers hand to the dispatch thread through the submission chain.
///
/// Cancellation rides the same chain as scheduling so it executes inline on
/// the dispatch thread during the drain, in submission order, without the
/// dispatch loop taking any locks.
pub(crate) enum Command<O: Owner> {
    Schedule(Arc<Task<O>>),
    CancelById(TaskId),
    CancelByOwner(Arc<O>),
    CancelAll,
}

impl<O: Owner> fmt::Debug for Command<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Schedule(task) => f.debug_tuple("Schedule").field(&task.id()).finish(),
            Command::CancelById(id) => f.debug_tuple("CancelById").field(id).finish(),
            Command::CancelByOwner(owner) => {
                f.debug_tuple("CancelByOwner").field(&owner.name()).finish()
            }
            Command::CancelAll => f.write_str("CancelAll"),
        }
    }
}
