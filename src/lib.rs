//! Tick-driven task scheduler for main-loop hosts.
//!
//! A host application (typically a game server loop) drives the scheduler by
//! calling [`Scheduler::heartbeat`] once per logical tick. Work submitted from
//! any thread runs either inline on the dispatch thread (synchronous tasks)
//! or on a cached worker pool (asynchronous tasks), with tick-granular delays
//! and periods, bulk cancellation by owner, and blocking result retrieval via
//! [`ScheduledFuture`].
//!
//! ```
//! use std::sync::Arc;
//! use tickwork::{Owner, Scheduler};
//!
//! #[derive(Debug)]
//! struct Plugin(&'static str);
//!
//! impl Owner for Plugin {
//!     fn name(&self) -> &str {
//!         self.0
//!     }
//! }
//!
//! let scheduler = Scheduler::new();
//! let plugin = Arc::new(Plugin("demo"));
//!
//! let task = scheduler
//!     .build_task(plugin.clone(), || println!("every 20 ticks"))
//!     .delay(5)
//!     .period(20)
//!     .schedule()
//!     .unwrap();
//!
//! // The host loop owns the tick counter.
//! scheduler.heartbeat(0);
//! scheduler.heartbeat(5); // first run
//! task.cancel();
//! ```
//!
//! Ticks are externally driven and must be non-decreasing; the scheduler never
//! self-times and never blocks inside `heartbeat`.

mod error;
mod owner;

pub mod scheduler;
pub mod task;

pub use error::{FutureError, ScheduleError};
pub use owner::Owner;
pub use scheduler::{Scheduler, TaskBuilder};
pub use task::{PeriodState, ScheduledFuture, TaskHandle, TaskId, Worker};

#[cfg(test)]
mod test_utils;
