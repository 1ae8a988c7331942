//! Cached worker pool for asynchronous task bodies.
//!
//! Unbounded: a new thread is spawned whenever a job arrives and no worker is
//! idle. Idle workers park on the queue condvar and exit after a keep-alive,
//! so a quiet scheduler holds no threads.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const KEEP_ALIVE: Duration = Duration::from_secs(60);

type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) type ThreadNameFn = Arc<dyn Fn() -> String + Send + Sync + 'static>;

fn default_thread_name_fn() -> ThreadNameFn {
    let counter = Arc::new(AtomicUsize::new(0));

    Arc::new(move || {
        let prev = counter.fetch_add(1, Ordering::Relaxed);
        format!("tickwork-worker-{}", prev)
    })
}

pub(crate) struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    queue: Mutex<VecDeque<Job>>,
    job_ready: Condvar,
    /// Workers currently parked in `job_ready`. Incremented/decremented while
    /// holding the queue lock, so `execute` reads a consistent value.
    idle: AtomicUsize,
    thread_name: ThreadNameFn,
    keep_alive: Duration,
}

impl WorkerPool {
    pub(crate) fn new() -> Self {
        Self::with_keep_alive(KEEP_ALIVE)
    }

    fn with_keep_alive(keep_alive: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                queue: Mutex::new(VecDeque::new()),
                job_ready: Condvar::new(),
                idle: AtomicUsize::new(0),
                thread_name: default_thread_name_fn(),
                keep_alive,
            }),
        }
    }

    /// Hand a job to an idle worker, spawning a fresh one if none is parked.
    /// Never blocks the caller beyond the queue lock.
    pub(crate) fn execute(&self, job: impl FnOnce() + Send + 'static) {
        let mut queue = self.inner.queue.lock();
        queue.push_back(Box::new(job));
        let need_thread = self.inner.idle.load(Ordering::Relaxed) == 0;
        drop(queue);

        if need_thread {
            self.spawn_worker();
        }
        self.inner.job_ready.notify_one();
    }

    fn spawn_worker(&self) {
        let inner = Arc::clone(&self.inner);
        let name = (self.inner.thread_name)();
        if let Err(e) = std::thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(inner))
        {
            // Queued jobs are still picked up by existing workers, but a task
            // may be delayed; surfacing this loudly is all we can do.
            panic!("FATAL: failed to spawn scheduler worker thread: {:?}", e);
        }
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                inner.idle.fetch_add(1, Ordering::Relaxed);
                let timed_out = inner
                    .job_ready
                    .wait_for(&mut queue, inner.keep_alive)
                    .timed_out();
                inner.idle.fetch_sub(1, Ordering::Relaxed);
                if timed_out && queue.is_empty() {
                    break None;
                }
                // Woken (or raced a job past the timeout): retry the pop.
            }
        };

        match job {
            Some(job) => job(),
            None => return,
        }
    }
}
