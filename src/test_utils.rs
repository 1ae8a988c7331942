use crate::owner::Owner;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Stand-in for a host plugin/module handle.
#[derive(Debug)]
pub(crate) struct TestOwner {
    name: String,
    active: AtomicBool,
}

impl TestOwner {
    /// Simulate the host tearing the owner down.
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl Owner for TestOwner {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn test_owner(name: &str) -> Arc<TestOwner> {
    Arc::new(TestOwner {
        name: name.to_owned(),
        active: AtomicBool::new(true),
    })
}

/// Poll `cond` until it holds or `timeout` elapses; returns the final value.
/// For asserting on worker-thread progress without flaky sleeps.
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
