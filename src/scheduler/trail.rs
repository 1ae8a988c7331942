//! Time-expiring log of recently dispatched asynchronous tasks, kept purely
//! for diagnostics and rendered by the scheduler's `Display` impl.

use std::collections::VecDeque;
use std::fmt;

/// How many ticks an entry stays visible after dispatch.
pub(crate) const RECENT_TICKS: u64 = 30;

pub(crate) struct DebugTrail {
    entries: VecDeque<TrailEntry>,
}

struct TrailEntry {
    expiry: u64,
    owner: String,
    body: &'static str,
}

impl DebugTrail {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Record one async dispatch. Entries are appended in dispatch order, so
    /// expiries are non-decreasing and pruning from the front is enough.
    pub(crate) fn record(&mut self, expiry: u64, owner: String, body: &'static str) {
        self.entries.push_back(TrailEntry {
            expiry,
            owner,
            body,
        });
    }

    pub(crate) fn prune(&mut self, current_tick: u64) {
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.expiry <= current_tick)
        {
            self.entries.pop_front();
        }
    }

    pub(crate) fn render(&self, current_tick: u64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Recent tasks from {}-{}{{",
            current_tick.saturating_sub(RECENT_TICKS),
            current_tick
        )?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}:{}@{}", entry.owner, entry.body, entry.expiry)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rendered<'a>(&'a DebugTrail, u64);

    impl fmt::Display for Rendered<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            self.0.render(self.1, f)
        }
    }

    #[test]
    fn test_render_format() {
        let mut trail = DebugTrail::new();
        trail.record(40, "plugin-a".to_owned(), "callback");
        trail.record(42, "plugin-b".to_owned(), "observer");

        assert_eq!(
            Rendered(&trail, 12).to_string(),
            "Recent tasks from 0-12{plugin-a:callback@40,plugin-b:observer@42}"
        );
        assert_eq!(
            Rendered(&trail, 50).to_string(),
            "Recent tasks from 20-50{plugin-a:callback@40,plugin-b:observer@42}"
        );
    }

    #[test]
    fn test_prune_drops_expired_from_front() {
        let mut trail = DebugTrail::new();
        trail.record(10, "a".to_owned(), "callback");
        trail.record(20, "b".to_owned(), "callback");
        trail.record(30, "c".to_owned(), "callback");

        trail.prune(9);
        assert_eq!(trail.entries.len(), 3);

        trail.prune(10);
        assert_eq!(trail.entries.len(), 2);

        trail.prune(30);
        assert!(trail.entries.is_empty());
    }

    #[test]
    fn test_empty_trail_renders_braces() {
        let trail = DebugTrail::new();
        assert_eq!(Rendered(&trail, 5).to_string(), "Recent tasks from 0-5{}");
    }
}
