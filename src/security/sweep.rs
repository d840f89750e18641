use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Gates the inline eviction passes the in-memory registries run when
/// they fill up, so a registry that stays full pays for at most one pass
/// per interval instead of one per request.
#[derive(Debug)]
pub struct SweepThrottle {
    every: Duration,
    last: Mutex<Option<Instant>>,
}

impl SweepThrottle {
    pub fn new(every: Duration) -> Self {
        Self {
            every,
            last: Mutex::new(None),
        }
    }

    /// True when a pass may run now, and records it. Callers that lose the
    /// race for the lock skip the pass.
    pub fn try_begin(&self) -> bool {
        let Ok(mut last) = self.last.try_lock() else {
            return false;
        };

        let now = Instant::now();
        if last.is_some_and(|at| now.duration_since(at) < self.every) {
            return false;
        }

        *last = Some(now);
        true
    }
}

impl Default for SweepThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
