//! Suppression of bursts of manual sync requests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::clock::Clock;

/// Lets a trigger through at most once per `min_interval`.
pub struct Debouncer {
    clock: Arc<dyn Clock>,
    min_interval_ms: i64,
    last_trigger: AtomicI64,
}

impl Debouncer {
    pub fn new(clock: Arc<dyn Clock>, min_interval: Duration) -> Self {
        Self {
            clock,
            min_interval_ms: i64::try_from(min_interval.as_millis()).unwrap_or(i64::MAX),
            last_trigger: AtomicI64::new(i64::MIN),
        }
    }

    /// Returns `true` and records the trigger when enough time has passed.
    pub fn try_trigger(&self) -> bool {
        let now = self.clock.now_millis();
        let mut last = self.last_trigger.load(Ordering::SeqCst);
        loop {
            if last != i64::MIN && now.saturating_sub(last) < self.min_interval_ms {
                return false;
            }
            match self
                .last_trigger
                .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(current) => last = current,
            }
        }
    }

    /// Forget the last trigger so the next call goes through
    pub fn reset(&self) {
        self.last_trigger.store(i64::MIN, Ordering::SeqCst);
    }
}
