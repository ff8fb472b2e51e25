//! Wall-clock abstraction
//!
//! Expiration buckets and status timestamps depend on "now". Routing every
//! read through this trait lets tests pin the time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current Unix time
pub trait Clock: Send + Sync + Clone + 'static {
    /// Current time in Unix milliseconds
    fn now_ms(&self) -> i64;

    /// Current time in whole Unix seconds
    fn now_secs(&self) -> i64 {
        self.now_ms().div_euclid(1000)
    }
}

/// Real system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_millis() as i64,
            // Clock set before 1970
            Err(e) => -(e.duration().as_millis() as i64),
        }
    }
}

/// Clock that only moves when told to
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        ManualClock {
            time_ms: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn set(&self, time_ms: i64) {
        self.time_ms.store(time_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.time_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.time_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(5_000);
        let other = clock.clone();
        clock.advance_ms(1_500);
        assert_eq!(other.now_ms(), 6_500);
        assert_eq!(other.now_secs(), 6);
    }

    #[test]
    fn test_now_secs_floors_negative_time() {
        let clock = ManualClock::new(-1);
        assert_eq!(clock.now_secs(), -1);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_secs() > 1_577_836_800);
    }
}
