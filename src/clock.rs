//! Time source shared by the cooldown and the prompt timestamps.

use chrono::{DateTime, Local, TimeDelta};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Trait for time operations, allowing mock time in tests.
pub trait Clock: Send + Sync {
    /// Monotonic instant, used for elapsed-time checks.
    fn now(&self) -> Instant;

    /// Local wall-clock time, used for rendering.
    fn wall_now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<(Instant, DateTime<Local>)>>,
}

impl MockClock {
    /// Creates a mock clock starting at the current time.
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new((Instant::now(), Local::now()))),
        }
    }

    /// Advances both the monotonic and the wall-clock time.
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.0 += duration;
        current.1 = current.1 + TimeDelta::from_std(duration).unwrap_or(TimeDelta::zero());
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    fn wall_now(&self) -> DateTime<Local> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances_both_times() {
        let clock = MockClock::new();
        let (start, wall) = (clock.now(), clock.wall_now());

        clock.advance(Duration::from_secs(12));

        assert_eq!(clock.now() - start, Duration::from_secs(12));
        assert_eq!((clock.wall_now() - wall).num_seconds(), 12);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
