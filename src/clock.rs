//! Injectable clock (spec §6: "implementations must inject a clock for
//! testability"). Lease expiry and TTL comparisons go through `monotonic()`;
//! wall-clock timestamps stored on domain rows go through `now_utc()`.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
    fn monotonic(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that starts at a fixed instant and only advances when told to.
/// Used by tests that need deterministic lease expiry / TTL behavior.
pub struct FixedClock {
    wall: Mutex<DateTime<Utc>>,
    mono_base: Instant,
    mono_offset: Mutex<Duration>,
}

impl FixedClock {
    pub fn at(wall: DateTime<Utc>) -> Self {
        Self {
            wall: Mutex::new(wall),
            mono_base: Instant::now(),
            mono_offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, d: Duration) {
        *self.wall.lock().unwrap() += chrono::Duration::from_std(d).unwrap();
        *self.mono_offset.lock().unwrap() += d;
    }

    pub fn set(&self, wall: DateTime<Utc>) {
        *self.wall.lock().unwrap() = wall;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.wall.lock().unwrap()
    }

    fn monotonic(&self) -> Instant {
        self.mono_base + *self.mono_offset.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_both_wall_and_monotonic() {
        let start = DateTime::parse_from_rfc3339("2023-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = FixedClock::at(start);
        let m0 = clock.monotonic();
        clock.advance(Duration::from_secs(30));
        assert_eq!(clock.now_utc(), start + chrono::Duration::seconds(30));
        assert!(clock.monotonic() >= m0 + Duration::from_secs(30));
    }
}
