//! Time source used by every suspension point of the executor
//!
//! Throttle waits, unavailable backoff and `Retry-After` waits all sleep through a
//! [`Clock`], so tests can swap in a [`ManualClock`] and run without real waiting.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Monotonic time, wall-clock time and blocking sleep
pub trait Clock: Send + Sync {
    /// Monotonic instant used for throttling
    fn now(&self) -> Instant;

    /// Wall-clock time used to resolve HTTP-date `Retry-After` values
    fn utc_now(&self) -> DateTime<Utc>;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// The real clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// Virtual clock: `sleep` returns immediately and advances time
///
/// Every requested sleep is recorded, which lets tests assert on the exact
/// backoff schedule of a call.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    utc_origin: DateTime<Utc>,
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Clock whose wall time starts at `utc`
    pub fn starting_at(utc: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            utc_origin: utc,
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        self.state().elapsed += duration;
    }

    /// Virtual time since construction
    pub fn elapsed(&self) -> Duration {
        self.state().elapsed
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.state().sleeps.iter().sum()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.elapsed())
            .ok()
            .and_then(|elapsed| self.utc_origin.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_records_sleeps() {
        let clock = ManualClock::new();
        let start = clock.now();

        clock.sleep(Duration::from_secs(5));
        clock.sleep(Duration::from_millis(250));

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5), Duration::from_millis(250)]);
        assert_eq!(clock.total_slept(), Duration::from_millis(5250));
        assert_eq!(clock.now() - start, Duration::from_millis(5250));
    }

    #[test]
    fn test_advance_moves_wall_time() {
        let origin = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
        let clock = ManualClock::starting_at(origin);

        clock.advance(Duration::from_secs(90));

        assert_eq!(clock.utc_now(), origin + chrono::Duration::seconds(90));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_system_clock_zero_sleep_returns() {
        let clock = SystemClock;
        let before = clock.now();
        clock.sleep(Duration::ZERO);
        assert!(clock.now() >= before);
    }
}
