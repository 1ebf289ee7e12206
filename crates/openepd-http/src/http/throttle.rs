//! Client-side request throttling
//!
//! [`RateThrottler`] keeps a log of recent grants and blocks callers while issuing
//! another request would exceed the configured rate. With `N = ceil(rate)` and a
//! window of `N / rate` seconds (never shorter than one second), at most `N`
//! grants fall inside any window, so every one-second span sees at most
//! `ceil(rate)` requests and the long-run rate converges to `rate`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::http::clock::{Clock, SystemClock};
use crate::{Error, Result};

/// Sliding-window rate limiter shared by concurrent callers
pub struct RateThrottler {
    rate: f64,
    max_grants: usize,
    window: Duration,
    grants: Mutex<VecDeque<std::time::Instant>>,
    in_flight: AtomicUsize,
    clock: Arc<dyn Clock>,
}

impl RateThrottler {
    /// Create a throttler allowing `requests_per_sec` requests per second
    pub fn new(requests_per_sec: f64) -> Result<Self> {
        Self::with_clock(requests_per_sec, Arc::new(SystemClock))
    }

    /// Create a throttler that waits through `clock`
    pub fn with_clock(requests_per_sec: f64, clock: Arc<dyn Clock>) -> Result<Self> {
        if !requests_per_sec.is_finite() || requests_per_sec <= 0.0 {
            return Err(Error::configuration(format!(
                "requests_per_sec must be a positive number, got {}",
                requests_per_sec
            )));
        }

        let max_grants = requests_per_sec.ceil() as usize;
        let window = Duration::try_from_secs_f64((max_grants as f64 / requests_per_sec).max(1.0))
            .map_err(|e| Error::Configuration {
                message: format!("requests_per_sec {} is too small", requests_per_sec),
                source: Some(anyhow::Error::new(e)),
            })?;

        if clock.now().checked_add(window).is_none() {
            return Err(Error::configuration(format!(
                "requests_per_sec {} is too small",
                requests_per_sec
            )));
        }

        Ok(Self {
            rate: requests_per_sec,
            max_grants,
            window,
            grants: Mutex::new(VecDeque::with_capacity(max_grants.min(1024))),
            in_flight: AtomicUsize::new(0),
            clock,
        })
    }

    /// Block until another request may be issued
    ///
    /// The returned permit holds the slot; dropping it on any exit path releases it.
    pub fn acquire(&self) -> ThrottlePermit<'_> {
        loop {
            let wait = {
                let mut grants = self.grants.lock().unwrap_or_else(PoisonError::into_inner);
                let now = self.clock.now();

                while let Some(oldest) = grants.front() {
                    if now.saturating_duration_since(*oldest) >= self.window {
                        grants.pop_front();
                    } else {
                        break;
                    }
                }

                if grants.len() < self.max_grants {
                    grants.push_back(now);
                    None
                } else {
                    grants
                        .front()
                        .map(|oldest| match oldest.checked_add(self.window) {
                            Some(free_at) => free_at.saturating_duration_since(now),
                            None => self.window,
                        })
                }
            };

            match wait {
                None => break,
                Some(wait) => {
                    log::debug!("Throttling request for {:?}", wait);
                    self.clock.sleep(wait);
                }
            }
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        ThrottlePermit { throttler: self }
    }

    /// Configured requests per second
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Grants allowed inside one window
    pub fn max_grants(&self) -> usize {
        self.max_grants
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Permits currently held by callers
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for RateThrottler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateThrottler")
            .field("rate", &self.rate)
            .field("max_grants", &self.max_grants)
            .field("window", &self.window)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Scoped throttle slot returned by [`RateThrottler::acquire`]
#[must_use = "the slot is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct ThrottlePermit<'a> {
    throttler: &'a RateThrottler,
}

impl Drop for ThrottlePermit<'_> {
    fn drop(&mut self) {
        self.throttler.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
