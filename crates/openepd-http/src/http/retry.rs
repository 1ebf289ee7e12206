//! Wait computation for the built-in retry loops
//!
//! - [`ThrottleBudget`]: the 429 wait budget of one `execute` call
//! - [`retry_after_delay`]: `Retry-After` header parsing
//! - [`UnavailableBackoff`]: random delay between 503/transport retries

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Wait used when a 429 response carries no usable `Retry-After`
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Budget charged for an immediate retry
pub const ZERO_WAIT_CHARGE: Duration = Duration::from_secs(1);

/// Remaining 429 wait budget for one logical call
///
/// Only ever decremented; a new budget is created for every `execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleBudget {
    total: Duration,
    remaining: Duration,
}

impl ThrottleBudget {
    pub fn new(total: Duration) -> Self {
        Self {
            total,
            remaining: total,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn spent(&self) -> Duration {
        self.total - self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_zero()
    }

    /// Whether waiting `wait` fits in the remaining budget
    pub fn allows(&self, wait: Duration) -> bool {
        wait <= self.remaining
    }

    /// Charge a completed wait; zero waits cost [`ZERO_WAIT_CHARGE`]
    pub fn consume(&mut self, wait: Duration) {
        let charge = if wait.is_zero() { ZERO_WAIT_CHARGE } else { wait };
        self.remaining = self.remaining.saturating_sub(charge);
    }
}

/// Resolve a `Retry-After` header value to a wait
///
/// Accepts delay-seconds (decimals allowed) or an HTTP-date. Dates in the past and
/// negative numbers yield zero. Missing values yield `default`; unparsable ones
/// yield `default` and log a warning.
pub fn retry_after_delay(value: Option<&str>, now: DateTime<Utc>, default: Duration) -> Duration {
    let Some(raw) = value else {
        return default;
    };
    let value = raw.trim();

    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_nan() {
            log::warn!("Invalid Retry-After header: {}", raw);
            return default;
        }
        if seconds <= 0.0 {
            return Duration::ZERO;
        }
        return Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
    }

    match DateTime::parse_from_rfc2822(value) {
        Ok(date) => (date.with_timezone(&Utc) - now).to_std().unwrap_or(Duration::ZERO),
        Err(_) => {
            log::warn!("Invalid Retry-After header: {}", raw);
            default
        }
    }
}

/// Uniform random delay between unavailable retries, in whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableBackoff {
    pub min: Duration,
    pub max: Duration,
}

impl Default for UnavailableBackoff {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(60),
            max: Duration::from_secs(300),
        }
    }
}

impl UnavailableBackoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Always wait exactly `delay`
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay)
    }

    /// Draw the next delay
    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_secs();
        let max = self.max.as_secs();
        if min >= max {
            return Duration::from_secs(min);
        }
        Duration::from_secs(rng.gen_range(min..=max))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min > self.max {
            return Err(format!(
                "unavailable backoff min ({}s) cannot exceed max ({}s)",
                self.min.as_secs(),
                self.max.as_secs()
            ));
        }
        Ok(())
    }
}
