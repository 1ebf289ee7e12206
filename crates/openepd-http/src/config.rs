//! Client configuration
//!
//! [`ClientConfig`] can be built in code, deserialized, or read from the
//! environment (`OPENEPD_API_URL`, `OPENEPD_API_TOKEN`, ...). A `.env` file in the
//! working directory is honoured by [`ClientConfig::from_env`].

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http::auth::Credential;
use crate::http::client::USER_AGENT_DEFAULT;
use crate::http::retry::{UnavailableBackoff, DEFAULT_RETRY_INTERVAL};
use crate::{Error, Result};

pub const ENV_API_URL: &str = "OPENEPD_API_URL";
pub const ENV_API_TOKEN: &str = "OPENEPD_API_TOKEN";
pub const ENV_REQUESTS_PER_SEC: &str = "OPENEPD_REQUESTS_PER_SEC";
pub const ENV_RETRY_COUNT: &str = "OPENEPD_RETRY_COUNT";
pub const ENV_TIMEOUT_SECS: &str = "OPENEPD_TIMEOUT_SECS";
pub const ENV_THROTTLE_RETRY_TIMEOUT_SECS: &str = "OPENEPD_THROTTLE_RETRY_TIMEOUT_SECS";

/// Configuration consumed by [`HttpClient`](crate::HttpClient)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root, e.g. `https://openepd.buildingtransparency.org/api`
    pub base_url: String,
    /// Throttle ceiling
    pub requests_per_sec: f64,
    /// Total time one call may spend waiting on 429 responses
    pub throttle_retry_timeout: Duration,
    /// Attempts for 503 responses and connectivity/timeout failures
    pub retry_count: u32,
    /// Per-request timeout; the transport default applies when unset
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
    /// Extra headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    pub credential: Option<Credential>,
    /// Wait used when a 429 carries no usable `Retry-After`
    pub default_retry_after: Duration,
    pub unavailable_backoff: UnavailableBackoff,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            requests_per_sec: 10.0,
            throttle_retry_timeout: Duration::from_secs(300),
            retry_count: 3,
            timeout: None,
            user_agent: Some(USER_AGENT_DEFAULT.to_string()),
            default_headers: BTreeMap::new(),
            credential: None,
            default_retry_after: DEFAULT_RETRY_INTERVAL,
            unavailable_backoff: UnavailableBackoff::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_requests_per_sec(mut self, requests_per_sec: f64) -> Self {
        self.requests_per_sec = requests_per_sec;
        self
    }

    pub fn with_throttle_retry_timeout(mut self, timeout: Duration) -> Self {
        self.throttle_retry_timeout = timeout;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_default_retry_after(mut self, interval: Duration) -> Self {
        self.default_retry_after = interval;
        self
    }

    pub fn with_unavailable_backoff(mut self, backoff: UnavailableBackoff) -> Self {
        self.unavailable_backoff = backoff;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("base_url cannot be empty".to_string());
        }

        if !self.requests_per_sec.is_finite() || self.requests_per_sec <= 0.0 {
            return Err(format!(
                "requests_per_sec must be a positive number, got {}",
                self.requests_per_sec
            ));
        }

        if self.retry_count == 0 {
            return Err("retry_count must be at least 1".to_string());
        }

        if self.timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err("timeout cannot be zero".to_string());
        }

        self.unavailable_backoff.validate()
    }

    /// Load from the process environment, reading `.env` first when present
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(ENV_API_URL)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::configuration(format!("{} is not set", ENV_API_URL)))?;

        let mut config = Self::new(base_url);

        if let Some(token) = lookup(ENV_API_TOKEN).filter(|token| !token.is_empty()) {
            config.credential = Some(Credential::bearer(token));
        }
        if let Some(rate) = parse_var::<f64, _>(&lookup, ENV_REQUESTS_PER_SEC)? {
            config.requests_per_sec = rate;
        }
        if let Some(count) = parse_var::<u32, _>(&lookup, ENV_RETRY_COUNT)? {
            config.retry_count = count;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_TIMEOUT_SECS)? {
            config.timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_THROTTLE_RETRY_TIMEOUT_SECS)? {
            config.throttle_retry_timeout = Duration::from_secs(secs);
        }

        config.validate().map_err(Error::configuration)?;
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::configuration(format!("Invalid {} '{}': {}", key, raw, e))),
    }
}
