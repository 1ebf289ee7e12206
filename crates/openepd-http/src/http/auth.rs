//! Credential attachment for outgoing requests
//!
//! The core never obtains tokens itself; it attaches a pre-built [`Credential`]:
//! - Bearer tokens (`Authorization: Bearer ...`), the OpenEPD default
//! - Arbitrary headers, with `${ENV:NAME}` expansion at send time

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Credential attached to every request of a client or a single call
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// Token sent as `Authorization: Bearer <token>`
    Bearer { token: String },
    /// Header sent verbatim after `${ENV:NAME}` expansion
    Header { name: String, value: String },
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Credential::Bearer { token: token.into() }
    }

    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Credential::Header {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Bearer token read from an environment variable
    pub fn bearer_from_env(var: &str) -> Result<Self> {
        std::env::var(var)
            .map(Credential::bearer)
            .map_err(|_| Error::configuration(format!("Environment variable {} not found", var)))
    }

    /// Insert the credential into `headers`, replacing any existing value
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        let (name, value) = self.resolve()?;
        let mut value = HeaderValue::from_str(&value)
            .map_err(|e| Error::configuration(format!("Invalid credential for header '{}': {}", name, e)))?;
        value.set_sensitive(true);
        headers.insert(name, value);
        Ok(())
    }

    /// Check that all referenced environment variables are present
    pub fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    fn resolve(&self) -> Result<(HeaderName, String)> {
        match self {
            Credential::Bearer { token } => Ok((AUTHORIZATION, format!("Bearer {}", token))),
            Credential::Header { name, value } => {
                let header = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| Error::configuration(format!("Invalid credential header name '{}': {}", name, e)))?;
                Ok((header, expand_env_vars(value)?))
            }
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Bearer { .. } => f.debug_struct("Bearer").field("token", &"<redacted>").finish(),
            Credential::Header { name, .. } => f
                .debug_struct("Header")
                .field("name", name)
                .field("value", &"<redacted>")
                .finish(),
        }
    }
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{ENV:([^}]+)\}").expect("Valid regex pattern"))
}

/// Expand environment variables in the format ${ENV:VAR_NAME}
pub fn expand_env_vars(value: &str) -> Result<String> {
    expand_env_vars_with(value, |name| std::env::var(name).ok())
}

/// Expand ${ENV:VAR_NAME} references using `lookup`
pub fn expand_env_vars_with<F>(value: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = value.to_string();

    for cap in env_pattern().captures_iter(value) {
        let var_name = &cap[1];
        let env_value = lookup(var_name)
            .ok_or_else(|| Error::configuration(format!("Environment variable {} not found", var_name)))?;

        let pattern = format!("${{ENV:{}}}", var_name);
        result = result.replace(&pattern, &env_value);
    }

    Ok(result)
}
