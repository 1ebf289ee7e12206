//! Outgoing request model
//!
//! [`Request`] is the fully resolved request handed to a [`Transport`]; it is
//! immutable once dispatched. [`RequestParams`] carries the per-call options
//! accepted by [`HttpClient::execute`](crate::HttpClient::execute).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde_json::Value;

use crate::http::auth::Credential;
use crate::http::transport::Transport;
use crate::{Error, Result};

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized as JSON with `Content-Type: application/json`
    Json(Value),
    /// Sent verbatim
    Bytes(Vec<u8>),
    /// Sent as `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
}

/// A resolved request: absolute URL, merged headers, credential applied
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<RequestBody>,
    timeout: Option<Duration>,
}

impl Request {
    /// Create a request without headers or body
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Option<RequestBody>) -> Self {
        self.body = body;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// Per-request timeout forwarded to the transport
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Per-call options for [`HttpClient::execute`](crate::HttpClient::execute)
///
/// Defaults raise typed errors for failed responses; set
/// [`raise_on_error(false)`](Self::raise_on_error) to always receive the response.
#[derive(Clone)]
pub struct RequestParams {
    /// Query parameters appended to the URL in order
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Headers overriding the client defaults by name
    pub headers: HeaderMap,
    /// Transport used for this call instead of the client's default session
    pub session: Option<Arc<dyn Transport>>,
    /// Credential used for this call instead of the configured one
    pub credential: Option<Credential>,
    /// Timeout for this call instead of the configured one
    pub timeout: Option<Duration>,
    pub raise_on_error: bool,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            session: None,
            credential: None,
            timeout: None,
            raise_on_error: true,
        }
    }
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Add a header from strings, validating both name and value
    pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::configuration(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::configuration(format!("Invalid value for header '{}': {}", name, e)))?;
        Ok(self.header(name, value))
    }

    pub fn session(mut self, session: Arc<dyn Transport>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }
}

impl fmt::Debug for RequestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestParams")
            .field("query", &self.query)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("session", &self.session.as_ref().map(|_| "<custom>"))
            .field("credential", &self.credential)
            .field("timeout", &self.timeout)
            .field("raise_on_error", &self.raise_on_error)
            .finish()
    }
}
