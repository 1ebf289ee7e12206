//! Transport seam between the execution core and the HTTP library
//!
//! The core only needs `send(request) -> response | transport error`. Connection
//! pooling, TLS and DNS stay inside the implementation; [`ReqwestTransport`] is the
//! default one, built on `reqwest::blocking`.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use reqwest::blocking::{Client as BlockingClient, ClientBuilder};

use crate::http::request::{Request, RequestBody};
use crate::http::response::Response;
use crate::{Error, Result};

/// Failure raised by a [`Transport`] before any response was received
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection error: {message}")]
    Connectivity {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Timeout: {message}")]
    Timeout {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Request error: {message}")]
    Request {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TransportError {
    pub fn connectivity(message: impl Into<String>) -> Self {
        TransportError::Connectivity {
            message: message.into(),
            source: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        TransportError::Timeout {
            message: message.into(),
            source: None,
        }
    }

    pub fn request(message: impl Into<String>) -> Self {
        TransportError::Request {
            message: message.into(),
            source: None,
        }
    }

    /// Connectivity and timeout failures are retried by the unavailable-retry loop
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connectivity { .. } | TransportError::Timeout { .. })
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        let message = error.to_string();
        if error.is_timeout() {
            TransportError::Timeout {
                message,
                source: Some(Box::new(error)),
            }
        } else if error.is_connect() {
            TransportError::Connectivity {
                message,
                source: Some(Box::new(error)),
            }
        } else {
            TransportError::Request {
                message,
                source: Some(Box::new(error)),
            }
        }
    }
}

/// Sends one request and returns the raw response
///
/// Implementations must not retry or throttle; the executor does both.
pub trait Transport: Send + Sync {
    /// Send `request` and return the response with its body still unread
    fn send(&self, request: &Request) -> std::result::Result<Response, TransportError>;

    /// Drop session state such as cookies and pooled connections
    fn reset(&self) {}
}

type ClientFactory = Box<dyn Fn() -> reqwest::Result<BlockingClient> + Send + Sync>;

/// [`Transport`] backed by a `reqwest::blocking::Client`
///
/// Must not be created or used from inside an async runtime; reqwest's blocking
/// client runs its own.
pub struct ReqwestTransport {
    client: RwLock<BlockingClient>,
    factory: ClientFactory,
}

impl ReqwestTransport {
    /// Create a transport with a fresh connection pool and cookie-less session
    pub fn new() -> Result<Self> {
        Self::with_builder(BlockingClient::builder)
    }

    /// Create a transport whose clients come from `builder`, e.g. one with custom
    /// TLS roots; [`reset`](Transport::reset) builds the replacement the same way
    pub fn with_builder<F>(builder: F) -> Result<Self>
    where
        F: Fn() -> ClientBuilder + Send + Sync + 'static,
    {
        let factory: ClientFactory = Box::new(move || builder().build());
        let client = factory().map_err(client_error)?;
        Ok(Self {
            client: RwLock::new(client),
            factory,
        })
    }

    /// Wrap a prebuilt client; a reset replaces it with a default client
    pub fn with_client(client: BlockingClient) -> Self {
        Self {
            client: RwLock::new(client),
            factory: Box::new(|| BlockingClient::builder().build()),
        }
    }

    fn client(&self) -> BlockingClient {
        // reqwest clients are reference counted, cloning shares the pool
        self.client.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

fn client_error(e: reqwest::Error) -> Error {
    Error::HttpRequest {
        message: format!("Failed to create HTTP client: {}", e),
        source: Some(Box::new(e)),
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &Request) -> std::result::Result<Response, TransportError> {
        let mut builder = self
            .client()
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());

        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }

        builder = match request.body() {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes.clone()),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            None => builder,
        };

        let response = builder.send().map_err(TransportError::from_reqwest)?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();

        Ok(Response::from_stream(status, headers, response).with_url(url))
    }

    fn reset(&self) {
        match (self.factory)() {
            Ok(fresh) => {
                *self.client.write().unwrap_or_else(PoisonError::into_inner) = fresh;
            }
            Err(e) => log::warn!("Failed to reset HTTP session, keeping the current one: {}", e),
        }
    }
}
