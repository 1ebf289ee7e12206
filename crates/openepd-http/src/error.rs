//! Error types for the OpenEPD HTTP core
//!
//! This module defines the error taxonomy surfaced by [`HttpClient`](crate::HttpClient),
//! using thiserror for the definitions and anyhow for free-form configuration context.
//!
//! Transport failures keep their original message and source. API failures carry the
//! [`ClassifiedError`] parsed from the server response.

use reqwest::StatusCode;
use thiserror::Error;

use crate::http::classifier::{ApiErrorKind, ClassifiedError};
use crate::http::transport::TransportError;

/// Main error type for OpenEPD HTTP operations
#[derive(Error, Debug)]
pub enum Error {
    /// The transport could not reach the server
    #[error("Connection error: {message}")]
    Connectivity {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The transport gave up waiting for the server
    #[error("Request timed out: {message}")]
    Timeout {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Any other transport failure, or a request that could not be built
    #[error("HTTP request error: {message}")]
    HttpRequest {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// 400 Bad Request
    #[error("Validation error: {0}")]
    Validation(ClassifiedError),

    /// 401 Unauthorized
    #[error("Not authorized: {0}")]
    NotAuthorized(ClassifiedError),

    /// 403 Forbidden
    #[error("Access denied: {0}")]
    AccessDenied(ClassifiedError),

    /// 404 Not Found
    #[error("Object not found: {0}")]
    NotFound(ClassifiedError),

    /// 500 Internal Server Error
    #[error("Server error: {0}")]
    Server(ClassifiedError),

    /// Any other non-ok status that no error policy handled
    #[error("HTTP error: {0}")]
    Http(ClassifiedError),

    /// A streaming reader was used after `close` or `detach`
    #[error("Stream is closed")]
    StreamClosed,

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a configuration error without a source
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// The classified server diagnostic, for status-mapped errors
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Error::Validation(e)
            | Error::NotAuthorized(e)
            | Error::AccessDenied(e)
            | Error::NotFound(e)
            | Error::Server(e)
            | Error::Http(e) => Some(e),
            _ => None,
        }
    }

    /// HTTP status of the response that caused this error, if any
    pub fn status(&self) -> Option<StatusCode> {
        self.classified().map(|e| e.status)
    }

    /// True for 401 and 403 failures
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::NotAuthorized(_) | Error::AccessDenied(_))
    }

    /// True for failures raised by the transport rather than by the server
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Error::Connectivity { .. } | Error::Timeout { .. } | Error::HttpRequest { .. }
        )
    }
}

impl From<ClassifiedError> for Error {
    fn from(err: ClassifiedError) -> Self {
        match err.kind {
            ApiErrorKind::Validation => Error::Validation(err),
            ApiErrorKind::NotAuthorized => Error::NotAuthorized(err),
            ApiErrorKind::AccessDenied => Error::AccessDenied(err),
            ApiErrorKind::NotFound => Error::NotFound(err),
            ApiErrorKind::Server => Error::Server(err),
            ApiErrorKind::Http => Error::Http(err),
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connectivity { message, source } => Error::Connectivity { message, source },
            TransportError::Timeout { message, source } => Error::Timeout { message, source },
            TransportError::Request { message, source } => Error::HttpRequest { message, source },
        }
    }
}

// Conversion implementations
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Configuration {
            message: format!("Invalid URL: {}", err),
            source: Some(anyhow::Error::new(err)),
        }
    }
}
