//! Per-status retry and error policies
//!
//! Two independent maps keyed by status code. Retry policies are opt-in; error
//! policies come pre-registered for 400, 401, 403, 404 and 500 when the registry
//! is built with [`HandlerRegistry::with_defaults`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use reqwest::StatusCode;

use crate::http::classifier::{ApiErrorKind, ClassifiedError, ErrorClassifier};
use crate::http::client::RetryContext;
use crate::http::response::Response;
use crate::Result;

/// Replaces the default handling of a failed status
///
/// Receives a [`RetryContext`] that can re-run the request. Returning
/// `Ok(Some(response))` substitutes the response; `Ok(None)` keeps the original.
pub type RetryPolicy = Arc<dyn Fn(&mut RetryContext<'_>) -> Result<Option<Response>> + Send + Sync>;

/// Decides what a failed response becomes; receives the caller's raise flag
pub type ErrorPolicy = Arc<dyn Fn(Response, bool) -> ErrorOutcome + Send + Sync>;

/// Result of an [`ErrorPolicy`]
#[derive(Debug)]
pub enum ErrorOutcome {
    /// Continue with the original response
    Keep(Response),
    /// Continue with a different response
    Replace(Response),
    /// Fail the call
    Fail(ClassifiedError),
}

/// Policy that fails with `kind` when raising is requested
pub fn default_error_policy(kind: ApiErrorKind) -> ErrorPolicy {
    Arc::new(move |response: Response, raise_on_error: bool| {
        if raise_on_error {
            ErrorOutcome::Fail(ErrorClassifier::classify_as(response, kind))
        } else {
            ErrorOutcome::Keep(response)
        }
    })
}

const DEFAULT_ERROR_POLICIES: [(StatusCode, ApiErrorKind); 5] = [
    (StatusCode::BAD_REQUEST, ApiErrorKind::Validation),
    (StatusCode::UNAUTHORIZED, ApiErrorKind::NotAuthorized),
    (StatusCode::FORBIDDEN, ApiErrorKind::AccessDenied),
    (StatusCode::NOT_FOUND, ApiErrorKind::NotFound),
    (StatusCode::INTERNAL_SERVER_ERROR, ApiErrorKind::Server),
];

/// Status-code keyed retry and error policies
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    retry: HashMap<StatusCode, RetryPolicy>,
    error: HashMap<StatusCode, ErrorPolicy>,
}

impl HandlerRegistry {
    /// Registry without any policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the default error policies
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (status, kind) in DEFAULT_ERROR_POLICIES {
            registry.error.insert(status, default_error_policy(kind));
        }
        registry
    }

    /// Register a retry policy, replacing any existing one for `status`
    pub fn register_retry_policy<F>(&mut self, status: StatusCode, policy: F)
    where
        F: Fn(&mut RetryContext<'_>) -> Result<Option<Response>> + Send + Sync + 'static,
    {
        self.retry.insert(status, Arc::new(policy));
    }

    /// Remove the retry policy for `status`; returns whether one was registered
    pub fn unregister_retry_policy(&mut self, status: StatusCode) -> bool {
        self.retry.remove(&status).is_some()
    }

    /// Register an error policy, replacing any existing one for `status`
    pub fn register_error_policy<F>(&mut self, status: StatusCode, policy: F)
    where
        F: Fn(Response, bool) -> ErrorOutcome + Send + Sync + 'static,
    {
        self.error.insert(status, Arc::new(policy));
    }

    /// Remove the error policy for `status`; returns whether one was registered
    pub fn unregister_error_policy(&mut self, status: StatusCode) -> bool {
        self.error.remove(&status).is_some()
    }

    pub fn retry_policy(&self, status: StatusCode) -> Option<RetryPolicy> {
        self.retry.get(&status).cloned()
    }

    pub fn error_policy(&self, status: StatusCode) -> Option<ErrorPolicy> {
        self.error.get(&status).cloned()
    }

    pub fn has_retry_policy(&self, status: StatusCode) -> bool {
        self.retry.contains_key(&status)
    }

    pub fn has_error_policy(&self, status: StatusCode) -> bool {
        self.error.contains_key(&status)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut retry: Vec<u16> = self.retry.keys().map(StatusCode::as_u16).collect();
        let mut error: Vec<u16> = self.error.keys().map(StatusCode::as_u16).collect();
        retry.sort_unstable();
        error.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("retry", &retry)
            .field("error", &error)
            .finish()
    }
}
