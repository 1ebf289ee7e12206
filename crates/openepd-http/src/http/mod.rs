//! HTTP execution core for the OpenEPD API client
//!
//! This module provides a blocking HTTP client with:
//! - Client-side throttling shared by concurrent callers
//! - Retry of 503 responses and connectivity failures with random backoff
//! - Budget-bounded waiting on 429 responses honouring `Retry-After`
//! - Per-status retry and error policies
//! - Typed errors parsed from OpenEPD error bodies
//! - Streaming access to large response bodies

pub mod auth;
pub mod classifier;
pub mod client;
pub mod clock;
pub mod registry;
pub mod request;
pub mod response;
pub mod retry;
pub mod stream;
pub mod throttle;
pub mod transport;

pub use auth::Credential;
pub use classifier::{ApiErrorKind, ClassifiedError, ErrorClassifier};
pub use client::{HttpClient, HttpClientBuilder, RetryContext, USER_AGENT_DEFAULT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use registry::{default_error_policy, ErrorOutcome, ErrorPolicy, HandlerRegistry, RetryPolicy};
pub use request::{Request, RequestBody, RequestParams};
pub use response::{BodyStream, Response};
pub use retry::{retry_after_delay, ThrottleBudget, UnavailableBackoff};
pub use stream::{ResponseMetadata, StreamingResponseReader};
pub use throttle::{RateThrottler, ThrottlePermit};
pub use transport::{ReqwestTransport, Transport, TransportError};

// Re-export commonly used types
pub use reqwest::header;
pub use reqwest::{Method, StatusCode, Url};
