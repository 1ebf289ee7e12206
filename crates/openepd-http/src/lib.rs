//! OpenEPD HTTP - execution core of the OpenEPD API client
//!
//! Every API call goes through [`HttpClient::execute`], which throttles outbound
//! requests, retries unavailable responses, waits out `429 Too Many Requests`
//! within a per-call budget and turns failed responses into typed errors.
//!
//! # Main Components
//!
//! - **Error Handling**: [`Error`] taxonomy using `thiserror` and `anyhow`
//! - **Configuration**: [`ClientConfig`], from code, serde or the environment
//! - **Executor**: [`HttpClient`] with its retry and error policy registry
//! - **Streaming**: [`StreamingResponseReader`] for large downloads
//!
//! # Example
//!
//! ```no_run
//! use openepd_http::{ClientConfig, Credential, HttpClient, Method, RequestParams, Result};
//!
//! fn example() -> Result<()> {
//!     let config = ClientConfig::new("https://openepd.buildingtransparency.org/api")
//!         .with_credential(Credential::bearer("token"));
//!     let client = HttpClient::new(config)?;
//!
//!     let epd: serde_json::Value = client
//!         .execute(Method::GET, "/epds/ec3b9j5t", RequestParams::new())?
//!         .json()?;
//!     println!("{}", epd["name"]);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;

// Re-export main types for convenience
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use http::{
    // Executor
    HttpClient, HttpClientBuilder, RetryContext,

    // Policies
    ErrorOutcome, HandlerRegistry,

    // Request and response model
    Credential, Request, RequestBody, RequestParams, Response,

    // Errors and streaming
    ApiErrorKind, ClassifiedError, StreamingResponseReader,

    // Wire vocabulary
    Method, StatusCode, Url,
};
pub use http::header;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
