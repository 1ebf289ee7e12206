//! Request executor
//!
//! [`HttpClient::execute`] runs one logical request through the whole pipeline:
//!
//! 1. build the request (URL, merged headers, credential, timeout)
//! 2. retry 503 responses and connectivity/timeout failures with a random backoff
//! 3. acquire a throttle slot for every physical send
//! 4. wait out 429 responses within the call's `Retry-After` budget
//! 5. apply the registered retry and error policies to a failed response
//!
//! The 429 loop runs inside each unavailable-retry attempt. A 429 that exhausts the
//! budget is returned into post-processing; it never consumes an unavailable attempt.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, StatusCode, Url};

use crate::config::ClientConfig;
use crate::http::auth::Credential;
use crate::http::classifier::{ApiErrorKind, ErrorClassifier};
use crate::http::clock::{Clock, SystemClock};
use crate::http::registry::{ErrorOutcome, HandlerRegistry};
use crate::http::request::{Request, RequestBody, RequestParams};
use crate::http::response::Response;
use crate::http::retry::{retry_after_delay, ThrottleBudget, UnavailableBackoff};
use crate::http::stream::StreamingResponseReader;
use crate::http::throttle::RateThrottler;
use crate::http::transport::{ReqwestTransport, Transport, TransportError};
use crate::{Error, Result};

/// User agent sent when none is configured
pub const USER_AGENT_DEFAULT: &str = concat!("OpenEPD API Client/", env!("CARGO_PKG_VERSION"));

/// Synchronous OpenEPD HTTP client
///
/// Cheap to share across threads by reference; `execute` takes `&self`. Policy
/// registration takes `&mut self`.
pub struct HttpClient {
    base_url: String,
    config: ClientConfig,
    default_headers: HeaderMap,
    throttler: Arc<RateThrottler>,
    session: Arc<dyn Transport>,
    registry: HandlerRegistry,
    clock: Arc<dyn Clock>,
}

impl HttpClient {
    /// Create a client with the reqwest transport and the default error policies
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> HttpClientBuilder {
        HttpClientBuilder::new(config)
    }

    /// Execute a request and return the final response
    ///
    /// Failed responses become typed errors unless `params.raise_on_error` is false.
    pub fn execute(&self, method: Method, target: &str, params: RequestParams) -> Result<Response> {
        let RequestParams {
            query,
            body,
            headers,
            session,
            credential,
            timeout,
            raise_on_error,
        } = params;

        let request = self.build_request(method, target, &query, body, headers, credential.as_ref(), timeout)?;
        let mut call = CallState {
            request: Arc::new(request),
            transport: session.unwrap_or_else(|| self.session.clone()),
            throttler: self.throttler.clone(),
            clock: self.clock.clone(),
            budget: ThrottleBudget::new(self.config.throttle_retry_timeout),
            retry_count: self.config.retry_count,
            backoff: self.config.unavailable_backoff,
            default_retry_after: self.config.default_retry_after,
            sends: 0,
        };

        let response = call.send_with_unavailable_retry()?;
        self.post_process(&mut call, response, raise_on_error)
    }

    /// Execute and return the whole body
    pub fn read_bytes_from_url(&self, method: Method, url: &str, params: RequestParams) -> Result<Vec<u8>> {
        self.execute(method, url, params)?.bytes()
    }

    /// Execute and stream the body into `sink`, returning the bytes written
    pub fn read_url_write_to_stream<W: Write + ?Sized>(
        &self,
        method: Method,
        url: &str,
        sink: &mut W,
        params: RequestParams,
    ) -> Result<u64> {
        let mut reader = self.read_stream_from_url(method, url, params)?;
        let written = reader.copy_into(sink)?;
        reader.close()?;
        Ok(written)
    }

    /// Execute and hand the body over as a stream; the caller must close it
    pub fn read_stream_from_url(
        &self,
        method: Method,
        url: &str,
        params: RequestParams,
    ) -> Result<StreamingResponseReader> {
        Ok(StreamingResponseReader::new(self.execute(method, url, params)?))
    }

    /// Base URL without trailing slashes
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(&mut self, base_url: &str) -> Result<()> {
        let base_url = no_trailing_slash(base_url);
        Url::parse(base_url)?;
        self.base_url = base_url.to_string();
        self.config.base_url = self.base_url.clone();
        Ok(())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Headers sent with every request unless overridden per call
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub fn throttler(&self) -> &Arc<RateThrottler> {
        &self.throttler
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn register_retry_policy<F>(&mut self, status: StatusCode, policy: F)
    where
        F: Fn(&mut RetryContext<'_>) -> Result<Option<Response>> + Send + Sync + 'static,
    {
        self.registry.register_retry_policy(status, policy);
    }

    pub fn unregister_retry_policy(&mut self, status: StatusCode) -> bool {
        self.registry.unregister_retry_policy(status)
    }

    pub fn register_error_policy<F>(&mut self, status: StatusCode, policy: F)
    where
        F: Fn(Response, bool) -> ErrorOutcome + Send + Sync + 'static,
    {
        self.registry.register_error_policy(status, policy);
    }

    pub fn unregister_error_policy(&mut self, status: StatusCode) -> bool {
        self.registry.unregister_error_policy(status)
    }

    /// Drop cookies and pooled connections of the default session
    pub fn reset_session(&self) {
        self.session.reset();
    }

    #[allow(clippy::too_many_arguments)]
    fn build_request(
        &self,
        method: Method,
        target: &str,
        query: &[(String, String)],
        body: Option<RequestBody>,
        headers: HeaderMap,
        credential: Option<&Credential>,
        timeout: Option<Duration>,
    ) -> Result<Request> {
        let mut url = self.url_for(target)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut merged = self.default_headers.clone();
        merged.extend(headers);
        if let Some(credential) = credential.or(self.config.credential.as_ref()) {
            credential.apply(&mut merged)?;
        }

        Ok(Request::new(method, url)
            .with_headers(merged)
            .with_body(body)
            .with_timeout(timeout.or(self.config.timeout)))
    }

    fn url_for(&self, target: &str) -> Result<Url> {
        let url = if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else if target.is_empty() || target.starts_with('/') {
            format!("{}{}", self.base_url, target)
        } else {
            format!("{}/{}", self.base_url, target)
        };
        Ok(Url::parse(&url)?)
    }

    fn post_process(&self, call: &mut CallState, mut response: Response, raise_on_error: bool) -> Result<Response> {
        if response.is_ok() {
            return Ok(response);
        }

        let failed_status = response.status();
        if let Some(policy) = self.registry.retry_policy(failed_status) {
            tracing::debug!(status = failed_status.as_u16(), "Applying retry policy");
            let mut ctx = RetryContext { call, failed_status };
            if let Some(substitute) = policy(&mut ctx)? {
                response = substitute;
            }
        }

        if let Some(policy) = self.registry.error_policy(response.status()) {
            tracing::debug!(status = response.status().as_u16(), "Applying error policy");
            response = match policy(response, raise_on_error) {
                ErrorOutcome::Keep(response) | ErrorOutcome::Replace(response) => response,
                ErrorOutcome::Fail(error) => return Err(error.into()),
            };
        }

        if response.is_ok() || !raise_on_error {
            return Ok(response);
        }
        Err(ErrorClassifier::classify_as(response, ApiErrorKind::Http).into())
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .field("throttler", &self.throttler)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Builder for [`HttpClient`] with replaceable collaborators
pub struct HttpClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    throttler: Option<Arc<RateThrottler>>,
    registry: Option<HandlerRegistry>,
}

impl HttpClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            clock: None,
            throttler: None,
            registry: None,
        }
    }

    /// Default session; [`ReqwestTransport`] when unset
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Clock for every wait; [`SystemClock`] when unset
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share a throttler with other clients; `requests_per_sec` is then ignored
    pub fn throttler(mut self, throttler: Arc<RateThrottler>) -> Self {
        self.throttler = Some(throttler);
        self
    }

    /// Start from `registry` instead of the default error policies
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        let mut config = self.config;
        config.validate().map_err(Error::configuration)?;

        let base_url = no_trailing_slash(&config.base_url).to_string();
        Url::parse(&base_url)?;
        config.base_url = base_url.clone();

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let throttler = match self.throttler {
            Some(throttler) => throttler,
            None => Arc::new(RateThrottler::with_clock(config.requests_per_sec, clock.clone())?),
        };
        let session = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        Ok(HttpClient {
            base_url,
            default_headers: default_headers(&config)?,
            throttler,
            session,
            registry: self.registry.unwrap_or_else(HandlerRegistry::with_defaults),
            clock,
            config,
        })
    }
}

fn default_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let user_agent = config.user_agent.as_deref().unwrap_or(USER_AGENT_DEFAULT);
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|e| Error::configuration(format!("Invalid user agent '{}': {}", user_agent, e)))?,
    );

    for (name, value) in &config.default_headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::configuration(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::configuration(format!("Invalid value for header '{}': {}", name, e)))?;
        headers.insert(header, value);
    }
    Ok(headers)
}

/// Strip every trailing `/`
pub fn no_trailing_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// State of one `execute` call, shared by all of its attempts
struct CallState {
    request: Arc<Request>,
    transport: Arc<dyn Transport>,
    throttler: Arc<RateThrottler>,
    clock: Arc<dyn Clock>,
    budget: ThrottleBudget,
    retry_count: u32,
    backoff: UnavailableBackoff,
    default_retry_after: Duration,
    sends: u32,
}

impl CallState {
    /// Retry 503 responses and retryable transport failures
    fn send_with_unavailable_retry(&mut self) -> Result<Response> {
        let mut attempts_left = self.retry_count;
        loop {
            let outcome = self.send_throttled();
            let unavailable = match &outcome {
                Ok(response) => response.status() == StatusCode::SERVICE_UNAVAILABLE,
                Err(e) => e.is_retryable(),
            };

            attempts_left = attempts_left.saturating_sub(1);
            if !unavailable || attempts_left == 0 {
                return outcome.map_err(Error::from);
            }

            let delay = self.backoff.next_delay(&mut rand::thread_rng());
            log::warn!(
                "{} {} is unavailable. Attempts left: {}. Waiting {} seconds...",
                self.request.method(),
                self.request.url(),
                attempts_left,
                delay.as_secs()
            );
            // release the connection before waiting
            drop(outcome);
            self.clock.sleep(delay);
        }
    }

    /// Send under the throttler, waiting out 429 responses within the budget
    fn send_throttled(&mut self) -> std::result::Result<Response, TransportError> {
        loop {
            let response = {
                let _permit = self.throttler.acquire();
                self.sends += 1;
                tracing::debug!(
                    method = %self.request.method(),
                    url = %self.request.url(),
                    send = self.sends,
                    "Sending request"
                );
                self.transport.send(&self.request)?
            };
            let response = response.with_request(self.request.clone());
            tracing::debug!(status = response.status().as_u16(), "Received response");

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
            let wait = retry_after_delay(retry_after.as_deref(), self.clock.utc_now(), self.default_retry_after);
            if !self.budget.allows(wait) {
                return Ok(response);
            }

            log::info!(
                "`{} {}` has been throttled for {} second(s)",
                self.request.method(),
                self.request.url(),
                wait.as_secs_f64()
            );
            self.clock.sleep(wait);
            self.budget.consume(wait);
            if self.budget.is_exhausted() {
                return Ok(response);
            }
        }
    }
}

/// Handle given to a [`RetryPolicy`](crate::http::RetryPolicy)
///
/// Exposes the failed call and lets the policy re-run it. Re-runs go through the
/// throttler, the unavailable retry and the same 429 budget as the original attempt.
pub struct RetryContext<'a> {
    call: &'a mut CallState,
    failed_status: StatusCode,
}

impl RetryContext<'_> {
    pub fn method(&self) -> &Method {
        self.call.request.method()
    }

    pub fn url(&self) -> &Url {
        self.call.request.url()
    }

    pub fn request(&self) -> &Request {
        &self.call.request
    }

    /// Status that triggered the policy
    pub fn failed_status(&self) -> StatusCode {
        self.failed_status
    }

    /// Physical sends made by this call so far
    pub fn sends(&self) -> u32 {
        self.call.sends
    }

    /// What is left of the call's 429 wait budget
    pub fn remaining_budget(&self) -> Duration {
        self.call.budget.remaining()
    }

    /// Send the request again
    pub fn retry(&mut self) -> Result<Response> {
        self.call.send_with_unavailable_retry()
    }

    /// Wait through the client clock
    pub fn sleep(&self, duration: Duration) {
        self.call.clock.sleep(duration);
    }
}

impl fmt::Debug for RetryContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryContext")
            .field("method", self.method())
            .field("url", &self.url().as_str())
            .field("failed_status", &self.failed_status)
            .field("sends", &self.call.sends)
            .finish()
    }
}
