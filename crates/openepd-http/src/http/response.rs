//! Response model
//!
//! A [`Response`] owns its body, which is either fully buffered or a live stream
//! backed by the transport connection. Dropping a streaming response releases the
//! connection; reading the body to the end does the same.

use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::http::request::Request;
use crate::Result;

/// Raw body stream handed out by the transport
pub type BodyStream = Box<dyn Read + Send + 'static>;

/// Response body storage
pub enum ResponseBody {
    Buffered(Vec<u8>),
    Streaming(BodyStream),
}

/// HTTP response returned by a [`Transport`](crate::http::Transport)
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: Option<Url>,
    body: ResponseBody,
    request: Option<Arc<Request>>,
}

impl Response {
    /// Response with an in-memory body
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            url: None,
            body: ResponseBody::Buffered(body.into()),
            request: None,
        }
    }

    /// Response whose body is read lazily from `stream`
    pub fn from_stream(status: StatusCode, headers: HeaderMap, stream: impl Read + Send + 'static) -> Self {
        Self {
            status,
            headers,
            url: None,
            body: ResponseBody::Streaming(Box::new(stream)),
            request: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub(crate) fn with_request(mut self, request: Arc<Request>) -> Self {
        if self.url.is_none() {
            self.url = Some(request.url().clone());
        }
        self.request = Some(request);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// True for any status below 400
    pub fn is_ok(&self) -> bool {
        !(self.status.is_client_error() || self.status.is_server_error())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Case-insensitive header lookup; `None` when absent or not visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Declared body length, 0 when absent or unparsable
    pub fn content_length(&self) -> u64 {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Final URL of the response, falling back to the request URL
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// The request that produced this response
    pub fn request(&self) -> Option<&Request> {
        self.request.as_deref()
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self.body, ResponseBody::Buffered(_))
    }

    /// Read a streaming body into memory, releasing the connection
    pub fn buffer(&mut self) -> io::Result<&[u8]> {
        let hint = self.content_length_hint();
        if let ResponseBody::Streaming(stream) = &mut self.body {
            let mut bytes = Vec::with_capacity(hint);
            stream.read_to_end(&mut bytes)?;
            self.body = ResponseBody::Buffered(bytes);
        }
        match &self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(_) => unreachable!("body was buffered above"),
        }
    }

    /// Consume the response and return the whole body
    pub fn bytes(self) -> Result<Vec<u8>> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(mut stream) => {
                let mut bytes = Vec::new();
                stream.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }

    /// Consume the response and decode the body as UTF-8, replacing invalid sequences
    pub fn text(self) -> Result<String> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Consume the response and deserialize the JSON body
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes()?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Consume the response and return its body as a reader
    pub fn into_body(self) -> BodyStream {
        match self.body {
            ResponseBody::Buffered(bytes) => Box::new(Cursor::new(bytes)),
            ResponseBody::Streaming(stream) => stream,
        }
    }

    fn content_length_hint(&self) -> usize {
        // cap the preallocation; the header is server-controlled
        (self.content_length() as usize).min(1 << 20)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.body {
            ResponseBody::Buffered(bytes) => format!("<{} bytes>", bytes.len()),
            ResponseBody::Streaming(_) => "<stream>".to_string(),
        };
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("headers", &self.headers)
            .field("body", &body)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    #[test]
    fn test_ok_follows_status_class() {
        let ok = Response::from_bytes(StatusCode::OK, HeaderMap::new(), "");
        let redirect = Response::from_bytes(StatusCode::FOUND, HeaderMap::new(), "");
        let missing = Response::from_bytes(StatusCode::NOT_FOUND, HeaderMap::new(), "");
        let unavailable = Response::from_bytes(StatusCode::SERVICE_UNAVAILABLE, HeaderMap::new(), "");

        assert!(ok.is_ok());
        assert!(redirect.is_ok());
        assert!(!missing.is_ok());
        assert!(!unavailable.is_ok());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = Response::from_bytes(StatusCode::OK, HeaderMap::new(), "")
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_header(CONTENT_LENGTH, HeaderValue::from_static("42"));

        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.content_length(), 42);
    }

    #[test]
    fn test_content_length_defaults_to_zero() {
        let response = Response::from_bytes(StatusCode::OK, HeaderMap::new(), "abc");
        assert_eq!(response.content_length(), 0);

        let response = response.with_header(CONTENT_LENGTH, HeaderValue::from_static("many"));
        assert_eq!(response.content_length(), 0);
    }

    #[test]
    fn test_buffer_streaming_body() {
        let mut response = Response::from_stream(StatusCode::OK, HeaderMap::new(), Cursor::new(b"hello".to_vec()));
        assert!(!response.is_buffered());

        assert_eq!(response.buffer().unwrap(), b"hello");
        assert!(response.is_buffered());
        assert_eq!(response.text().unwrap(), "hello");
    }

    #[test]
    fn test_json_body() {
        let response = Response::from_bytes(StatusCode::OK, HeaderMap::new(), r#"{"id": "ec3b9j5t"}"#);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], "ec3b9j5t");
    }

    #[test]
    fn test_request_url_backfills_response_url() {
        let url = Url::parse("https://example.com/api/pcrs").unwrap();
        let request = Arc::new(Request::new(Method::GET, url.clone()));
        let response = Response::from_bytes(StatusCode::OK, HeaderMap::new(), "").with_request(request);

        assert_eq!(response.url(), Some(&url));
        assert_eq!(response.request().map(|r| r.method().clone()), Some(Method::GET));
    }
}
