//! End-to-end tests of the reqwest transport against a local mock server
//!
//! Covers:
//! - Header merging, credentials and query parameters on the wire
//! - JSON request bodies
//! - Typed errors parsed from real error responses
//! - 429 and 503 handling with a virtual clock
//! - Streaming large bodies


use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server};
use openepd_http::http::{ManualClock, ReqwestTransport, UnavailableBackoff};
use openepd_http::{ClientConfig, Credential, Error, HttpClient, Method, RequestParams, StatusCode};
use serde_json::json;

/// Client bypassing system proxies, waiting on a virtual clock
fn client(config: ClientConfig) -> (HttpClient, Arc<ManualClock>) {
    let transport = ReqwestTransport::with_builder(|| reqwest::blocking::Client::builder().no_proxy()).unwrap();
    let clock = Arc::new(ManualClock::starting_at(test_support::epoch()));
    let client = HttpClient::builder(config)
        .transport(Arc::new(transport))
        .clock(clock.clone())
        .build()
        .unwrap();
    (client, clock)
}

#[test]
fn test_get_with_credentials_and_query() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/api/epds")
        .match_header("authorization", "Bearer test-token")
        .match_header("user-agent", openepd_http::http::USER_AGENT_DEFAULT)
        .match_header("accept", "application/json")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page_size".into(), "10".into()),
            Matcher::UrlEncoded("q".into(), "concrete mix".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"payload": [{"id": "ec3b9j5t"}]}"#)
        .create();

    let config = ClientConfig::new(format!("{}/api/", server.url()))
        .with_credential(Credential::bearer("test-token"))
        .with_default_header("Accept", "application/json");
    let (client, _) = client(config);

    let body: serde_json::Value = client
        .execute(
            Method::GET,
            "/epds",
            RequestParams::new().query("page_size", "10").query("q", "concrete mix"),
        )
        .unwrap()
        .json()
        .unwrap();

    assert_eq!(body["payload"][0]["id"], "ec3b9j5t");
    mock.assert();
}

#[test]
fn test_post_json_body() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/api/epds")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"name": "Ready Mix", "declared_unit": "1 m3"})))
        .with_status(201)
        .with_body("{}")
        .create();

    let (client, _) = client(ClientConfig::new(format!("{}/api", server.url())));
    let response = client
        .execute(
            Method::POST,
            "/epds",
            RequestParams::new().json(json!({"name": "Ready Mix", "declared_unit": "1 m3"})),
        )
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    mock.assert();
}

#[test]
fn test_validation_error_from_server() {
    let mut server = Server::new();
    server
        .mock("POST", "/api/epds")
        .with_status(400)
        .with_header("content-type", "application/json; charset=utf-8")
        .with_body(r#"{"detail":"bad field","validation_errors":{"code":"E1","name":["required"]}}"#)
        .create();

    let (client, _) = client(ClientConfig::new(format!("{}/api", server.url())));
    let err = client
        .execute(Method::POST, "/epds", RequestParams::new().json(json!({})))
        .unwrap_err();

    let classified = err.classified().expect("classified error");
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(classified.summary, "[E1] bad field");
    assert_eq!(classified.field_error("name"), Some(&["required".to_string()][..]));
}

#[test]
fn test_429_budget_against_server() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/api/epds")
        .with_status(429)
        .with_header("retry-after", "2")
        .expect(2)
        .create();

    let config = ClientConfig::new(format!("{}/api", server.url()))
        .with_throttle_retry_timeout(Duration::from_secs(3));
    let (client, clock) = client(config);

    let response = client
        .execute(Method::GET, "/epds", RequestParams::new().raise_on_error(false))
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
    mock.assert();
}

#[test]
fn test_503_retries_against_server() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/api/epds")
        .with_status(503)
        .expect(2)
        .create();

    let config = ClientConfig::new(format!("{}/api", server.url()))
        .with_retry_count(2)
        .with_unavailable_backoff(UnavailableBackoff::fixed(Duration::from_secs(60)));
    let (client, clock) = client(config);

    let err = client
        .execute(Method::GET, "/epds", RequestParams::new())
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(60)]);
    mock.assert();
}

#[test]
fn test_stream_large_body() {
    let body = vec![b'x'; 256 * 1024];
    let mut server = Server::new();
    server
        .mock("GET", "/files/epd.pdf")
        .with_status(200)
        .with_header("content-type", "application/pdf")
        .with_body(&body)
        .create();

    let (client, _) = client(ClientConfig::new(format!("{}/api", server.url())));
    let mut sink = Vec::new();
    let written = client
        .read_url_write_to_stream(
            Method::GET,
            &format!("{}/files/epd.pdf", server.url()),
            &mut sink,
            RequestParams::new(),
        )
        .unwrap();

    assert_eq!(written, body.len() as u64);
    assert_eq!(sink, body);
}

#[test]
fn test_reset_session_keeps_client_usable() {
    let mut server = Server::new();
    let mock = server.mock("GET", "/api/pcrs").with_status(200).expect(2).create();

    let (client, _) = client(ClientConfig::new(format!("{}/api", server.url())));
    client.execute(Method::GET, "/pcrs", RequestParams::new()).unwrap();
    client.reset_session();
    client.execute(Method::GET, "/pcrs", RequestParams::new()).unwrap();

    mock.assert();
}
