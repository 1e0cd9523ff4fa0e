//! Integration tests for the HTTP fetcher: status classification and probes.

use std::time::Duration;

use assert_matches::assert_matches;
use reelfetch::config::HttpConfig;
use reelfetch::fetch::{FetchRequest, Fetcher, HttpFetcher, ProbeOutcome};
use reelfetch::Error;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROBE_PATH: &str = "w185/test.jpg";

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(&HttpConfig::default(), PROBE_PATH).unwrap()
}

async fn server_returning(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn success_returns_body_and_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/t/p/w500/abc.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(b"abc".to_vec()),
        )
        .mount(&server)
        .await;

    let endpoint = format!("{}/t/p/", server.uri());
    let resp = fetcher()
        .fetch(&endpoint, &FetchRequest::get("w500/abc.jpg"))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.endpoint, endpoint);
    assert_eq!(resp.url, format!("{}/t/p/w500/abc.jpg", server.uri()));
    assert_eq!(resp.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(&resp.body[..], b"abc");
}

#[tokio::test]
async fn client_errors_are_permanent() {
    for status in [400u16, 401, 403, 404] {
        let server = server_returning(status).await;
        let result = fetcher()
            .fetch(&server.uri(), &FetchRequest::get("x"))
            .await;
        assert_matches!(
            result,
            Err(Error::Permanent { status: Some(s), .. }) if s == status
        );
    }
}

#[tokio::test]
async fn throttling_and_server_errors_are_transient() {
    for status in [408u16, 429, 500, 502, 503] {
        let server = server_returning(status).await;
        let err = fetcher()
            .fetch(&server.uri(), &FetchRequest::get("x"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Transient { .. });
        assert!(err.is_retryable());
    }
}

#[tokio::test]
async fn connection_refused_is_transient() {
    let result = fetcher()
        .fetch("http://127.0.0.1:1/", &FetchRequest::get("x"))
        .await;
    assert_matches!(result, Err(Error::Transient { .. }));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let config = HttpConfig {
        timeout_secs: 1,
        ..Default::default()
    };
    let fetcher = HttpFetcher::new(&config, PROBE_PATH).unwrap();
    let result = fetcher.fetch(&server.uri(), &FetchRequest::get("x")).await;
    assert_matches!(result, Err(Error::Timeout { .. }));
}

#[tokio::test]
async fn probe_treats_not_found_as_reachable() {
    // No mocks mounted: every request is answered with 404.
    let server = MockServer::start().await;
    let outcome = fetcher()
        .probe(&server.uri(), Duration::from_secs(2))
        .await;
    assert_matches!(outcome, ProbeOutcome::Reachable { status: 404, .. });
}

#[tokio::test]
async fn probe_hits_probe_path_with_head() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/t/p/w185/test.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = format!("{}/t/p/", server.uri());
    let outcome = fetcher().probe(&endpoint, Duration::from_secs(2)).await;
    assert_matches!(outcome, ProbeOutcome::Reachable { status: 200, .. });
}

#[tokio::test]
async fn probe_server_error_is_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let outcome = fetcher()
        .probe(&server.uri(), Duration::from_secs(2))
        .await;
    assert!(!outcome.is_reachable());

    let refused = fetcher()
        .probe("http://127.0.0.1:1/", Duration::from_secs(2))
        .await;
    assert!(!refused.is_reachable());
}
