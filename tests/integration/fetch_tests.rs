//! Integration tests for the HTTP fetcher
//!
//! A wiremock server stands in for the target site, so these tests cover
//! what the fetcher reports for real responses and real transport failures.

use std::time::Duration;
use sumi_harvest::fetch::{
    build_http_client, Classify, Disposition, Fetch, HttpFetcher, RetryPolicy, StatusClassifier,
    TIMEOUT_STATUS, UNAVAILABLE_STATUS,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(timeout: Duration) -> HttpFetcher {
    let client = build_http_client(None, timeout).expect("Failed to build client");
    HttpFetcher::with_client(client, vec!["TestAgent/1.0".to_string()])
}

#[tokio::test]
async fn test_fetch_success_keeps_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/posts/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Post 1</h1>"))
        .mount(&mock_server)
        .await;

    let url = format!("{}/posts/1", mock_server.uri());
    let result = fetcher(Duration::from_secs(5)).fetch(&url).await;

    assert_eq!(result.url, url);
    assert_eq!(result.status, 200);
    assert!(result.is_success());
    assert_eq!(result.text(), "<h1>Post 1</h1>");
}

#[tokio::test]
async fn test_fetch_not_found_is_extracted_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/posts/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&mock_server)
        .await;

    let url = format!("{}/posts/missing", mock_server.uri());
    let result = fetcher(Duration::from_secs(5)).fetch(&url).await;

    assert_eq!(result.status, 404);
    assert!(result.is_error());

    // 404 is below the default retry threshold
    let classifier = StatusClassifier::default();
    assert_eq!(classifier.classify(&result), Disposition::Extract);
}

#[tokio::test]
async fn test_fetch_server_error_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;

    let url = format!("{}/posts/2", mock_server.uri());
    let result = fetcher(Duration::from_secs(5)).fetch(&url).await;

    assert_eq!(result.status, 502);
    assert_eq!(StatusClassifier::default().classify(&result), Disposition::Retry);

    let only_throttling = StatusClassifier::new(RetryPolicy::Codes([429].into_iter().collect()));
    assert_eq!(only_throttling.classify(&result), Disposition::Extract);
}

#[tokio::test]
async fn test_fetch_timeout_reports_408() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let url = format!("{}/slow", mock_server.uri());
    let result = fetcher(Duration::from_millis(200)).fetch(&url).await;

    assert_eq!(result.status, TIMEOUT_STATUS);
    assert!(result.body.is_none());
    assert_eq!(StatusClassifier::default().classify(&result), Disposition::Retry);
}

#[tokio::test]
async fn test_fetch_connection_refused_reports_503() {
    // Grab a free port, then close it so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{}/posts/1", addr);
    let result = fetcher(Duration::from_secs(2)).fetch(&url).await;

    assert_eq!(result.status, UNAVAILABLE_STATUS);
    assert!(result.body.is_none());
}

#[tokio::test]
async fn test_fetch_sends_configured_user_agent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("user-agent", "TestAgent/1.0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/", mock_server.uri()))
        .await;

    assert_eq!(result.status, 200);
}
