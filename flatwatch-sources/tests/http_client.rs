use std::time::Duration;

use httpmock::prelude::*;

use flatwatch_sources::{HttpClient, HttpClientConfig};

fn fast_client() -> HttpClient {
    HttpClient::with_config(HttpClientConfig {
        json_timeout: Duration::from_secs(2),
        html_timeout: Duration::from_secs(2),
        max_attempts: 3,
        backoff_base: Duration::from_millis(10),
        per_host_concurrency: 4,
        per_host_spacing: Duration::from_millis(1),
    })
}

#[tokio::test]
async fn json_success_returns_payload() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/api");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"ads": []}"#);
        })
        .await;

    let client = fast_client();
    let body = client.fetch_json(&server.url("/api"), "test").await;
    assert!(body.is_some());
    assert!(body.unwrap().get("ads").is_some());
    mock.assert_async().await;
}

#[tokio::test]
async fn server_errors_are_retried_then_given_up() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503);
        })
        .await;

    let client = fast_client();
    let body = client.fetch_json(&server.url("/flaky"), "test").await;
    assert!(body.is_none());
    assert_eq!(mock.hits_async().await, 3);
}

#[tokio::test]
async fn client_errors_are_permanent() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/gone");
            then.status(404);
        })
        .await;

    let client = fast_client();
    assert!(client.fetch_html(&server.url("/gone"), "test").await.is_none());
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn json_decode_failure_counts_as_transient() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/html-instead");
            then.status(200).body("<html>not json</html>");
        })
        .await;

    let client = fast_client();
    assert!(client.fetch_json(&server.url("/html-instead"), "test").await.is_none());
    assert_eq!(mock.hits_async().await, 3);
}

#[tokio::test]
async fn retry_after_hint_is_honoured() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/limited");
            then.status(429).header("retry-after", "1");
        })
        .await;

    let client = HttpClient::with_config(HttpClientConfig {
        max_attempts: 2,
        backoff_base: Duration::from_millis(10),
        per_host_spacing: Duration::from_millis(1),
        ..HttpClientConfig::default()
    });

    let started = std::time::Instant::now();
    let body = client.fetch_json(&server.url("/limited"), "test").await;
    assert!(body.is_none());
    // Two attempts with one enforced 1s wait in between.
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn html_fetch_returns_body_text() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/page");
            then.status(200).body("<html><body>ok</body></html>");
        })
        .await;

    let client = fast_client();
    let html = client.fetch_html(&server.url("/page"), "test").await;
    assert!(html.unwrap().contains("ok"));
}
