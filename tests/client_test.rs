//! Integration tests for the instrumented HTTP client.
//!
//! Covers:
//! - Timeout enforcement and timeout-class errors
//! - Span naming, status and propagation against a real upstream
//! - One finished span per call, under concurrency and on failure

mod common;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use beacon::client::{ClientConfig, ClientError};
use beacon::service::health::HEALTH_CHECK_OPERATION;
use common::{closed_addr, sample_value, wait_for, TestTelemetry, Upstream};
use tokio_test::{assert_err, assert_ok};

/// A 2s timeout against a 5s upstream fails after ~2s, not 5s.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_fails_within_budget() {
    let upstream = Upstream::start().await;
    let telemetry = TestTelemetry::new("client-test");
    let config = ClientConfig::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let client = telemetry.client(&config);
    assert_eq!(client.timeout(), Some(Duration::from_secs(2)));

    let start = Instant::now();
    let err = assert_err!(client.get("slow-call", &upstream.url("/delay/5")).await);
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    assert!(elapsed >= Duration::from_millis(1900), "too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "too late: {elapsed:?}");

    let spans = telemetry.finish().await;
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0]["name"], "I_AM_HTTP/GET/slow-call");
    assert_eq!(spans[0]["status"]["code"], "error");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_health_check_span_name_and_attributes() {
    let upstream = Upstream::start().await;
    let telemetry = TestTelemetry::new("client-test");
    let client = telemetry.client(&ClientConfig::default());

    let response = assert_ok!(
        client
            .get(HEALTH_CHECK_OPERATION, &upstream.url("/status/200"))
            .await
    );
    assert_eq!(response.status(), 200);
    drop(response);

    let spans = telemetry.finish().await;
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span["name"], "I_AM_HTTP/GET/health-check");
    assert_eq!(span["kind"], "client");
    assert_eq!(span["status"]["code"], "unset");
    assert_eq!(span["attributes"]["http.request.method"], "GET");
    assert_eq!(span["attributes"]["http.response.status_code"], "200");
    assert_eq!(span["attributes"]["url.full"], upstream.url("/status/200"));
    assert_eq!(
        span["attributes"]["server.address"],
        upstream.addr.to_string()
    );
    assert_eq!(span["resource"]["service.name"], "client-test");
}

/// Non-2xx responses are returned to the caller, with the span marked failed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_error_status_is_not_a_client_error() {
    let upstream = Upstream::start().await;
    let telemetry = TestTelemetry::new("client-test");
    let client = telemetry.client(&ClientConfig::default());

    let response = assert_ok!(client.get("status-check", &upstream.url("/status/503")).await);
    assert_eq!(response.status(), 503);
    drop(response);

    let spans = telemetry.finish().await;
    assert_eq!(spans[0]["status"]["code"], "error");
    assert_eq!(spans[0]["attributes"]["error.type"], "503");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connection_refused_is_transport_error() {
    let addr = closed_addr().await;
    let telemetry = TestTelemetry::new("client-test");
    let client = telemetry.client(&ClientConfig::default());

    let err = assert_err!(client.get("status-check", &format!("http://{addr}/")).await);
    assert!(matches!(err, ClientError::Transport(_)), "{err:?}");

    let spans = telemetry.finish().await;
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0]["status"]["code"], "error");
    assert_eq!(spans[0]["attributes"]["error.type"], "transport");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_url_makes_no_call() {
    let telemetry = TestTelemetry::new("client-test");
    let client = telemetry.client(&ClientConfig::default());

    let err = assert_err!(client.get("status-check", "not a url").await);
    assert!(matches!(err, ClientError::InvalidUrl(_)));

    assert!(telemetry.finish().await.is_empty());
}

/// A body that stalls past the timeout fails the span, not just the read.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_body_timeout_ends_span_with_error() {
    let upstream = Upstream::start().await;
    let telemetry = TestTelemetry::new("client-test");
    let client = telemetry.client(
        &ClientConfig::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .unwrap(),
    );

    let response = assert_ok!(client.get("stalled-body", &upstream.url("/stall/5")).await);
    assert_eq!(response.status(), 200);
    let err = assert_err!(response.text().await);
    assert!(err.is_timeout(), "{err:?}");

    let spans = telemetry.finish().await;
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0]["name"], "I_AM_HTTP/GET/stalled-body");
    assert_eq!(spans[0]["status"]["code"], "error");
    assert_eq!(spans[0]["attributes"]["error.type"], "transport");
    assert_eq!(spans[0]["attributes"]["http.response.status_code"], "200");
    assert!(spans[0]["duration_ms"].as_f64().unwrap() >= 900.0);
}

/// Streaming a body to the end closes the span only then.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_streamed_body_ends_span_at_eof() {
    let upstream = Upstream::start().await;
    let telemetry = TestTelemetry::new("client-test");
    let client = telemetry.client(&ClientConfig::default());

    let mut response = assert_ok!(client.get("stream", &upstream.url("/stall/1")).await);
    let mut body = Vec::new();
    while let Some(chunk) = assert_ok!(response.chunk().await) {
        body.extend_from_slice(&chunk);
    }
    assert_eq!(body, b"partialrest");
    drop(response);

    let spans = telemetry.finish().await;
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0]["status"]["code"], "unset");
    assert!(spans[0]["duration_ms"].as_f64().unwrap() >= 900.0);
}

/// Downstream services receive the client span's context.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trace_context_reaches_upstream() {
    let upstream = Upstream::start().await;
    let telemetry = TestTelemetry::new("client-test");
    let client = telemetry.client(&ClientConfig::default());

    let response = assert_ok!(client.get("propagate", &upstream.url("/traceparent")).await);
    let traceparent = response.text().await.unwrap();

    let spans = telemetry.finish().await;
    let trace_id = spans[0]["trace_id"].as_str().unwrap();
    let span_id = spans[0]["span_id"].as_str().unwrap();
    assert_eq!(traceparent, format!("00-{trace_id}-{span_id}-01"));
}

/// Every call ends exactly one span, whatever its outcome.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_end_every_span() {
    let upstream = Upstream::start().await;
    let telemetry = TestTelemetry::new("client-test");
    let client = telemetry.client(
        &ClientConfig::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap(),
    );

    let paths = ["/status/200", "/status/500", "/delay/2"];
    let calls: Vec<_> = (0..30)
        .map(|i| {
            let client = client.clone();
            let url = upstream.url(paths[i % paths.len()]);
            tokio::spawn(async move { client.get(format!("call-{i}"), &url).await })
        })
        .collect();

    let mut timeouts = 0;
    for call in calls {
        if let Err(err) = call.await.unwrap() {
            assert!(err.is_timeout(), "{err:?}");
            timeouts += 1;
        }
    }
    assert_eq!(timeouts, 10);

    let spans = telemetry.finish().await;
    assert_eq!(spans.len(), 30);
    let names: HashSet<_> = spans.iter().map(|s| s["name"].as_str().unwrap()).collect();
    let ids: HashSet<_> = spans.iter().map(|s| s["span_id"].as_str().unwrap()).collect();
    assert_eq!(names.len(), 30);
    assert_eq!(ids.len(), 30);
}

/// An aborted caller still gets its span closed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aborted_call_ends_span() {
    let upstream = Upstream::start().await;
    let telemetry = TestTelemetry::new("client-test");
    let client = telemetry.client(&ClientConfig::default());

    let url = upstream.url("/delay/5");
    let task = tokio::spawn(async move { client.get("abandoned", &url).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    let metrics = telemetry.telemetry.metrics.clone();
    assert!(
        wait_for(Duration::from_secs(1), || {
            let text = metrics.encode().unwrap();
            sample_value(&text, "http_client_active_requests") == Some(0.0)
        })
        .await,
        "in-flight gauge did not return to zero"
    );

    let spans = telemetry.finish().await;
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0]["name"], "I_AM_HTTP/GET/abandoned");
    assert_eq!(spans[0]["status"]["description"], "request cancelled");
}
