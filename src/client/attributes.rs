//! Request-derived attributes for outbound metrics and spans.
//!
//! Keys follow the OpenTelemetry HTTP semantic conventions.

use opentelemetry::KeyValue;
use reqwest::header::{HeaderMap, HOST};
use reqwest::{Method, Url};

/// URL path component.
pub const URL_PATH: &str = "url.path";
/// Absolute URL of the request.
pub const URL_FULL: &str = "url.full";
/// Target host, with the port when the URL names one.
pub const SERVER_ADDRESS: &str = "server.address";
/// HTTP request method.
pub const HTTP_REQUEST_METHOD: &str = "http.request.method";
/// HTTP response status code.
pub const HTTP_RESPONSE_STATUS_CODE: &str = "http.response.status_code";
/// Class of error an operation ended with.
pub const ERROR_TYPE: &str = "error.type";

/// Borrowed view of an outbound request, shared by the attribute extractor
/// and span-name formatters.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    pub headers: &'a HeaderMap,
}

impl<'a> RequestHead<'a> {
    pub fn new(method: &'a Method, url: &'a Url, headers: &'a HeaderMap) -> Self {
        Self {
            method,
            url,
            headers,
        }
    }

    pub fn from_request(request: &'a reqwest::Request) -> Self {
        Self::new(request.method(), request.url(), request.headers())
    }

    /// Target host as `host[:port]`.
    ///
    /// Falls back to the `Host` header when the URL has no host, and to an
    /// empty string when neither is present.
    pub fn target_host(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => self
                .headers
                .get(HOST)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Extract the metric attributes for one outbound request.
///
/// Always returns exactly three pairs, in order: [`URL_PATH`], [`URL_FULL`],
/// [`SERVER_ADDRESS`].
pub fn metric_attributes(head: &RequestHead<'_>) -> Vec<KeyValue> {
    vec![
        KeyValue::new(URL_PATH, head.url.path().to_string()),
        KeyValue::new(URL_FULL, head.url.as_str().to_string()),
        KeyValue::new(SERVER_ADDRESS, head.target_host()),
    ]
}
