//! Instrumented HTTP transport.
//!
//! [`InstrumentedTransport`] decorates any `tower::Service` that performs
//! `reqwest` round trips. For every call it:
//!
//! - starts one client span, named by a pluggable [`SpanNameFormatter`],
//!   as a child of the caller's current context
//! - runs a [`ContextInjector`] so downstream services can join the trace
//! - records `http.client.active_requests` and `http.client.request.duration`
//!   tagged with [`metric_attributes`]
//!
//! Errors from the inner service are returned unchanged. A successful call
//! yields an [`InstrumentedResponse`] that keeps the span open until the body
//! is finished. The span is ended exactly once: at end of body, on a transport
//! or body error, when the response is dropped, or when the call future is
//! dropped before the response head arrives.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::future::BoxFuture;
use opentelemetry::metrics::{Histogram, Meter, UpDownCounter};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::Tracer;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use tower::{Layer, Service};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::observability::propagation::inject_trace_context;

use super::attributes::{
    metric_attributes, RequestHead, ERROR_TYPE, HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE,
    SERVER_ADDRESS, URL_FULL,
};

/// Fixed protocol tag leading every default span name.
pub const PROTOCOL_TAG: &str = "I_AM_HTTP";

/// Builds a span name from the caller's operation name and the request.
pub type SpanNameFormatter = Arc<dyn Fn(&str, &RequestHead<'_>) -> String + Send + Sync>;

/// Attaches a span context to outbound request headers.
pub type ContextInjector = Arc<dyn Fn(&Context, &mut HeaderMap) + Send + Sync>;

/// Default span naming: `I_AM_HTTP/<METHOD>/<OPERATION>`.
pub fn default_span_name(operation: &str, head: &RequestHead<'_>) -> String {
    format!("{PROTOCOL_TAG}/{}/{operation}", head.method)
}

pub fn default_span_name_formatter() -> SpanNameFormatter {
    Arc::new(default_span_name)
}

/// W3C trace-context injection (`traceparent` / `tracestate`).
pub fn trace_context_injector() -> ContextInjector {
    Arc::new(|cx: &Context, headers: &mut HeaderMap| inject_trace_context(cx, headers))
}

/// An outbound request tagged with the logical operation it performs.
#[derive(Debug)]
pub struct OutboundRequest {
    pub operation: Option<Cow<'static, str>>,
    pub request: reqwest::Request,
}

impl OutboundRequest {
    pub fn new(operation: impl Into<Cow<'static, str>>, request: reqwest::Request) -> Self {
        Self {
            operation: Some(operation.into()),
            request,
        }
    }

    /// Requests without an operation name are named after their URL path.
    pub fn anonymous(request: reqwest::Request) -> Self {
        Self {
            operation: None,
            request,
        }
    }
}

/// Metric instruments shared by every call through one transport.
#[derive(Debug)]
pub struct ClientInstruments {
    active_requests: UpDownCounter<i64>,
    request_duration: Histogram<f64>,
}

impl ClientInstruments {
    pub fn new(meter: &Meter) -> Self {
        Self {
            active_requests: meter
                .i64_up_down_counter("http.client.active_requests")
                .with_description("Number of outbound HTTP requests in flight")
                .build(),
            request_duration: meter
                .f64_histogram("http.client.request.duration")
                .with_description("Duration of outbound HTTP requests")
                .with_unit("s")
                .build(),
        }
    }
}

/// `tower::Layer` producing [`InstrumentedTransport`]s.
#[derive(Clone)]
pub struct InstrumentationLayer {
    tracer: Tracer,
    instruments: Arc<ClientInstruments>,
    span_name: SpanNameFormatter,
    injector: ContextInjector,
}

impl InstrumentationLayer {
    pub fn new(tracer: Tracer, meter: &Meter) -> Self {
        Self {
            tracer,
            instruments: Arc::new(ClientInstruments::new(meter)),
            span_name: default_span_name_formatter(),
            injector: trace_context_injector(),
        }
    }

    pub fn with_span_name_formatter(mut self, formatter: SpanNameFormatter) -> Self {
        self.span_name = formatter;
        self
    }

    pub fn with_context_injector(mut self, injector: ContextInjector) -> Self {
        self.injector = injector;
        self
    }
}

impl fmt::Debug for InstrumentationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentationLayer")
            .field("instruments", &self.instruments)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for InstrumentationLayer {
    type Service = InstrumentedTransport<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InstrumentedTransport {
            inner,
            layer: self.clone(),
        }
    }
}

/// Tracing and metrics decorator around a pooled HTTP transport.
#[derive(Clone)]
pub struct InstrumentedTransport<S> {
    inner: S,
    layer: InstrumentationLayer,
}

impl<S: fmt::Debug> fmt::Debug for InstrumentedTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedTransport")
            .field("inner", &self.inner)
            .field("layer", &self.layer)
            .finish()
    }
}

impl<S> Service<OutboundRequest> for InstrumentedTransport<S>
where
    S: Service<reqwest::Request, Response = reqwest::Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
{
    type Response = InstrumentedResponse;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, outbound: OutboundRequest) -> Self::Future {
        // Keep the service that was driven to readiness for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let OutboundRequest {
            operation,
            mut request,
        } = outbound;

        let (span_name, span_attributes, attributes) = {
            let head = RequestHead::from_request(&request);
            let operation = operation.unwrap_or_else(|| Cow::Owned(head.url.path().to_string()));
            let method = KeyValue::new(HTTP_REQUEST_METHOD, head.method.to_string());

            let mut attributes = metric_attributes(&head);
            attributes.push(method.clone());

            let span_attributes = vec![
                method,
                KeyValue::new(URL_FULL, head.url.as_str().to_string()),
                KeyValue::new(SERVER_ADDRESS, head.target_host()),
            ];
            (
                (self.layer.span_name)(operation.as_ref(), &head),
                span_attributes,
                attributes,
            )
        };

        let parent = tracing::Span::current().context();
        let span = self
            .layer
            .tracer
            .span_builder(span_name)
            .with_kind(SpanKind::Client)
            .with_attributes(span_attributes)
            .start_with_context(&self.layer.tracer, &parent);
        let cx = parent.with_span(span);

        (self.layer.injector)(&cx, request.headers_mut());

        let mut call = CallGuard::start(cx, attributes, Arc::clone(&self.layer.instruments));

        Box::pin(async move {
            match inner.call(request).await {
                Ok(response) => {
                    call.record_head(response.status());
                    Ok(InstrumentedResponse {
                        inner: response,
                        call,
                    })
                }
                Err(err) => {
                    call.finish(Outcome::Error(err.to_string()));
                    Err(err)
                }
            }
        })
    }
}

/// A response whose client span stays open until the body is finished.
///
/// Reading to the end (or dropping the response) ends the span with the
/// response status; a failed body read ends it as an error.
pub struct InstrumentedResponse {
    inner: reqwest::Response,
    call: CallGuard,
}

impl InstrumentedResponse {
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn url(&self) -> &Url {
        self.inner.url()
    }

    /// Next chunk of the body; `None` at end of body.
    pub async fn chunk(&mut self) -> reqwest::Result<Option<Bytes>> {
        let result = self.inner.chunk().await;
        match &result {
            Ok(Some(_)) => {}
            Ok(None) => self.call.finish(Outcome::Completed),
            Err(err) => self.call.finish(Outcome::Error(err.to_string())),
        }
        result
    }

    pub async fn bytes(self) -> reqwest::Result<Bytes> {
        let Self { inner, mut call } = self;
        let result = inner.bytes().await;
        call.finish_body(&result);
        result
    }

    pub async fn text(self) -> reqwest::Result<String> {
        let Self { inner, mut call } = self;
        let result = inner.text().await;
        call.finish_body(&result);
        result
    }
}

impl fmt::Debug for InstrumentedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedResponse")
            .field("status", &self.inner.status())
            .field("url", &self.inner.url().as_str())
            .finish_non_exhaustive()
    }
}

enum Outcome {
    Completed,
    Error(String),
    Cancelled,
}

/// Owns the span and in-flight accounting of one call.
///
/// Dropping an unfinished guard before the response head arrived records the
/// call as cancelled; after that, as completed with the response status.
struct CallGuard {
    cx: Context,
    attributes: Vec<KeyValue>,
    status_code: Option<KeyValue>,
    instruments: Arc<ClientInstruments>,
    started: Instant,
    finished: bool,
}

impl CallGuard {
    fn start(cx: Context, attributes: Vec<KeyValue>, instruments: Arc<ClientInstruments>) -> Self {
        instruments.active_requests.add(1, &attributes);
        Self {
            cx,
            attributes,
            status_code: None,
            instruments,
            started: Instant::now(),
            finished: false,
        }
    }

    fn record_head(&mut self, status: StatusCode) {
        let span = self.cx.span();
        let code = KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(status.as_u16()));
        span.set_attribute(code.clone());
        if status.is_client_error() || status.is_server_error() {
            span.set_attribute(KeyValue::new(ERROR_TYPE, status.as_u16().to_string()));
            span.set_status(Status::error(""));
        }
        self.status_code = Some(code);
    }

    fn finish_body<T>(&mut self, result: &reqwest::Result<T>) {
        match result {
            Ok(_) => self.finish(Outcome::Completed),
            Err(err) => self.finish(Outcome::Error(err.to_string())),
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        if self.finished {
            return;
        }
        self.finished = true;

        let elapsed = self.started.elapsed().as_secs_f64();
        let span = self.cx.span();
        let mut duration_attributes = self.attributes.clone();
        duration_attributes.extend(self.status_code.clone());

        match outcome {
            Outcome::Completed => {}
            Outcome::Error(message) => {
                tracing::debug!(error = %message, "Outbound request failed");
                duration_attributes.push(KeyValue::new(ERROR_TYPE, "transport"));
                span.set_attribute(KeyValue::new(ERROR_TYPE, "transport"));
                span.set_status(Status::error(message));
            }
            Outcome::Cancelled => {
                duration_attributes.push(KeyValue::new(ERROR_TYPE, "cancelled"));
                span.set_attribute(KeyValue::new(ERROR_TYPE, "cancelled"));
                span.set_status(Status::error("request cancelled"));
            }
        }

        self.instruments
            .request_duration
            .record(elapsed, &duration_attributes);
        self.instruments.active_requests.add(-1, &self.attributes);
        span.end();
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let outcome = if self.status_code.is_some() {
            Outcome::Completed
        } else {
            Outcome::Cancelled
        };
        self.finish(outcome);
    }
}
