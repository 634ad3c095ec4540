//! Client assembly: validated configuration, pooled transport, instrumentation.

use std::borrow::Cow;
use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

use opentelemetry::metrics::Meter;
use opentelemetry_sdk::trace::Tracer;
use reqwest::{Method, Url};
use tower::{Layer, ServiceExt};

use super::error::{ClientError, ConfigError};
use super::transport::{
    ContextInjector, InstrumentationLayer, InstrumentedResponse, InstrumentedTransport,
    OutboundRequest, SpanNameFormatter,
};

/// Upper bound accepted for a client timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Options applied on top of the pooled transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientConfig {
    /// Maximum time for a whole round trip, connection included.
    /// `None` leaves the transport defaults in charge.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Collects options in call order; a later setter replaces an earlier one.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    timeout: Option<Duration>,
    invalid_timeout: Option<f64>,
}

impl ClientConfigBuilder {
    /// Set the round-trip timeout. `Duration::ZERO` clears it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self.invalid_timeout = None;
        self
    }

    /// Set the round-trip timeout in (fractional) seconds.
    ///
    /// Negative, NaN and infinite values are reported by [`build`](Self::build).
    pub fn timeout_secs(mut self, secs: f64) -> Self {
        match Duration::try_from_secs_f64(secs) {
            Ok(timeout) => self.timeout(timeout),
            Err(_) => {
                self.invalid_timeout = Some(secs);
                self
            }
        }
    }

    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        if let Some(secs) = self.invalid_timeout {
            return Err(ConfigError::InvalidTimeout(secs));
        }
        if let Some(timeout) = self.timeout {
            if timeout > MAX_TIMEOUT {
                return Err(ConfigError::TimeoutTooLarge(timeout, MAX_TIMEOUT));
            }
        }
        Ok(ClientConfig {
            timeout: self.timeout,
        })
    }
}

/// Base transport: connection-pooled, HTTP/1.1 only.
pub fn pooled_transport() -> reqwest::ClientBuilder {
    let max_idle = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        + 1;

    reqwest::Client::builder()
        .http1_only()
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(TCP_KEEPALIVE)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(max_idle)
}

/// Assembles instrumented [`HttpClient`]s around injected telemetry handles.
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    layer: InstrumentationLayer,
}

impl ClientBuilder {
    pub fn new(tracer: Tracer, meter: &Meter) -> Self {
        Self {
            layer: InstrumentationLayer::new(tracer, meter),
        }
    }

    pub fn with_span_name_formatter(mut self, formatter: SpanNameFormatter) -> Self {
        self.layer = self.layer.with_span_name_formatter(formatter);
        self
    }

    pub fn with_context_injector(mut self, injector: ContextInjector) -> Self {
        self.layer = self.layer.with_context_injector(injector);
        self
    }

    /// Build a client: pooled transport, then each option, then instrumentation.
    pub fn build(&self, config: &ClientConfig) -> Result<HttpClient, ClientError> {
        let mut transport = pooled_transport();
        if let Some(timeout) = config.timeout {
            transport = transport.timeout(timeout);
        }
        let inner = transport.build().map_err(ClientError::Build)?;

        Ok(HttpClient {
            transport: self.layer.layer(inner),
            timeout: config.timeout,
        })
    }
}

/// Instrumented HTTP client. Clones share the connection pool.
#[derive(Clone)]
pub struct HttpClient {
    transport: InstrumentedTransport<reqwest::Client>,
    timeout: Option<Duration>,
}

impl HttpClient {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Issue a `GET` for `url`, recorded under `operation`.
    pub async fn get(
        &self,
        operation: impl Into<Cow<'static, str>>,
        url: &str,
    ) -> Result<InstrumentedResponse, ClientError> {
        let url = Url::parse(url)?;
        self.execute(operation, reqwest::Request::new(Method::GET, url))
            .await
    }

    pub async fn execute(
        &self,
        operation: impl Into<Cow<'static, str>>,
        request: reqwest::Request,
    ) -> Result<InstrumentedResponse, ClientError> {
        self.transport
            .clone()
            .oneshot(OutboundRequest::new(operation, request))
            .await
            .map_err(ClientError::from)
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
