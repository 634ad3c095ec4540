//! Instrumented outbound HTTP client.
//!
//! Layering, innermost first:
//!
//! ```text
//! reqwest::Client (pooled, HTTP/1.1)  <- ClientConfig options (timeout)
//!   -> InstrumentedTransport          <- span per call, metrics, propagation
//!                                        (span ends with the response body)
//!     -> HttpClient                   <- operation-named requests, ClientError
//! ```

pub mod attributes;
pub mod builder;
pub mod error;
pub mod transport;

pub use attributes::{metric_attributes, RequestHead};
pub use builder::{ClientBuilder, ClientConfig, ClientConfigBuilder, HttpClient};
pub use error::{ClientError, ConfigError};
pub use transport::{
    default_span_name, ContextInjector, InstrumentationLayer, InstrumentedResponse,
    InstrumentedTransport, OutboundRequest, SpanNameFormatter, PROTOCOL_TAG,
};
