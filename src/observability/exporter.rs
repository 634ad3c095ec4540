//! Streaming span exporter.
//!
//! Writes one JSON record per finished span to any [`Write`] sink (stdout by
//! default). Compact output puts each record on its own line; pretty output is
//! meant for humans reading a terminal.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use opentelemetry::trace::{SpanId, SpanKind, Status, TraceError};
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::Resource;
use serde::Serialize;

#[derive(Serialize)]
struct SpanRecord<'a> {
    name: &'a str,
    trace_id: String,
    span_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    parent_span_id: String,
    kind: &'static str,
    start_time_unix_nano: u64,
    end_time_unix_nano: u64,
    duration_ms: f64,
    status: StatusRecord<'a>,
    attributes: BTreeMap<&'a str, String>,
    resource: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct StatusRecord<'a> {
    code: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'a str,
}

impl<'a> SpanRecord<'a> {
    fn new(span: &'a SpanData, resource: &'a BTreeMap<String, String>) -> Self {
        let parent_span_id = if span.parent_span_id == SpanId::INVALID {
            String::new()
        } else {
            span.parent_span_id.to_string()
        };
        let status = match &span.status {
            Status::Unset => StatusRecord {
                code: "unset",
                description: "",
            },
            Status::Ok => StatusRecord {
                code: "ok",
                description: "",
            },
            Status::Error { description } => StatusRecord {
                code: "error",
                description: description.as_ref(),
            },
        };
        let duration_ms = span
            .end_time
            .duration_since(span.start_time)
            .unwrap_or_default()
            .as_secs_f64()
            * 1000.0;

        Self {
            name: span.name.as_ref(),
            trace_id: span.span_context.trace_id().to_string(),
            span_id: span.span_context.span_id().to_string(),
            parent_span_id,
            kind: kind_name(&span.span_kind),
            start_time_unix_nano: unix_nanos(span.start_time),
            end_time_unix_nano: unix_nanos(span.end_time),
            duration_ms,
            status,
            attributes: span
                .attributes
                .iter()
                .map(|kv| (kv.key.as_str(), kv.value.to_string()))
                .collect(),
            resource,
        }
    }
}

fn kind_name(kind: &SpanKind) -> &'static str {
    match kind {
        SpanKind::Client => "client",
        SpanKind::Server => "server",
        SpanKind::Producer => "producer",
        SpanKind::Consumer => "consumer",
        SpanKind::Internal => "internal",
    }
}

fn unix_nanos(time: SystemTime) -> u64 {
    let nanos = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    u64::try_from(nanos).unwrap_or(u64::MAX)
}

fn export_error(err: impl std::error::Error + Send + Sync + 'static) -> TraceError {
    TraceError::Other(Box::new(err))
}

/// Span exporter writing JSON records to a byte stream.
pub struct SpanStreamExporter {
    writer: Mutex<Box<dyn Write + Send>>,
    pretty: bool,
    resource: BTreeMap<String, String>,
    is_shutdown: bool,
}

impl SpanStreamExporter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            pretty: false,
            resource: BTreeMap::new(),
            is_shutdown: false,
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Indent records for terminal reading.
    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn write_batch(&mut self, batch: &[SpanData]) -> Result<(), TraceError> {
        if self.is_shutdown {
            return Err(export_error(io::Error::other("span exporter is shut down")));
        }

        let writer = self
            .writer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for span in batch {
            let record = SpanRecord::new(span, &self.resource);
            let encoded = if self.pretty {
                serde_json::to_vec_pretty(&record)
            } else {
                serde_json::to_vec(&record)
            }
            .map_err(export_error)?;
            writer.write_all(&encoded).map_err(export_error)?;
            writer.write_all(b"\n").map_err(export_error)?;
        }
        writer.flush().map_err(export_error)
    }
}

impl fmt::Debug for SpanStreamExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanStreamExporter")
            .field("pretty", &self.pretty)
            .field("resource", &self.resource)
            .field("is_shutdown", &self.is_shutdown)
            .finish_non_exhaustive()
    }
}

impl SpanExporter for SpanStreamExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = self.write_batch(&batch);
        Box::pin(std::future::ready(result))
    }

    fn shutdown(&mut self) {
        if let Ok(writer) = self.writer.get_mut() {
            let _ = writer.flush();
        }
        self.is_shutdown = true;
    }

    fn force_flush(&mut self) -> BoxFuture<'static, ExportResult> {
        let result = self
            .writer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
            .map_err(export_error);
        Box::pin(std::future::ready(result))
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource
            .iter()
            .map(|(key, value)| (key.as_str().to_string(), value.to_string()))
            .collect();
    }
}

/// Shared in-memory byte sink, readable while an exporter writes to it.
#[derive(Clone, Default, Debug)]
pub struct MemorySink(Arc<Mutex<Vec<u8>>>);

impl MemorySink {
    pub fn contents(&self) -> String {
        let buffer = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Parse compact output back into one JSON value per span.
    pub fn records(&self) -> Vec<serde_json::Value> {
        self.contents()
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
