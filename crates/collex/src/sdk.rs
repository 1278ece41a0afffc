//! Bridge to the `opentelemetry_sdk` span pipeline.
//!
//! [`SdkSpanExporter`] implements `opentelemetry_sdk::trace::SpanExporter`, so
//! a `SdkTracerProvider` span processor (simple or batch) can drive a
//! [`SpanExporterAdapter`]. SDK spans are converted into [`SpanData`], stamped
//! with the resource the provider hands over through `set_resource`, and
//! exported through the adapter.
//!
//! ```text
//! SdkTracerProvider ──► span processor ──► SdkSpanExporter
//!                                            │ convert + set resource
//!                                            ▼
//!                       runtime handle ──► SpanExporterAdapter ──► consumer
//! ```
//!
//! The SDK's processors may call the exporter from their own threads, outside
//! any tokio runtime. Exports and shutdown are therefore spawned onto the
//! runtime handle given at construction.

use crate::adapter::SpanExporterAdapter;
use crate::consumer::TracesConsumer;
use crate::context::ExportContext;
use crate::error::ExportError;
use crate::exporter::SpanExporter as _;
use crate::span::{
    Array, Event, InstrumentationScope, KeyValue, Link, Resource, SpanBatch, SpanData, SpanId,
    SpanKind, Status, TraceId, Value,
};
use opentelemetry::trace as api;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

/// `opentelemetry_sdk` span exporter backed by a [`SpanExporterAdapter`].
///
/// # Example
///
/// ```ignore
/// let adapter = traces_exporter(LoggingConsumer::new(Verbosity::Basic, span));
/// let provider = SdkTracerProvider::builder()
///     .with_batch_exporter(SdkSpanExporter::new(adapter, Handle::current()))
///     .build();
/// ```
///
/// `shutdown_with_timeout` blocks the calling thread until the adapter has
/// shut down. Calling it from a worker thread of a current-thread runtime
/// that also owns the handle cannot make progress and ends in
/// `OTelSdkError::Timeout`.
pub struct SdkSpanExporter<C: TracesConsumer> {
    adapter: Arc<SpanExporterAdapter<C>>,
    runtime: Handle,
    resource: Arc<Resource>,
}

impl<C: TracesConsumer> SdkSpanExporter<C> {
    pub fn new(adapter: impl Into<Arc<SpanExporterAdapter<C>>>, runtime: Handle) -> Self {
        Self {
            adapter: adapter.into(),
            runtime,
            resource: Arc::new(Resource::default()),
        }
    }

    pub fn adapter(&self) -> &Arc<SpanExporterAdapter<C>> {
        &self.adapter
    }

    /// Resource attached to every exported span.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }
}

impl<C: TracesConsumer> fmt::Debug for SdkSpanExporter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkSpanExporter")
            .field("adapter", &self.adapter)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl<C: TracesConsumer + 'static> opentelemetry_sdk::trace::SpanExporter for SdkSpanExporter<C> {
    async fn export(&self, batch: Vec<opentelemetry_sdk::trace::SpanData>) -> OTelSdkResult {
        let batch: SpanBatch = batch
            .into_iter()
            .map(|span| span_data(span, &self.resource))
            .collect();

        let adapter = Arc::clone(&self.adapter);
        let export_timeout = adapter.config().export_timeout;
        self.runtime
            .spawn(async move { adapter.export(batch).await })
            .await
            .map_err(|err| OTelSdkError::InternalFailure(err.to_string()))?
            .map_err(|err| sdk_error(err, export_timeout))
    }

    fn shutdown_with_timeout(&mut self, timeout: Duration) -> OTelSdkResult {
        let adapter = Arc::clone(&self.adapter);
        let (tx, rx) = mpsc::sync_channel(1);
        self.runtime.spawn(async move {
            let cx = ExportContext::background().with_timeout(timeout);
            // The receiver is gone if the caller already gave up waiting.
            tx.send(adapter.shutdown(cx).await).ok();
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(|err| sdk_error(err, Some(timeout))),
            Err(RecvTimeoutError::Timeout) => Err(OTelSdkError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(OTelSdkError::InternalFailure(
                "adapter shutdown task was dropped".to_owned(),
            )),
        }
    }

    fn set_resource(&mut self, resource: &opentelemetry_sdk::Resource) {
        self.resource = Arc::new(convert_resource(resource));
        debug!(
            parent: self.adapter.logger(),
            attributes = self.resource.attributes.len(),
            "sdk resource set"
        );
    }
}

fn sdk_error(err: ExportError, timeout: Option<Duration>) -> OTelSdkError {
    match (err, timeout) {
        (ExportError::Closed, _) => OTelSdkError::AlreadyShutdown,
        (ExportError::DeadlineExceeded, Some(timeout)) => OTelSdkError::Timeout(timeout),
        (err, _) => OTelSdkError::InternalFailure(err.to_string()),
    }
}

// =============================================================================
// CONVERSION
// =============================================================================

fn span_data(source: opentelemetry_sdk::trace::SpanData, resource: &Arc<Resource>) -> SpanData {
    SpanData {
        trace_id: TraceId::from_bytes(source.span_context.trace_id().to_bytes()),
        span_id: SpanId::from_bytes(source.span_context.span_id().to_bytes()),
        parent_span_id: SpanId::from_bytes(source.parent_span_id.to_bytes()),
        parent_span_is_remote: source.parent_span_is_remote,
        trace_state: source.span_context.trace_state().header(),
        trace_flags: source.span_context.trace_flags().to_u8(),
        name: source.name.into_owned(),
        kind: span_kind(&source.span_kind),
        start_time: source.start_time,
        end_time: source.end_time,
        status: status(source.status),
        attributes: key_values(&source.attributes),
        dropped_attributes_count: source.dropped_attributes_count,
        events: source.events.events.iter().map(event).collect(),
        dropped_events_count: source.events.dropped_count,
        links: source.links.links.iter().map(link).collect(),
        dropped_links_count: source.links.dropped_count,
        resource: Arc::clone(resource),
        scope: scope(&source.instrumentation_scope),
    }
}

/// SDK resources are hash maps, so attributes are sorted by key to keep the
/// output stable from one process to the next.
fn convert_resource(source: &opentelemetry_sdk::Resource) -> Resource {
    let mut attributes: Vec<KeyValue> = source
        .iter()
        .map(|(key, value)| KeyValue {
            key: key.as_str().to_owned(),
            value: convert_value(value),
        })
        .collect();
    attributes.sort_by(|a, b| a.key.cmp(&b.key));

    let mut resource = Resource::new(attributes);
    resource.schema_url = source.schema_url().map(str::to_owned);
    resource
}

fn scope(source: &opentelemetry::InstrumentationScope) -> InstrumentationScope {
    InstrumentationScope {
        name: source.name().to_owned(),
        version: source.version().map(str::to_owned),
        schema_url: source.schema_url().map(str::to_owned),
        attributes: source.attributes().map(key_value).collect(),
    }
}

fn event(source: &api::Event) -> Event {
    Event {
        name: source.name.to_string(),
        timestamp: source.timestamp,
        attributes: key_values(&source.attributes),
        dropped_attributes_count: source.dropped_attributes_count,
    }
}

fn link(source: &api::Link) -> Link {
    let context = &source.span_context;
    Link {
        trace_id: TraceId::from_bytes(context.trace_id().to_bytes()),
        span_id: SpanId::from_bytes(context.span_id().to_bytes()),
        trace_state: context.trace_state().header(),
        trace_flags: context.trace_flags().to_u8(),
        is_remote: context.is_remote(),
        attributes: key_values(&source.attributes),
        dropped_attributes_count: source.dropped_attributes_count,
    }
}

fn span_kind(kind: &api::SpanKind) -> SpanKind {
    match kind {
        api::SpanKind::Client => SpanKind::Client,
        api::SpanKind::Server => SpanKind::Server,
        api::SpanKind::Producer => SpanKind::Producer,
        api::SpanKind::Consumer => SpanKind::Consumer,
        api::SpanKind::Internal => SpanKind::Internal,
    }
}

fn status(source: api::Status) -> Status {
    match source {
        api::Status::Unset => Status::Unset,
        api::Status::Ok => Status::Ok,
        api::Status::Error { description } => Status::error(description),
    }
}

fn key_values(source: &[opentelemetry::KeyValue]) -> Vec<KeyValue> {
    source.iter().map(key_value).collect()
}

fn key_value(source: &opentelemetry::KeyValue) -> KeyValue {
    KeyValue {
        key: source.key.as_str().to_owned(),
        value: convert_value(&source.value),
    }
}

#[allow(unreachable_patterns)]
fn convert_value(source: &opentelemetry::Value) -> Value {
    use opentelemetry::{Array as SdkArray, Value as SdkValue};

    match source {
        SdkValue::Bool(v) => Value::Bool(*v),
        SdkValue::I64(v) => Value::I64(*v),
        SdkValue::F64(v) => Value::F64(*v),
        SdkValue::String(v) => Value::String(v.to_string()),
        SdkValue::Array(SdkArray::Bool(v)) => Value::Array(Array::Bool(v.clone())),
        SdkValue::Array(SdkArray::I64(v)) => Value::Array(Array::I64(v.clone())),
        SdkValue::Array(SdkArray::F64(v)) => Value::Array(Array::F64(v.clone())),
        SdkValue::Array(SdkArray::String(v)) => {
            Value::Array(Array::String(v.iter().map(ToString::to_string).collect()))
        }
        // Variants added by later API versions keep their text form.
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::factory::traces_exporter;
    use crate::traces::Traces;
    use opentelemetry_sdk::trace::SpanExporter as _;

    struct NoopConsumer;

    impl TracesConsumer for NoopConsumer {
        async fn consume_traces(&self, _traces: Traces) -> Result<(), BoxError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "noop"
        }
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(convert_value(&true.into()), Value::Bool(true));
        assert_eq!(convert_value(&7_i64.into()), Value::I64(7));
        assert_eq!(convert_value(&0.5_f64.into()), Value::F64(0.5));
        assert_eq!(convert_value(&"text".into()), Value::String("text".into()));
        assert_eq!(
            convert_value(&opentelemetry::Value::Array(vec![1_i64, 2].into())),
            Value::Array(Array::I64(vec![1, 2]))
        );
        assert_eq!(
            convert_value(&opentelemetry::Value::Array(
                vec![opentelemetry::StringValue::from("a")].into()
            )),
            Value::Array(Array::String(vec!["a".to_owned()]))
        );
    }

    #[test]
    fn test_resource_attributes_sorted() {
        let source = opentelemetry_sdk::Resource::builder_empty()
            .with_attributes([
                opentelemetry::KeyValue::new("zone", "eu-1"),
                opentelemetry::KeyValue::new("service.name", "checkout"),
                opentelemetry::KeyValue::new("host.name", "node-3"),
            ])
            .build();

        let resource = convert_resource(&source);
        let keys: Vec<_> = resource.attributes.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, ["host.name", "service.name", "zone"]);
        assert_eq!(
            resource.get("service.name"),
            Some(&Value::String("checkout".into()))
        );
    }

    #[test]
    fn test_scope_conversion() {
        let source = opentelemetry::InstrumentationScope::builder("lib")
            .with_version("1.2.0")
            .with_attributes([opentelemetry::KeyValue::new("lib.flag", true)])
            .build();

        let converted = scope(&source);
        assert_eq!(converted.name, "lib");
        assert_eq!(converted.version.as_deref(), Some("1.2.0"));
        assert_eq!(converted.schema_url, None);
        assert_eq!(converted.attributes, [KeyValue::new("lib.flag", true)]);
    }

    #[test]
    fn test_status_and_kind_conversion() {
        assert_eq!(status(api::Status::Unset), Status::Unset);
        assert_eq!(status(api::Status::Ok), Status::Ok);
        assert_eq!(status(api::Status::error("boom")), Status::error("boom"));
        assert_eq!(span_kind(&api::SpanKind::Producer), SpanKind::Producer);
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            sdk_error(ExportError::Closed, None),
            OTelSdkError::AlreadyShutdown
        ));
        assert!(matches!(
            sdk_error(ExportError::DeadlineExceeded, Some(Duration::from_secs(2))),
            OTelSdkError::Timeout(d) if d == Duration::from_secs(2)
        ));
        assert!(matches!(
            sdk_error(ExportError::DeadlineExceeded, None),
            OTelSdkError::InternalFailure(_)
        ));
        assert!(matches!(
            sdk_error(ExportError::Forward("down".into()), None),
            OTelSdkError::InternalFailure(msg) if msg.contains("down")
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_export_after_shutdown_is_already_shutdown() {
        let mut exporter = SdkSpanExporter::new(traces_exporter(NoopConsumer), Handle::current());
        exporter.export(Vec::new()).await.unwrap();

        let exporter = tokio::task::spawn_blocking(move || {
            exporter.shutdown_with_timeout(Duration::from_secs(5)).unwrap();
            exporter
        })
        .await
        .unwrap();

        assert!(exporter.adapter().is_shutdown());
        assert!(matches!(
            exporter.export(Vec::new()).await,
            Err(OTelSdkError::AlreadyShutdown)
        ));
    }
}
