//! Collector exporters behind an SDK span exporter
//!
//! Lets an in-process tracing SDK hand its span batches straight to an
//! OpenTelemetry Collector-style traces consumer, without running a Collector.
//! Two pieces do the work:
//!
//! - [`translate`]: SDK [`SpanBatch`] → Collector [`Traces`]
//!   (Resource → ScopeSpans → Span), lossless and deterministic
//! - [`SpanExporterAdapter`]: wraps a [`TracesConsumer`] and implements
//!   [`SpanExporter`] on top of it, with deadline/cancellation handling and
//!   idempotent shutdown
//! - [`SdkSpanExporter`]: plugs an adapter into an `opentelemetry_sdk`
//!   tracer provider
//!
//! # Example
//!
//! ```ignore
//! use collex::{ExportContext, Factory, JsonFileConfig, JsonFileConsumerFactory, SpanExporter};
//!
//! let factory = Factory::new(JsonFileConsumerFactory, None);
//! let exporter = factory
//!     .span_exporter(Some(JsonFileConfig::new("traces.jsonl")))
//!     .await?;
//!
//! exporter.export(batch).await?;
//! exporter.shutdown(ExportContext::background()).await?;
//! ```

pub mod adapter;
pub mod config;
pub mod consumer;
pub mod consumers;
pub mod context;
pub mod error;
pub mod exporter;
pub mod factory;
mod invariants;
pub mod sdk;
pub mod span;
pub mod traces;
pub mod transform;

// Re-export main types
pub use adapter::{AdapterMetrics, AdapterState, SpanExporterAdapter};
pub use config::{AdapterConfig, BuildInfo, CreateSettings, TelemetrySettings};
pub use consumer::{TracesConsumer, TracesConsumerFactory};
pub use consumers::{
    JsonFileConfig, JsonFileConsumer, JsonFileConsumerFactory, JsonFileError, LoggingConfig,
    LoggingConsumer, LoggingConsumerFactory, NullConsumer, NullConsumerFactory, Verbosity,
};
pub use context::ExportContext;
pub use error::{BoxError, BuildError, ExportError};
pub use exporter::{SpanExporter, SpanExporterBoxed};
pub use factory::{traces_exporter, Factory};
pub use sdk::SdkSpanExporter;
pub use span::{
    Array, Event, InstrumentationScope, KeyValue, Link, Resource, SpanBatch, SpanData, SpanId,
    SpanKind, Status, TraceId, Value,
};
pub use traces::Traces;
pub use transform::translate;

// Re-export the cancellation token callers pass through `ExportContext`
pub use tokio_util::sync::CancellationToken;
