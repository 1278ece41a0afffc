//! Collector-side traces representation.
//!
//! [`Traces`] is what a traces consumer receives: OTLP `ResourceSpans`, each
//! holding `ScopeSpans`, each holding spans. It is the same message layout
//! Collector components hand to one another, so any OTLP-speaking backend can
//! take it as is.

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::trace::v1::ResourceSpans;
use prost::Message;

/// A batch of trace data grouped as Resource → Scope → Span.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Traces {
    resource_spans: Vec<ResourceSpans>,
}

impl Traces {
    pub fn new(resource_spans: Vec<ResourceSpans>) -> Self {
        Self { resource_spans }
    }

    pub fn resource_spans(&self) -> &[ResourceSpans] {
        &self.resource_spans
    }

    pub fn into_resource_spans(self) -> Vec<ResourceSpans> {
        self.resource_spans
    }

    /// Number of resource groups.
    pub fn resource_count(&self) -> usize {
        self.resource_spans.len()
    }

    /// Total number of spans across all groups.
    pub fn span_count(&self) -> usize {
        self.resource_spans
            .iter()
            .flat_map(|rs| &rs.scope_spans)
            .map(|ss| ss.spans.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.span_count() == 0
    }

    /// Wraps the data in an OTLP export request.
    pub fn to_export_request(&self) -> ExportTraceServiceRequest {
        ExportTraceServiceRequest {
            resource_spans: self.resource_spans.clone(),
        }
    }

    /// Protobuf wire encoding of the equivalent `ExportTraceServiceRequest`.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        self.to_export_request().encode_to_vec()
    }

    /// OTLP/JSON encoding of the equivalent `ExportTraceServiceRequest`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_export_request())
    }
}

impl From<Vec<ResourceSpans>> for Traces {
    fn from(resource_spans: Vec<ResourceSpans>) -> Self {
        Self::new(resource_spans)
    }
}

impl From<Traces> for ExportTraceServiceRequest {
    fn from(traces: Traces) -> Self {
        ExportTraceServiceRequest {
            resource_spans: traces.resource_spans,
        }
    }
}
