//! Span translation: SDK [`SpanBatch`] → Collector [`Traces`].
//!
//! Spans are partitioned by [`Resource`] value, then by
//! [`InstrumentationScope`] value inside each resource group. Values are
//! compared the way they encode: an empty schema URL or scope version is the
//! same as an absent one, so two groups never produce identical headers.
//! Groups appear in
//! the order their first span appears in the batch, and spans keep their batch
//! order inside a group, so translating the same batch always produces the
//! same output.
//!
//! ```text
//! batch: [a1 (A/X), b1 (B/Y), a2 (A/X), a3 (A/Z)]
//!
//! ResourceSpans A ── ScopeSpans X ── [a1, a2]
//!                 └─ ScopeSpans Z ── [a3]
//! ResourceSpans B ── ScopeSpans Y ── [b1]
//! ```

use crate::invariants::{debug_assert_groups_distinct, debug_assert_span_count_preserved};
use crate::span::{
    Array, InstrumentationScope, KeyValue, Link, Resource, SpanBatch, SpanData, SpanId, SpanKind,
    Status, Value,
};
use crate::traces::Traces;
use opentelemetry_proto::tonic::common::v1 as common;
use opentelemetry_proto::tonic::resource::v1 as resource;
use opentelemetry_proto::tonic::trace::v1 as trace;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// `flags` bit set when the is-remote bit below is meaningful.
const FLAGS_CONTEXT_HAS_IS_REMOTE: u32 = 0x0000_0100;
/// `flags` bit set when the parent (or linked) span context is remote.
const FLAGS_CONTEXT_IS_REMOTE: u32 = 0x0000_0200;

/// Translates a span batch into the Collector traces representation.
///
/// Pure and infallible. The batch is only borrowed; nothing in the returned
/// [`Traces`] refers back to it.
pub fn translate(batch: &SpanBatch) -> Traces {
    let groups = group_by_resource_and_scope(batch);

    debug_assert_groups_distinct!(groups, resource, same_resource, "resource");
    for group in &groups {
        debug_assert_groups_distinct!(group.scopes, scope, same_scope, "scope");
    }

    let traces = Traces::new(groups.into_iter().map(resource_spans).collect());
    debug_assert_span_count_preserved!(batch.len(), traces.span_count());
    traces
}

// =============================================================================
// GROUPING
// =============================================================================

struct ResourceGroup<'a> {
    resource: &'a Arc<Resource>,
    scopes: Vec<ScopeGroup<'a>>,
}

struct ScopeGroup<'a> {
    scope: &'a InstrumentationScope,
    spans: Vec<&'a SpanData>,
}

// Spans from one SDK pipeline usually share a single Arc, so the pointer check
// settles most lookups before the attribute-by-attribute comparison.
fn same_resource(a: &Arc<Resource>, b: &Arc<Resource>) -> bool {
    Arc::ptr_eq(a, b)
        || (a.attributes == b.attributes
            && a.dropped_attributes_count == b.dropped_attributes_count
            && same_text(a.schema_url.as_deref(), b.schema_url.as_deref()))
}

fn same_scope(a: &InstrumentationScope, b: &InstrumentationScope) -> bool {
    a.name == b.name
        && same_text(a.version.as_deref(), b.version.as_deref())
        && same_text(a.schema_url.as_deref(), b.schema_url.as_deref())
        && a.attributes == b.attributes
}

/// `None` and `Some("")` encode identically.
fn same_text(a: Option<&str>, b: Option<&str>) -> bool {
    a.unwrap_or_default() == b.unwrap_or_default()
}

fn group_by_resource_and_scope(batch: &SpanBatch) -> Vec<ResourceGroup<'_>> {
    let mut groups: Vec<ResourceGroup<'_>> = Vec::new();

    for span in batch {
        let resource_idx = match groups
            .iter()
            .position(|g| same_resource(g.resource, &span.resource))
        {
            Some(idx) => idx,
            None => {
                groups.push(ResourceGroup {
                    resource: &span.resource,
                    scopes: Vec::new(),
                });
                groups.len() - 1
            }
        };

        let scopes = &mut groups[resource_idx].scopes;
        match scopes.iter_mut().find(|g| same_scope(g.scope, &span.scope)) {
            Some(group) => group.spans.push(span),
            None => scopes.push(ScopeGroup {
                scope: &span.scope,
                spans: vec![span],
            }),
        }
    }

    groups
}

// =============================================================================
// CONVERSION
// =============================================================================

fn resource_spans(group: ResourceGroup<'_>) -> trace::ResourceSpans {
    let source = &**group.resource;
    trace::ResourceSpans {
        resource: Some(resource::Resource {
            attributes: key_values(&source.attributes),
            dropped_attributes_count: source.dropped_attributes_count,
            ..Default::default()
        }),
        scope_spans: group.scopes.into_iter().map(scope_spans).collect(),
        schema_url: source.schema_url.clone().unwrap_or_default(),
    }
}

fn scope_spans(group: ScopeGroup<'_>) -> trace::ScopeSpans {
    let scope = group.scope;
    trace::ScopeSpans {
        scope: Some(common::InstrumentationScope {
            name: scope.name.clone(),
            version: scope.version.clone().unwrap_or_default(),
            attributes: key_values(&scope.attributes),
            dropped_attributes_count: 0,
        }),
        spans: group.spans.into_iter().map(span).collect(),
        schema_url: scope.schema_url.clone().unwrap_or_default(),
    }
}

fn span(source: &SpanData) -> trace::Span {
    trace::Span {
        trace_id: source.trace_id.to_bytes().to_vec(),
        span_id: source.span_id.to_bytes().to_vec(),
        trace_state: source.trace_state.clone(),
        parent_span_id: parent_span_id(source.parent_span_id),
        flags: context_flags(source.trace_flags, source.parent_span_is_remote),
        name: source.name.clone(),
        kind: span_kind(source.kind) as i32,
        start_time_unix_nano: to_nanos(source.start_time),
        end_time_unix_nano: to_nanos(source.end_time),
        attributes: key_values(&source.attributes),
        dropped_attributes_count: source.dropped_attributes_count,
        events: source
            .events
            .iter()
            .map(|event| trace::span::Event {
                time_unix_nano: to_nanos(event.timestamp),
                name: event.name.clone(),
                attributes: key_values(&event.attributes),
                dropped_attributes_count: event.dropped_attributes_count,
            })
            .collect(),
        dropped_events_count: source.dropped_events_count,
        links: source.links.iter().map(link).collect(),
        dropped_links_count: source.dropped_links_count,
        status: Some(status(&source.status)),
    }
}

fn link(source: &Link) -> trace::span::Link {
    trace::span::Link {
        trace_id: source.trace_id.to_bytes().to_vec(),
        span_id: source.span_id.to_bytes().to_vec(),
        trace_state: source.trace_state.clone(),
        attributes: key_values(&source.attributes),
        dropped_attributes_count: source.dropped_attributes_count,
        flags: context_flags(source.trace_flags, source.is_remote),
    }
}

fn parent_span_id(id: SpanId) -> Vec<u8> {
    if id.is_valid() {
        id.to_bytes().to_vec()
    } else {
        Vec::new()
    }
}

fn context_flags(trace_flags: u8, is_remote: bool) -> u32 {
    let mut flags = u32::from(trace_flags) | FLAGS_CONTEXT_HAS_IS_REMOTE;
    if is_remote {
        flags |= FLAGS_CONTEXT_IS_REMOTE;
    }
    flags
}

fn span_kind(kind: SpanKind) -> trace::span::SpanKind {
    match kind {
        SpanKind::Internal => trace::span::SpanKind::Internal,
        SpanKind::Server => trace::span::SpanKind::Server,
        SpanKind::Client => trace::span::SpanKind::Client,
        SpanKind::Producer => trace::span::SpanKind::Producer,
        SpanKind::Consumer => trace::span::SpanKind::Consumer,
    }
}

fn status(source: &Status) -> trace::Status {
    match source {
        Status::Unset => trace::Status {
            code: trace::status::StatusCode::Unset as i32,
            message: String::new(),
        },
        Status::Ok => trace::Status {
            code: trace::status::StatusCode::Ok as i32,
            message: String::new(),
        },
        Status::Error { description } => trace::Status {
            code: trace::status::StatusCode::Error as i32,
            message: description.clone(),
        },
    }
}

fn key_values(attributes: &[KeyValue]) -> Vec<common::KeyValue> {
    attributes
        .iter()
        .map(|kv| common::KeyValue {
            key: kv.key.clone(),
            value: Some(any_value(&kv.value)),
        })
        .collect()
}

fn any_value(value: &Value) -> common::AnyValue {
    let value = match value {
        Value::Bool(v) => common::any_value::Value::BoolValue(*v),
        Value::I64(v) => common::any_value::Value::IntValue(*v),
        Value::F64(v) => common::any_value::Value::DoubleValue(*v),
        Value::String(v) => common::any_value::Value::StringValue(v.clone()),
        Value::Array(array) => common::any_value::Value::ArrayValue(array_value(array)),
    };
    common::AnyValue { value: Some(value) }
}

fn array_value(array: &Array) -> common::ArrayValue {
    fn wrap<T>(items: &[T], f: impl Fn(&T) -> common::any_value::Value) -> Vec<common::AnyValue> {
        items
            .iter()
            .map(|item| common::AnyValue {
                value: Some(f(item)),
            })
            .collect()
    }

    let values = match array {
        Array::Bool(items) => wrap(items, |v| common::any_value::Value::BoolValue(*v)),
        Array::I64(items) => wrap(items, |v| common::any_value::Value::IntValue(*v)),
        Array::F64(items) => wrap(items, |v| common::any_value::Value::DoubleValue(*v)),
        Array::String(items) => wrap(items, |v| common::any_value::Value::StringValue(v.clone())),
    };
    common::ArrayValue { values }
}

/// Unix nanoseconds. Times before the epoch map to 0.
pub(crate) fn to_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}
