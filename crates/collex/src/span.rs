//! SDK-side span model.
//!
//! These are the completed, read-only spans an in-process tracing SDK hands to
//! its exporter at the end of a batching cycle. Every span carries the
//! [`Resource`] and [`InstrumentationScope`] it was produced under, so a single
//! [`SpanBatch`] may mix spans from several services and libraries.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// 16-byte trace identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TraceId([u8; 16]);

impl TraceId {
    /// The all-zero, invalid trace id.
    pub const INVALID: TraceId = TraceId([0; 16]);

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value.to_be_bytes())
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({self})")
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", u128::from_be_bytes(self.0))
    }
}

/// 8-byte span identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SpanId([u8; 8]);

impl SpanId {
    /// The all-zero, invalid span id. Used as the parent id of root spans.
    pub const INVALID: SpanId = SpanId([0; 8]);

    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 8] {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value.to_be_bytes())
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({self})")
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", u64::from_be_bytes(self.0))
    }
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

/// Homogeneous attribute array.
#[derive(Debug, Clone)]
pub enum Array {
    Bool(Vec<bool>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    String(Vec<String>),
}

/// Attribute value types for span, event, link, resource and scope metadata.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Array(Array),
}

// Floats compare by bit pattern: grouping must never merge two values that
// encode differently (0.0 vs -0.0), and a NaN-valued resource must equal itself.
fn f64_bits_eq(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits()
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Array::Bool(a), Array::Bool(b)) => a == b,
            (Array::I64(a), Array::I64(b)) => a == b,
            (Array::F64(a), Array::F64(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| f64_bits_eq(*x, *y))
            }
            (Array::String(a), Array::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Array {}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => f64_bits_eq(*a, *b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self {
        Value::Array(Array::Bool(v))
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::Array(Array::I64(v))
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Array(Array::F64(v))
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Array(Array::String(v))
    }
}

/// A single attribute. Attribute lists are ordered and keep duplicates as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// RESOURCE AND SCOPE
// =============================================================================

/// Process-level identity (service name, host, ...) shared by many spans.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
    pub schema_url: Option<String>,
    pub dropped_attributes_count: u32,
}

impl Resource {
    /// Creates a resource from an ordered attribute list.
    pub fn new(attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        Self {
            attributes: attributes.into_iter().collect(),
            schema_url: None,
            dropped_attributes_count: 0,
        }
    }

    /// Resource with only `service.name` set.
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self::new([KeyValue::new("service.name", service_name.into())])
    }

    pub fn with_schema_url(mut self, schema_url: impl Into<String>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }

    /// Looks up the first attribute with the given key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| &kv.value)
    }
}

/// Identity of the instrumentation library that produced a span.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstrumentationScope {
    pub name: String,
    pub version: Option<String>,
    pub schema_url: Option<String>,
    pub attributes: Vec<KeyValue>,
}

impl InstrumentationScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_schema_url(mut self, schema_url: impl Into<String>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }

    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes = attributes.into_iter().collect();
        self
    }
}

// =============================================================================
// SPAN
// =============================================================================

/// Role of a span in a trace, as OpenTelemetry defines it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Internal operation span
    Internal,
    /// Server-side RPC span
    Server,
    /// Client-side RPC span
    Client,
    /// Producer span (messaging)
    Producer,
    /// Consumer span (messaging)
    Consumer,
}

/// Span execution status
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    /// Span status unknown
    #[default]
    Unset,
    /// Span completed successfully
    Ok,
    /// Span completed with error
    Error { description: String },
}

impl Status {
    pub fn error(description: impl Into<String>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// A timestamped annotation recorded on a span.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub timestamp: SystemTime,
    pub attributes: Vec<KeyValue>,
    pub dropped_attributes_count: u32,
}

impl Event {
    pub fn new(
        name: impl Into<String>,
        timestamp: SystemTime,
        attributes: impl IntoIterator<Item = KeyValue>,
    ) -> Self {
        Self {
            name: name.into(),
            timestamp,
            attributes: attributes.into_iter().collect(),
            dropped_attributes_count: 0,
        }
    }
}

/// A reference from a span to another span, possibly in another trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub trace_state: String,
    pub trace_flags: u8,
    pub is_remote: bool,
    pub attributes: Vec<KeyValue>,
    pub dropped_attributes_count: u32,
}

impl Link {
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        attributes: impl IntoIterator<Item = KeyValue>,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            trace_state: String::new(),
            trace_flags: 0,
            is_remote: false,
            attributes: attributes.into_iter().collect(),
            dropped_attributes_count: 0,
        }
    }
}

/// A completed span as produced by the SDK.
///
/// Dropped counters record how many attributes, events and links the SDK
/// discarded because of its configured limits; they are carried through
/// translation unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanData {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    /// [`SpanId::INVALID`] for root spans
    pub parent_span_id: SpanId,
    pub parent_span_is_remote: bool,
    /// W3C `tracestate` header value
    pub trace_state: String,
    /// W3C trace flags (bit 0 = sampled)
    pub trace_flags: u8,
    pub name: String,
    pub kind: SpanKind,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub status: Status,
    pub attributes: Vec<KeyValue>,
    pub dropped_attributes_count: u32,
    pub events: Vec<Event>,
    pub dropped_events_count: u32,
    pub links: Vec<Link>,
    pub dropped_links_count: u32,
    pub resource: Arc<Resource>,
    pub scope: InstrumentationScope,
}

impl SpanData {
    /// Creates a sampled span with an empty resource and scope, started and
    /// ended now.
    pub fn new(
        trace_id: impl Into<TraceId>,
        span_id: impl Into<SpanId>,
        parent_span_id: impl Into<SpanId>,
        name: impl Into<String>,
        kind: SpanKind,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: parent_span_id.into(),
            parent_span_is_remote: false,
            trace_state: String::new(),
            trace_flags: 0x01,
            name: name.into(),
            kind,
            start_time: now,
            end_time: now,
            status: Status::Unset,
            attributes: Vec::new(),
            dropped_attributes_count: 0,
            events: Vec::new(),
            dropped_events_count: 0,
            links: Vec::new(),
            dropped_links_count: 0,
            resource: Arc::new(Resource::default()),
            scope: InstrumentationScope::default(),
        }
    }

    pub fn with_resource(mut self, resource: Arc<Resource>) -> Self {
        self.resource = resource;
        self
    }

    pub fn with_scope(mut self, scope: InstrumentationScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_times(mut self, start_time: SystemTime, end_time: SystemTime) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Marks the span as completed now with the given status
    pub fn finish(&mut self, status: Status) {
        self.end_time = SystemTime::now();
        self.status = status;
    }

    /// Appends an attribute to the span
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        self.attributes.push(attribute);
    }

    pub fn add_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn add_link(&mut self, link: Link) {
        self.links.push(link);
    }

    /// Duration of the span in nanoseconds
    pub fn duration_nanos(&self) -> u64 {
        self.end_time
            .duration_since(self.start_time)
            .map_or(0, |d| d.as_nanos() as u64)
    }

    pub fn is_root(&self) -> bool {
        !self.parent_span_id.is_valid()
    }
}

// =============================================================================
// BATCH
// =============================================================================

/// Batch of spans for export
#[derive(Debug, Clone)]
pub struct SpanBatch {
    /// All spans in this batch
    pub spans: Vec<SpanData>,
    /// Batch creation timestamp
    pub timestamp: SystemTime,
}

impl SpanBatch {
    /// Creates a new empty span batch
    pub fn new() -> Self {
        Self {
            spans: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }

    /// Creates a batch with the given spans
    pub fn with_spans(spans: Vec<SpanData>) -> Self {
        Self {
            spans,
            timestamp: SystemTime::now(),
        }
    }

    /// Adds a span to the batch
    pub fn add(&mut self, span: SpanData) {
        self.spans.push(span);
    }

    /// Returns the number of spans in the batch
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Returns true if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SpanData> {
        self.spans.iter()
    }
}

impl Default for SpanBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<SpanData> for SpanBatch {
    fn from_iter<I: IntoIterator<Item = SpanData>>(iter: I) -> Self {
        Self::with_spans(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SpanBatch {
    type Item = &'a SpanData;
    type IntoIter = std::slice::Iter<'a, SpanData>;

    fn into_iter(self) -> Self::IntoIter {
        self.spans.iter()
    }
}
