use collex::{
    traces_exporter, translate, AdapterConfig, BoxError, BuildError, CancellationToken,
    CreateSettings, ExportContext, ExportError, Factory, InstrumentationScope, JsonFileConfig,
    JsonFileConsumerFactory, KeyValue, NullConsumer, Resource, SdkSpanExporter, SpanBatch,
    SpanData, SpanExporter, SpanExporterBoxed, SpanKind, Traces, TracesConsumer,
    TracesConsumerFactory,
};
use opentelemetry::trace::{Tracer, TracerProvider as _};
use opentelemetry_proto::tonic::common::v1::any_value;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

// =============================================================================
// Test consumers
// =============================================================================

#[derive(Default)]
struct RecordingConsumer {
    batches: Mutex<Vec<Traces>>,
    shutdowns: AtomicUsize,
}

impl RecordingConsumer {
    fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    fn span_count(&self) -> usize {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(Traces::span_count)
            .sum()
    }

    fn last(&self) -> Traces {
        self.batches.lock().unwrap().last().cloned().unwrap()
    }
}

impl TracesConsumer for RecordingConsumer {
    async fn consume_traces(&self, traces: Traces) -> Result<(), BoxError> {
        self.batches.lock().unwrap().push(traces);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[derive(Debug, PartialEq)]
struct BackendUnavailable {
    code: u16,
}

impl fmt::Display for BackendUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend unavailable ({})", self.code)
    }
}

impl std::error::Error for BackendUnavailable {}

struct FailingConsumer;

impl TracesConsumer for FailingConsumer {
    async fn consume_traces(&self, _traces: Traces) -> Result<(), BoxError> {
        Err(Box::new(BackendUnavailable { code: 503 }))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

// Slow consumer for deadline testing
struct SlowConsumer {
    delay: Duration,
    completed: AtomicUsize,
}

impl SlowConsumer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            completed: AtomicUsize::new(0),
        }
    }
}

impl TracesConsumer for SlowConsumer {
    async fn consume_traces(&self, _traces: Traces) -> Result<(), BoxError> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

// Consumer that parks inside consume_traces until released
#[derive(Default)]
struct GatedConsumer {
    entered: Notify,
    release: Notify,
    events: Mutex<Vec<&'static str>>,
}

impl TracesConsumer for GatedConsumer {
    async fn consume_traces(&self, _traces: Traces) -> Result<(), BoxError> {
        self.events.lock().unwrap().push("consume:start");
        self.entered.notify_one();
        self.release.notified().await;
        self.events.lock().unwrap().push("consume:end");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        self.events.lock().unwrap().push("shutdown");
        Ok(())
    }

    fn name(&self) -> &str {
        "gated"
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn span(resource: &Arc<Resource>, scope: &InstrumentationScope, id: u64) -> SpanData {
    let mut span = SpanData::new(0xfeed_u128, id, 0_u64, format!("op-{id}"), SpanKind::Server)
        .with_resource(Arc::clone(resource))
        .with_scope(scope.clone());
    span.set_attribute(KeyValue::new("span.index", id as i64));
    span
}

fn simple_batch(n: u64) -> SpanBatch {
    let resource = Arc::new(Resource::for_service("svc"));
    let scope = InstrumentationScope::new("lib");
    (1..=n).map(|i| span(&resource, &scope, i)).collect()
}

// =============================================================================
// Translation through the adapter
// =============================================================================

#[tokio::test]
async fn test_example_scenario_grouping() {
    let a = Arc::new(Resource::for_service("A"));
    let b = Arc::new(Resource::for_service("B"));
    let x = InstrumentationScope::new("X");
    let y = InstrumentationScope::new("Y");

    let consumer = Arc::new(RecordingConsumer::default());
    let exporter = traces_exporter(Arc::clone(&consumer));

    let batch = SpanBatch::with_spans(vec![span(&a, &x, 1), span(&a, &x, 2), span(&b, &y, 3)]);
    exporter.export(batch).await.unwrap();

    let traces = consumer.last();
    let rs = traces.resource_spans();
    assert_eq!(rs.len(), 2);
    assert_eq!(rs[0].scope_spans.len(), 1);
    assert_eq!(rs[0].scope_spans[0].scope.as_ref().unwrap().name, "X");
    assert_eq!(rs[0].scope_spans[0].spans.len(), 2);
    assert_eq!(rs[1].scope_spans.len(), 1);
    assert_eq!(rs[1].scope_spans[0].scope.as_ref().unwrap().name, "Y");
    assert_eq!(rs[1].scope_spans[0].spans.len(), 1);
}

#[test]
fn test_translation_is_deterministic() {
    let r1 = Arc::new(Resource::for_service("one"));
    let r2 = Arc::new(Resource::for_service("two"));
    let s1 = InstrumentationScope::new("s1").with_version("1.0");
    let s2 = InstrumentationScope::new("s2");

    let batch = SpanBatch::with_spans(vec![
        span(&r2, &s1, 1),
        span(&r1, &s2, 2),
        span(&r2, &s2, 3),
        span(&r1, &s2, 4),
        span(&r2, &s1, 5),
    ]);

    let first = translate(&batch);
    let second = translate(&batch);
    assert_eq!(first, second);
    assert_eq!(first.encode_to_vec(), second.encode_to_vec());
    assert_eq!(first.span_count(), batch.len());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let consumer = Arc::new(RecordingConsumer::default());
    let exporter = traces_exporter(Arc::clone(&consumer));

    exporter.shutdown(ExportContext::background()).await.unwrap();
    exporter.shutdown(ExportContext::background()).await.unwrap();

    assert_eq!(consumer.shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_export_after_shutdown_is_rejected() {
    let consumer = Arc::new(RecordingConsumer::default());
    let exporter = traces_exporter(Arc::clone(&consumer));

    exporter.export(simple_batch(2)).await.unwrap();
    exporter.shutdown(ExportContext::background()).await.unwrap();

    let err = exporter.export(simple_batch(3)).await.unwrap_err();
    assert!(matches!(err, ExportError::Closed));
    assert_eq!(consumer.batch_count(), 1);
    assert_eq!(consumer.span_count(), 2);
    assert_eq!(exporter.metrics().closed_rejections(), 1);
}

#[tokio::test]
async fn test_shutdown_waits_for_inflight_export() {
    let exporter = Arc::new(traces_exporter(GatedConsumer::default()));

    let export = {
        let exporter = Arc::clone(&exporter);
        tokio::spawn(async move { exporter.export(simple_batch(1)).await })
    };
    exporter.consumer().entered.notified().await;

    let shutdown = {
        let exporter = Arc::clone(&exporter);
        tokio::spawn(async move { exporter.shutdown(ExportContext::background()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!shutdown.is_finished());

    exporter.consumer().release.notify_one();
    export.await.unwrap().unwrap();
    shutdown.await.unwrap().unwrap();

    let events = exporter.consumer().events.lock().unwrap().clone();
    assert_eq!(events, ["consume:start", "consume:end", "shutdown"]);
}

#[tokio::test]
async fn test_export_queued_behind_shutdown_is_rejected() {
    let exporter = Arc::new(traces_exporter(GatedConsumer::default()));

    let first = {
        let exporter = Arc::clone(&exporter);
        tokio::spawn(async move { exporter.export(simple_batch(1)).await })
    };
    exporter.consumer().entered.notified().await;

    let shutdown = {
        let exporter = Arc::clone(&exporter);
        tokio::spawn(async move { exporter.shutdown(ExportContext::background()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Not shut down yet, so this export gets past the lock-free check and
    // queues on the state lock behind the shutdown.
    assert!(!exporter.is_shutdown());
    let second = {
        let exporter = Arc::clone(&exporter);
        tokio::spawn(async move { exporter.export(simple_batch(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!second.is_finished());

    exporter.consumer().release.notify_one();
    first.await.unwrap().unwrap();
    shutdown.await.unwrap().unwrap();

    let err = second.await.unwrap().unwrap_err();
    assert!(err.is_closed());
    assert_eq!(exporter.metrics().closed_rejections(), 1);

    let events = exporter.consumer().events.lock().unwrap().clone();
    assert_eq!(events, ["consume:start", "consume:end", "shutdown"]);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_consumer_error_passes_through() {
    let exporter = traces_exporter(FailingConsumer);

    let err = exporter.export(simple_batch(1)).await.unwrap_err();
    assert!(!err.is_cancellation());
    assert_eq!(
        err.forwarded().and_then(|e| e.downcast_ref::<BackendUnavailable>()),
        Some(&BackendUnavailable { code: 503 })
    );
    assert_eq!(exporter.metrics().forward_failures(), 1);

    // No retry and no state change: the next export reaches the consumer again.
    assert!(exporter.export(simple_batch(1)).await.is_err());
    assert_eq!(exporter.metrics().forward_failures(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_shorter_than_consumer() {
    let consumer = Arc::new(SlowConsumer::new(Duration::from_secs(10)));
    let exporter = traces_exporter(Arc::clone(&consumer));

    let start = Instant::now();
    let cx = ExportContext::background().with_timeout(Duration::from_millis(50));
    let err = exporter
        .export_with_context(cx, simple_batch(1))
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::DeadlineExceeded));
    assert!(err.is_cancellation());
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(consumer.completed.load(Ordering::SeqCst), 0);
    assert_eq!(exporter.metrics().cancellations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_adapter_export_timeout_applies() {
    let exporter = traces_exporter(SlowConsumer::new(Duration::from_secs(10)))
        .with_config(AdapterConfig::default().with_export_timeout(Duration::from_millis(100)));

    let start = Instant::now();
    let err = exporter.export(simple_batch(1)).await.unwrap_err();
    assert!(matches!(err, ExportError::DeadlineExceeded));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_cancellation_token() {
    let exporter = Arc::new(traces_exporter(SlowConsumer::new(Duration::from_secs(60))));
    let token = CancellationToken::new();

    let task = {
        let exporter = Arc::clone(&exporter);
        let cx = ExportContext::background().with_cancellation(token.clone());
        tokio::spawn(async move { exporter.export_with_context(cx, simple_batch(1)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("export did not observe cancellation")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ExportError::Cancelled));
}

#[tokio::test]
async fn test_cancelled_before_export_never_reaches_consumer() {
    let consumer = Arc::new(RecordingConsumer::default());
    let exporter = traces_exporter(Arc::clone(&consumer));

    let token = CancellationToken::new();
    token.cancel();
    let cx = ExportContext::background().with_cancellation(token);

    let err = exporter
        .export_with_context(cx, simple_batch(1))
        .await
        .unwrap_err();
    assert!(err.is_cancellation());
    assert_eq!(consumer.batch_count(), 0);
    assert!(!exporter.is_shutdown());
}

// =============================================================================
// Concurrency and dynamic dispatch
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exports() {
    let consumer = Arc::new(RecordingConsumer::default());
    let exporter = Arc::new(traces_exporter(Arc::clone(&consumer)));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let exporter = Arc::clone(&exporter);
        handles.push(tokio::spawn(async move {
            for _ in 0..5 {
                exporter.export(simple_batch(10)).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(consumer.batch_count(), 40);
    assert_eq!(consumer.span_count(), 400);
    assert_eq!(exporter.metrics().spans_exported(), 400);
    assert_eq!(exporter.metrics().batches_exported(), 40);
}

#[tokio::test]
async fn test_boxed_dispatch() {
    let exporter: Arc<dyn SpanExporterBoxed> = Arc::new(traces_exporter(NullConsumer));
    assert_eq!(exporter.name(), "null");

    exporter
        .export_boxed(ExportContext::background(), simple_batch(3))
        .await
        .unwrap();
    exporter
        .shutdown_boxed(ExportContext::background())
        .await
        .unwrap();

    let err = exporter
        .export_boxed(ExportContext::background(), simple_batch(1))
        .await
        .unwrap_err();
    assert!(err.is_closed());
}

// =============================================================================
// Factory
// =============================================================================

#[derive(Default)]
struct RecordingFactory {
    seen_config: Mutex<Option<u32>>,
}

impl TracesConsumerFactory for RecordingFactory {
    type Config = u32;
    type Consumer = NullConsumer;

    fn type_name(&self) -> &str {
        "recording"
    }

    fn create_default_config(&self) -> u32 {
        42
    }

    async fn create_traces_consumer(
        &self,
        _settings: &CreateSettings,
        config: u32,
    ) -> Result<NullConsumer, BoxError> {
        *self.seen_config.lock().unwrap() = Some(config);
        Ok(NullConsumer)
    }
}

struct BrokenFactory;

impl TracesConsumerFactory for BrokenFactory {
    type Config = ();
    type Consumer = NullConsumer;

    fn type_name(&self) -> &str {
        "broken"
    }

    fn create_default_config(&self) {}

    async fn create_traces_consumer(
        &self,
        _settings: &CreateSettings,
        _config: (),
    ) -> Result<NullConsumer, BoxError> {
        Err(Box::new(BackendUnavailable { code: 401 }))
    }
}

#[tokio::test]
async fn test_factory_uses_default_config() {
    let factory = Factory::new(RecordingFactory::default(), None);

    factory.span_exporter(None).await.unwrap();
    assert_eq!(*factory.consumer_factory().seen_config.lock().unwrap(), Some(42));

    factory.span_exporter(Some(7)).await.unwrap();
    assert_eq!(*factory.consumer_factory().seen_config.lock().unwrap(), Some(7));

    factory.span_exporter_from_json("9").await.unwrap();
    assert_eq!(*factory.consumer_factory().seen_config.lock().unwrap(), Some(9));
}

#[tokio::test]
async fn test_factory_construction_error_passes_through() {
    let factory = Factory::new(BrokenFactory, None);

    match factory.span_exporter(None).await {
        Err(BuildError::Consumer(err)) => {
            assert_eq!(
                err.downcast_ref::<BackendUnavailable>(),
                Some(&BackendUnavailable { code: 401 })
            );
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("construction should fail"),
    }
}

#[tokio::test]
async fn test_json_file_exporter_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spans.jsonl");

    let factory = Factory::new(JsonFileConsumerFactory, None);
    let exporter = factory
        .span_exporter(Some(JsonFileConfig::new(&path)))
        .await
        .unwrap();

    let a = Arc::new(Resource::for_service("a"));
    let b = Arc::new(Resource::for_service("b"));
    let scope = InstrumentationScope::new("lib");
    exporter
        .export(SpanBatch::with_spans(vec![
            span(&a, &scope, 1),
            span(&b, &scope, 2),
            span(&a, &scope, 3),
        ]))
        .await
        .unwrap();
    exporter.shutdown(ExportContext::background()).await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let request: ExportTraceServiceRequest =
        serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert_eq!(request.resource_spans.len(), 2);
    assert_eq!(request.resource_spans[0].scope_spans[0].spans.len(), 2);
    assert_eq!(request.resource_spans[1].scope_spans[0].spans.len(), 1);

    assert!(exporter.export(simple_batch(1)).await.unwrap_err().is_closed());
}

#[tokio::test]
async fn test_json_file_factory_rejects_missing_path() {
    let factory = Factory::new(JsonFileConsumerFactory, None);
    let err = factory.span_exporter(None).await.unwrap_err();
    assert!(matches!(err, BuildError::Consumer(_)));

    let err = factory
        .span_exporter_from_json(r#"{"path": 12}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_json_file_timed_out_export_writes_whole_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spans.jsonl");

    let exporter = Factory::new(JsonFileConsumerFactory, None)
        .with_adapter_config(AdapterConfig::default().with_export_timeout(Duration::from_millis(1)))
        .span_exporter(Some(JsonFileConfig::new(&path)))
        .await
        .unwrap();

    let resource = Arc::new(Resource::for_service("big"));
    let scope = InstrumentationScope::new("lib");
    let mut big = span(&resource, &scope, 1);
    big.set_attribute(KeyValue::new("payload", "x".repeat(12 << 20)));

    let err = exporter
        .export(SpanBatch::with_spans(vec![big]))
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::DeadlineExceeded));

    // Goes straight to the consumer so it is not bound by the 1ms timeout.
    exporter
        .consumer()
        .consume_traces(translate(&simple_batch(1)))
        .await
        .unwrap();
    exporter.shutdown(ExportContext::background()).await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.ends_with('\n'));
    let requests: Vec<ExportTraceServiceRequest> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(requests.len(), 2);

    // One line per batch, each a complete request: the big span with its
    // payload attribute and the small one.
    let mut attribute_counts: Vec<usize> = requests
        .iter()
        .map(|request| request.resource_spans[0].scope_spans[0].spans[0].attributes.len())
        .collect();
    attribute_counts.sort_unstable();
    assert_eq!(attribute_counts, [1, 2]);
}

// =============================================================================
// SDK pipeline
// =============================================================================

#[test]
fn test_sdk_tracer_provider_drives_adapter() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();

    let consumer = Arc::new(RecordingConsumer::default());
    let adapter = Arc::new(traces_exporter(Arc::clone(&consumer)));
    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_resource(
            opentelemetry_sdk::Resource::builder_empty()
                .with_attributes([opentelemetry::KeyValue::new("service.name", "checkout")])
                .build(),
        )
        .with_simple_exporter(SdkSpanExporter::new(Arc::clone(&adapter), runtime.handle().clone()))
        .build();

    let tracer = provider.tracer("checkout-lib");
    tracer.in_span("parent", |_cx| {
        tracer.in_span("child", |_cx| {});
    });
    provider.shutdown().unwrap();

    assert!(adapter.is_shutdown());
    assert_eq!(consumer.shutdowns.load(Ordering::SeqCst), 1);

    // The simple processor exports each span as it ends: child first.
    let batches = consumer.batches.lock().unwrap().clone();
    assert_eq!(batches.len(), 2);

    let spans: Vec<_> = batches
        .iter()
        .map(|traces| {
            let rs = &traces.resource_spans()[0];
            let attribute = &rs.resource.as_ref().unwrap().attributes[0];
            assert_eq!(attribute.key, "service.name");
            assert_eq!(
                attribute.value.as_ref().unwrap().value,
                Some(any_value::Value::StringValue("checkout".into()))
            );
            assert_eq!(rs.scope_spans[0].scope.as_ref().unwrap().name, "checkout-lib");
            rs.scope_spans[0].spans[0].clone()
        })
        .collect();

    assert_eq!(spans[0].name, "child");
    assert_eq!(spans[1].name, "parent");
    assert_eq!(spans[0].trace_id, spans[1].trace_id);
    assert_eq!(spans[0].parent_span_id, spans[1].span_id);
    assert!(spans[1].parent_span_id.is_empty());
}
