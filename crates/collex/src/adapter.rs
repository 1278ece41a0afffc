//! Exporter adapter: a Collector traces consumer behind the SDK exporter
//! contract.
//!
//! ```text
//! SDK batch ──► translate ──► [state lock] ──► consumer.consume_traces
//!                              │
//!                              └─ Shutdown? ──► ExportError::Closed
//! ```
//!
//! Translation runs outside the lock and outside the caller's deadline. The
//! lock wait and the forward run under the deadline and cancellation token of
//! the [`ExportContext`].
//!
//! The state lock is a `tokio::sync::Mutex` held across the forward, so a
//! shutdown waits for in-flight forwards and can never release the consumer
//! underneath one. A lock-free flag mirrors the shut-down state so that late
//! exports are rejected without translating.

use crate::config::{AdapterConfig, TelemetrySettings};
use crate::consumer::TracesConsumer;
use crate::context::ExportContext;
use crate::error::ExportError;
use crate::exporter::SpanExporter;
use crate::invariants::debug_assert_closed_flag_matches;
use crate::span::SpanBatch;
use crate::traces::Traces;
use crate::transform::translate;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn, Instrument};

/// Adapter lifecycle. There is no way back from `Shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Accepting exports.
    Ready,
    /// Consumer shut down; exports fail with [`ExportError::Closed`].
    Shutdown,
}

impl AdapterState {
    #[inline]
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// Thread-safe counters for adapter activity (uses atomics)
#[derive(Debug, Default)]
pub struct AdapterMetrics {
    /// Spans delivered to the consumer
    pub spans_exported: AtomicU64,
    /// Batches delivered to the consumer
    pub batches_exported: AtomicU64,
    /// Batches the consumer rejected
    pub forward_failures: AtomicU64,
    /// Calls that hit the deadline or were cancelled
    pub cancellations: AtomicU64,
    /// Exports rejected because the adapter was shut down
    pub closed_rejections: AtomicU64,
}

impl AdapterMetrics {
    pub fn spans_exported(&self) -> u64 {
        self.spans_exported.load(Ordering::Relaxed)
    }

    pub fn batches_exported(&self) -> u64 {
        self.batches_exported.load(Ordering::Relaxed)
    }

    pub fn forward_failures(&self) -> u64 {
        self.forward_failures.load(Ordering::Relaxed)
    }

    pub fn cancellations(&self) -> u64 {
        self.cancellations.load(Ordering::Relaxed)
    }

    pub fn closed_rejections(&self) -> u64 {
        self.closed_rejections.load(Ordering::Relaxed)
    }

    fn record(&self, result: &Result<(), ExportError>, span_count: usize) {
        let counter = match result {
            Ok(()) => {
                self.spans_exported
                    .fetch_add(span_count as u64, Ordering::Relaxed);
                &self.batches_exported
            }
            Err(ExportError::Forward(_)) => &self.forward_failures,
            Err(ExportError::Closed) => &self.closed_rejections,
            Err(ExportError::DeadlineExceeded | ExportError::Cancelled) => &self.cancellations,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Wraps a [`TracesConsumer`] so an SDK pipeline can drive it as a
/// [`SpanExporter`].
///
/// # Example
///
/// ```ignore
/// let exporter = SpanExporterAdapter::new(LoggingConsumer::new(Verbosity::Basic, span));
/// exporter.export(batch).await?;
/// exporter.shutdown(ExportContext::background()).await?;
/// ```
pub struct SpanExporterAdapter<C: TracesConsumer> {
    consumer: C,
    state: Mutex<AdapterState>,
    closed: AtomicBool,
    config: AdapterConfig,
    logger: tracing::Span,
    metrics: AdapterMetrics,
}

impl<C: TracesConsumer> SpanExporterAdapter<C> {
    /// Creates a ready adapter with default configuration.
    pub fn new(consumer: C) -> Self {
        Self {
            consumer,
            state: Mutex::new(AdapterState::Ready),
            closed: AtomicBool::new(false),
            config: AdapterConfig::default(),
            logger: TelemetrySettings::default().logger,
            metrics: AdapterMetrics::default(),
        }
    }

    pub fn with_config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the span under which the adapter's diagnostics are emitted.
    pub fn with_logger(mut self, logger: tracing::Span) -> Self {
        self.logger = logger;
        self
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &AdapterMetrics {
        &self.metrics
    }

    /// Span the adapter's diagnostics are emitted under.
    pub fn logger(&self) -> &tracing::Span {
        &self.logger
    }

    /// Returns `true` once shutdown has completed successfully.
    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn forward(&self, traces: Traces) -> Result<(), ExportError> {
        let state = self.state.lock().await;
        debug_assert_closed_flag_matches!(*state, self.closed.load(Ordering::Acquire));
        if !state.is_ready() {
            return Err(ExportError::Closed);
        }

        self.consumer
            .consume_traces(traces)
            .await
            .map_err(ExportError::Forward)
    }

    async fn shutdown_consumer(&self) -> Result<(), ExportError> {
        let mut state = self.state.lock().await;
        debug_assert_closed_flag_matches!(*state, self.closed.load(Ordering::Acquire));
        if !state.is_ready() {
            debug!("adapter already shut down");
            return Ok(());
        }

        self.consumer.shutdown().await.map_err(ExportError::Forward)?;
        *state = AdapterState::Shutdown;
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl<C: TracesConsumer> fmt::Debug for SpanExporterAdapter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanExporterAdapter")
            .field("consumer", &self.consumer.name())
            .field("shutdown", &self.is_shutdown())
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl<C: TracesConsumer> SpanExporter for SpanExporterAdapter<C> {
    async fn export_with_context(
        &self,
        cx: ExportContext,
        batch: SpanBatch,
    ) -> Result<(), ExportError> {
        let span_count = batch.len();

        let result = if self.is_shutdown() {
            Err(ExportError::Closed)
        } else {
            let traces = translate(&batch);
            drop(batch);

            cx.bounded_by(self.config.export_timeout)
                .run(self.forward(traces))
                .instrument(self.logger.clone())
                .await
                .and_then(|forwarded| forwarded)
        };

        self.metrics.record(&result, span_count);
        match &result {
            Ok(()) => debug!(parent: &self.logger, spans = span_count, "exported batch"),
            Err(ExportError::Closed) => {
                debug!(parent: &self.logger, spans = span_count, "export rejected: shut down");
            }
            Err(err) => {
                warn!(parent: &self.logger, spans = span_count, error = %err, "export failed");
            }
        }
        result
    }

    async fn shutdown(&self, cx: ExportContext) -> Result<(), ExportError> {
        let result = cx
            .bounded_by(self.config.shutdown_timeout)
            .run(self.shutdown_consumer())
            .instrument(self.logger.clone())
            .await
            .and_then(|shut_down| shut_down);

        match &result {
            Ok(()) => {
                debug!(parent: &self.logger, consumer = self.consumer.name(), "adapter shut down");
            }
            Err(err) => {
                if err.is_cancellation() {
                    self.metrics.cancellations.fetch_add(1, Ordering::Relaxed);
                }
                warn!(parent: &self.logger, error = %err, "adapter shutdown failed");
            }
        }
        result
    }

    fn name(&self) -> &str {
        self.consumer.name()
    }
}
