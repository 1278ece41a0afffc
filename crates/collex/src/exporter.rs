//! SDK-side span exporter capability.
//!
//! This is the contract an SDK batching layer drives: hand over a completed
//! [`SpanBatch`], and shut down once at the end of the pipeline's life.

use crate::context::ExportContext;
use crate::error::ExportError;
use crate::span::SpanBatch;
use std::future::Future;
use std::pin::Pin;

/// Trait for exporting span batches.
///
/// Uses native async fn in traits instead of `#[async_trait]`.
///
/// # Note on Object Safety
///
/// This trait uses `impl Future` return types which are not object-safe.
/// For dynamic dispatch, use `Box<dyn SpanExporterBoxed>` or
/// `Arc<dyn SpanExporterBoxed>`.
pub trait SpanExporter: Send + Sync {
    /// Exports a batch with no deadline and no cancellation.
    fn export(&self, batch: SpanBatch) -> impl Future<Output = Result<(), ExportError>> + Send {
        self.export_with_context(ExportContext::background(), batch)
    }

    /// Exports a batch, giving up when `cx` expires or is cancelled.
    fn export_with_context(
        &self,
        cx: ExportContext,
        batch: SpanBatch,
    ) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Releases the exporter. Later exports fail with [`ExportError::Closed`].
    fn shutdown(&self, cx: ExportContext) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Returns the exporter name for debugging.
    fn name(&self) -> &str;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`SpanExporter`] for dynamic dispatch.
pub trait SpanExporterBoxed: Send + Sync {
    /// Exports a batch (boxed future for object safety).
    fn export_boxed(
        &self,
        cx: ExportContext,
        batch: SpanBatch,
    ) -> BoxFuture<'_, Result<(), ExportError>>;

    /// Shuts the exporter down (boxed future for object safety).
    fn shutdown_boxed(&self, cx: ExportContext) -> BoxFuture<'_, Result<(), ExportError>>;

    /// Returns the exporter name for debugging.
    fn name(&self) -> &str;
}

/// Blanket implementation: any `SpanExporter` can be used as `SpanExporterBoxed`
impl<T: SpanExporter> SpanExporterBoxed for T {
    fn export_boxed(
        &self,
        cx: ExportContext,
        batch: SpanBatch,
    ) -> BoxFuture<'_, Result<(), ExportError>> {
        Box::pin(self.export_with_context(cx, batch))
    }

    fn shutdown_boxed(&self, cx: ExportContext) -> BoxFuture<'_, Result<(), ExportError>> {
        Box::pin(self.shutdown(cx))
    }

    fn name(&self) -> &str {
        SpanExporter::name(self)
    }
}
