//! Collector-side consumer capabilities.
//!
//! A [`TracesConsumer`] is the receiving end of the adapter: it takes
//! translated [`Traces`] and externalizes them. A [`TracesConsumerFactory`]
//! builds one from a typed configuration, the way Collector exporter
//! factories do.

use crate::config::CreateSettings;
use crate::error::BoxError;
use crate::traces::Traces;
use std::future::Future;
use std::sync::Arc;

/// Accepts batches of Collector traces.
///
/// Uses native async fn in traits instead of `#[async_trait]`; see
/// [`SpanExporterBoxed`](crate::exporter::SpanExporterBoxed) for the
/// object-safe side of the adapter.
///
/// Futures returned by `consume_traces` may be dropped before completion when
/// the caller's deadline passes, so implementations must be cancel-safe.
pub trait TracesConsumer: Send + Sync {
    /// Processes one batch.
    fn consume_traces(&self, traces: Traces) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Flushes and releases resources. The default does nothing.
    fn shutdown(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
        async { Ok(()) }
    }

    /// Returns the consumer name for diagnostics.
    fn name(&self) -> &str;
}

impl<C: TracesConsumer> TracesConsumer for Arc<C> {
    fn consume_traces(&self, traces: Traces) -> impl Future<Output = Result<(), BoxError>> + Send {
        (**self).consume_traces(traces)
    }

    fn shutdown(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
        (**self).shutdown()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Builds traces consumers from a typed configuration.
pub trait TracesConsumerFactory: Send + Sync {
    /// Consumer configuration. Factories that accept JSON configuration
    /// also implement `serde::Deserialize` for it.
    type Config: Clone + Send + Sync + 'static;

    /// The consumer this factory builds.
    type Consumer: TracesConsumer + 'static;

    /// Short identifier for the consumer type, e.g. `"logging"`.
    fn type_name(&self) -> &str;

    /// Configuration used when the caller does not supply one.
    fn create_default_config(&self) -> Self::Config;

    /// Builds a consumer. Errors are returned to the caller unchanged.
    fn create_traces_consumer(
        &self,
        settings: &CreateSettings,
        config: Self::Config,
    ) -> impl Future<Output = Result<Self::Consumer, BoxError>> + Send;
}
