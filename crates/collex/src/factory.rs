//! Building span exporters from consumer factories.

use crate::adapter::SpanExporterAdapter;
use crate::config::{AdapterConfig, CreateSettings};
use crate::consumer::{TracesConsumer, TracesConsumerFactory};
use crate::error::BuildError;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Builds [`SpanExporterAdapter`]s from a [`TracesConsumerFactory`].
///
/// # Example
///
/// ```ignore
/// let factory = Factory::new(JsonFileConsumerFactory, None);
/// let exporter = factory
///     .span_exporter(Some(JsonFileConfig::new("/tmp/traces.jsonl")))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Factory<F: TracesConsumerFactory> {
    settings: CreateSettings,
    consumer_factory: F,
    adapter_config: AdapterConfig,
}

impl<F: TracesConsumerFactory> Factory<F> {
    /// Wraps `consumer_factory`. `None` settings select the default build
    /// info and diagnostics span.
    pub fn new(consumer_factory: F, settings: Option<CreateSettings>) -> Self {
        Self {
            settings: settings.unwrap_or_default(),
            consumer_factory,
            adapter_config: AdapterConfig::default(),
        }
    }

    /// Sets the configuration applied to every adapter this factory builds.
    pub fn with_adapter_config(mut self, config: AdapterConfig) -> Self {
        self.adapter_config = config;
        self
    }

    pub fn settings(&self) -> &CreateSettings {
        &self.settings
    }

    pub fn consumer_factory(&self) -> &F {
        &self.consumer_factory
    }

    /// Builds a consumer and wraps it in a ready adapter. `None` uses the
    /// consumer factory's default configuration.
    pub async fn span_exporter(
        &self,
        config: Option<F::Config>,
    ) -> Result<SpanExporterAdapter<F::Consumer>, BuildError> {
        let config = config.unwrap_or_else(|| self.consumer_factory.create_default_config());
        let logger = &self.settings.telemetry.logger;
        let type_name = self.consumer_factory.type_name();

        let consumer = self
            .consumer_factory
            .create_traces_consumer(&self.settings, config)
            .await
            .map_err(|err| {
                warn!(
                    parent: logger,
                    consumer = type_name,
                    error = %err,
                    "failed to create traces consumer"
                );
                BuildError::Consumer(err)
            })?;

        debug!(parent: logger, consumer = type_name, "created span exporter");
        Ok(SpanExporterAdapter::new(consumer)
            .with_config(self.adapter_config.clone())
            .with_logger(logger.clone()))
    }

    /// Like [`Factory::span_exporter`], with the consumer configuration
    /// parsed from JSON.
    pub async fn span_exporter_from_json(
        &self,
        raw: &str,
    ) -> Result<SpanExporterAdapter<F::Consumer>, BuildError>
    where
        F::Config: DeserializeOwned,
    {
        let config: F::Config = serde_json::from_str(raw)?;
        self.span_exporter(Some(config)).await
    }
}

/// Wraps an already built consumer in a ready adapter with default settings.
pub fn traces_exporter<C: TracesConsumer>(consumer: C) -> SpanExporterAdapter<C> {
    SpanExporterAdapter::new(consumer)
}
