//! Ready-made traces consumers.
//!
//! - [`LoggingConsumer`]: reports each batch through `tracing`
//! - [`JsonFileConsumer`]: appends each batch to a file as one OTLP/JSON line
//! - [`NullConsumer`]: discards everything (benchmarks, tests)

use crate::config::CreateSettings;
use crate::consumer::{TracesConsumer, TracesConsumerFactory};
use crate::error::BoxError;
use crate::traces::Traces;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tracing::{debug, info};

// =============================================================================
// LOGGING
// =============================================================================

/// How much the logging consumer reports per batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// One event per batch with the span count.
    #[default]
    Basic,
    /// Additionally one event per span.
    Detailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbosity: Verbosity,
}

/// Reports batches as `tracing` events under the configured logger span.
#[derive(Debug)]
pub struct LoggingConsumer {
    verbosity: Verbosity,
    logger: tracing::Span,
}

impl LoggingConsumer {
    pub fn new(verbosity: Verbosity, logger: tracing::Span) -> Self {
        Self { verbosity, logger }
    }
}

impl TracesConsumer for LoggingConsumer {
    async fn consume_traces(&self, traces: Traces) -> Result<(), BoxError> {
        self.logger.in_scope(|| {
            info!(
                resources = traces.resource_count(),
                spans = traces.span_count(),
                "exporting {} spans",
                traces.span_count()
            );

            if self.verbosity == Verbosity::Detailed {
                for scope_spans in traces.resource_spans().iter().flat_map(|rs| &rs.scope_spans) {
                    let scope = scope_spans.scope.as_ref().map_or("", |s| s.name.as_str());
                    for span in &scope_spans.spans {
                        let duration_ns =
                            span.end_time_unix_nano.saturating_sub(span.start_time_unix_nano);
                        debug!(
                            trace_id = %hex::encode(&span.trace_id),
                            span_id = %hex::encode(&span.span_id),
                            name = %span.name,
                            scope,
                            duration_ns,
                            "span"
                        );
                    }
                }
            }
        });
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        self.logger.in_scope(|| debug!("logging consumer shut down"));
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingConsumerFactory;

impl TracesConsumerFactory for LoggingConsumerFactory {
    type Config = LoggingConfig;
    type Consumer = LoggingConsumer;

    fn type_name(&self) -> &str {
        "logging"
    }

    fn create_default_config(&self) -> LoggingConfig {
        LoggingConfig::default()
    }

    async fn create_traces_consumer(
        &self,
        settings: &CreateSettings,
        config: LoggingConfig,
    ) -> Result<LoggingConsumer, BoxError> {
        Ok(LoggingConsumer::new(
            config.verbosity,
            settings.telemetry.logger.clone(),
        ))
    }
}

// =============================================================================
// JSON FILE
// =============================================================================

/// Errors specific to the JSON file consumer.
#[derive(Debug, Error)]
pub enum JsonFileError {
    /// No output path was configured.
    #[error("json file consumer requires a path")]
    EmptyPath,

    /// The consumer was shut down and its file closed.
    #[error("json file consumer is shut down")]
    Closed,

    /// I/O error opening or writing the file.
    #[error("json file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the batch failed.
    #[error("json encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The blocking write task panicked or was aborted.
    #[error("json file write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonFileConfig {
    /// File to append to. Created if missing.
    pub path: PathBuf,
}

impl JsonFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Appends each batch as one `ExportTraceServiceRequest` in OTLP/JSON,
/// followed by a newline.
///
/// Each line is written by a blocking task that owns the bytes, so dropping
/// the `consume_traces` future (deadline, cancellation) never leaves a partial
/// line behind: the write still completes, the caller just stops waiting for
/// it. Lines from concurrent batches never interleave.
#[derive(Debug)]
pub struct JsonFileConsumer {
    path: PathBuf,
    file: Arc<Mutex<Option<File>>>,
    logger: tracing::Span,
}

impl JsonFileConsumer {
    /// Opens (or creates) the file in append mode.
    pub async fn open(
        path: impl Into<PathBuf>,
        logger: tracing::Span,
    ) -> Result<Self, JsonFileError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(JsonFileError::EmptyPath);
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?
            .into_std()
            .await;
        debug!(parent: &logger, path = %path.display(), "opened json file consumer");

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(Some(file))),
            logger,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

fn append_line(file: &Mutex<Option<File>>, line: &[u8]) -> Result<(), JsonFileError> {
    let mut guard = file.lock().unwrap_or_else(PoisonError::into_inner);
    let file = guard.as_mut().ok_or(JsonFileError::Closed)?;
    file.write_all(line)?;
    file.flush()?;
    Ok(())
}

fn close(file: &Mutex<Option<File>>) -> Result<bool, JsonFileError> {
    let mut guard = file.lock().unwrap_or_else(PoisonError::into_inner);
    match guard.take() {
        Some(mut file) => {
            file.flush()?;
            file.sync_all()?;
            Ok(true)
        }
        None => Ok(false),
    }
}

impl TracesConsumer for JsonFileConsumer {
    async fn consume_traces(&self, traces: Traces) -> Result<(), BoxError> {
        let mut line = traces.to_json().map_err(JsonFileError::from)?.into_bytes();
        line.push(b'\n');

        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || append_line(&file, &line))
            .await
            .map_err(JsonFileError::from)??;

        debug!(parent: &self.logger, spans = traces.span_count(), "appended batch");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        let file = Arc::clone(&self.file);
        let closed = tokio::task::spawn_blocking(move || close(&file))
            .await
            .map_err(JsonFileError::from)??;
        if closed {
            debug!(parent: &self.logger, path = %self.path.display(), "closed json file consumer");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileConsumerFactory;

impl TracesConsumerFactory for JsonFileConsumerFactory {
    type Config = JsonFileConfig;
    type Consumer = JsonFileConsumer;

    fn type_name(&self) -> &str {
        "file"
    }

    /// The default has no path, so building from it fails until a path is
    /// set.
    fn create_default_config(&self) -> JsonFileConfig {
        JsonFileConfig::default()
    }

    async fn create_traces_consumer(
        &self,
        settings: &CreateSettings,
        config: JsonFileConfig,
    ) -> Result<JsonFileConsumer, BoxError> {
        let consumer =
            JsonFileConsumer::open(config.path, settings.telemetry.logger.clone()).await?;
        Ok(consumer)
    }
}

// =============================================================================
// NULL
// =============================================================================

/// Consumer that discards all traces.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConsumer;

impl TracesConsumer for NullConsumer {
    async fn consume_traces(&self, _traces: Traces) -> Result<(), BoxError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullConsumerFactory;

impl TracesConsumerFactory for NullConsumerFactory {
    type Config = ();
    type Consumer = NullConsumer;

    fn type_name(&self) -> &str {
        "null"
    }

    fn create_default_config(&self) {}

    async fn create_traces_consumer(
        &self,
        _settings: &CreateSettings,
        _config: (),
    ) -> Result<NullConsumer, BoxError> {
        Ok(NullConsumer)
    }
}
