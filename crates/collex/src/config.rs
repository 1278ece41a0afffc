//! Construction-time settings for consumers and adapters.

use opentelemetry_sdk::trace::SdkTracerProvider;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity of the binary hosting the exporter, passed to consumer factories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Executable name.
    pub command: String,
    /// Human readable description.
    pub description: String,
    /// Version string.
    pub version: String,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            command: "collex".to_owned(),
            description: "OpenTelemetry Collector to OpenTelemetry SDK translator".to_owned(),
            version: "latest".to_owned(),
        }
    }
}

/// Where a consumer and its adapter emit their own diagnostics.
#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    /// Parent span for every diagnostic event. Consumers that log should
    /// enter it or instrument their futures with it.
    pub logger: tracing::Span,

    /// Provider for consumers that trace their own work.
    ///
    /// Default: none. Must not be the provider this exporter is registered
    /// with, or the consumer's spans would feed back into it.
    pub tracer_provider: Option<SdkTracerProvider>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            logger: tracing::info_span!("collex"),
            tracer_provider: None,
        }
    }
}

impl TelemetrySettings {
    pub fn with_logger(logger: tracing::Span) -> Self {
        Self {
            logger,
            tracer_provider: None,
        }
    }

    pub fn with_tracer_provider(mut self, provider: SdkTracerProvider) -> Self {
        self.tracer_provider = Some(provider);
        self
    }
}

/// Settings handed to a consumer factory when it builds a consumer.
#[derive(Debug, Clone, Default)]
pub struct CreateSettings {
    pub build_info: BuildInfo,
    pub telemetry: TelemetrySettings,
}

impl CreateSettings {
    pub fn with_build_info(mut self, build_info: BuildInfo) -> Self {
        self.build_info = build_info;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetrySettings) -> Self {
        self.telemetry = telemetry;
        self
    }
}

/// Adapter behavior independent of the wrapped consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Upper bound on each export, applied on top of the caller's deadline.
    ///
    /// Default: none (the caller's context alone bounds the call)
    pub export_timeout: Option<Duration>,

    /// Upper bound on shutdown, applied on top of the caller's deadline.
    ///
    /// Default: none
    pub shutdown_timeout: Option<Duration>,
}

impl AdapterConfig {
    /// Sets the export timeout.
    pub fn with_export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout = Some(timeout);
        self
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }
}
