//! Error types for adapter construction and export.

use thiserror::Error;

/// Boxed error type exchanged with traces consumers and their factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned while building a span exporter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The consumer factory failed. The factory's error is kept as is.
    #[error("failed to create traces consumer: {0}")]
    Consumer(BoxError),

    /// The consumer configuration could not be parsed.
    #[error("invalid consumer configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

/// Errors returned by export and shutdown.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The traces consumer rejected the data. The consumer's error is kept as
    /// is and can be downcast through [`ExportError::forwarded`].
    #[error("traces consumer failed: {0}")]
    Forward(BoxError),

    /// The exporter has been shut down.
    #[error("exporter is shut down")]
    Closed,

    /// The caller's deadline passed before the forward completed.
    #[error("export deadline exceeded")]
    DeadlineExceeded,

    /// The caller cancelled the operation.
    #[error("export cancelled")]
    Cancelled,
}

impl ExportError {
    /// Returns `true` for deadline expiry and explicit cancellation.
    #[inline]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Cancelled)
    }

    /// Returns `true` if the exporter was already shut down.
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Borrows the consumer's error, if this is a forward failure.
    pub fn forwarded(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Forward(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Takes ownership of the consumer's error, if this is a forward failure.
    pub fn into_forwarded(self) -> Option<BoxError> {
        match self {
            Self::Forward(err) => Some(err),
            _ => None,
        }
    }
}
