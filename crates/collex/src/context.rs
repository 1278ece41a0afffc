//! Caller-supplied deadline and cancellation for export and shutdown.

use crate::error::ExportError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Bounds an export or shutdown call.
///
/// A context may carry a deadline, a cancellation token, both, or neither
/// ([`ExportContext::background`]). When both fire, cancellation wins.
///
/// # Example
///
/// ```ignore
/// let token = CancellationToken::new();
/// let cx = ExportContext::background()
///     .with_timeout(Duration::from_secs(5))
///     .with_cancellation(token.clone());
///
/// exporter.export_with_context(cx, batch).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExportContext {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl ExportContext {
    /// A context that never expires and cannot be cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Sets a deadline `timeout` from now. Keeps the existing deadline if it
    /// is earlier.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Sets an absolute deadline. Keeps the existing deadline if it is
    /// earlier.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Applies a default timeout on top of whatever the caller asked for.
    pub(crate) fn bounded_by(self, timeout: Option<Duration>) -> Self {
        match timeout {
            Some(timeout) => self.with_timeout(timeout),
            None => self,
        }
    }

    /// Drives `fut` to completion unless the deadline passes or the token is
    /// cancelled first. In those cases `fut` is dropped.
    pub(crate) async fn run<F, T>(&self, fut: F) -> Result<T, ExportError>
    where
        F: Future<Output = T>,
    {
        if self.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Err(ExportError::DeadlineExceeded);
        }

        let deadline = self.deadline;
        let bounded = async move {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| ExportError::DeadlineExceeded),
                None => Ok(fut.await),
            }
        };

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(ExportError::Cancelled),
                    res = bounded => res,
                }
            }
            None => bounded.await,
        }
    }
}
