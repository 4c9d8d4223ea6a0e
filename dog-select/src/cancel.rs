use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

use crate::SelectError;

/// Reason used when a task is cancelled without one
pub const DEFAULT_CANCEL_REASON: &str = "task cancelled";

/// Write-once cancellation cell shared by every phase of a task.
///
/// The first reason recorded wins; later calls are no-ops. There is no way
/// to un-cancel.
#[derive(Debug, Default)]
pub struct CancelCell {
    reason: OnceLock<String>,
    token: CancellationToken,
}

impl CancelCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `reason`. Returns false if the cell was already set.
    pub fn cancel<S: Into<String>>(&self, reason: S) -> bool {
        let first = self.reason.set(reason.into()).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason.get().is_some()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// The recorded reason as an error, if cancelled
    pub fn error(&self) -> Option<SelectError> {
        self.reason().map(SelectError::cancelled)
    }

    /// Resolves once the cell is set
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
