use std::fmt;

use thiserror::Error;

/// Result type for select transfer operations
pub type SelectResult<T> = Result<T, SelectError>;

/// Errors that can occur while running a select transfer
#[derive(Error, Debug)]
pub enum SelectError {
    #[error("Source object too large: {observed} bytes (limit: {limit})")]
    SourceTooLarge { observed: u64, limit: u64 },

    #[error("Local size limit exceeded after {seen} bytes")]
    LocalSizeExceeded { seen: u64 },

    #[error("Task cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl SelectError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create an upload failed error
    pub fn upload_failed<S: Into<String>>(reason: S) -> Self {
        Self::UploadFailed {
            reason: reason.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(reason: S) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Whether another attempt may succeed where this one failed.
    ///
    /// Size violations, cancellation and invalid input are final; every other
    /// failure is treated as transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::SourceTooLarge { .. }
                | Self::LocalSizeExceeded { .. }
                | Self::Cancelled { .. }
                | Self::Invalid { .. }
        )
    }
}

/// The pipeline phase a failure originated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Precheck,
    Pipeline,
    Upload,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precheck => "precheck",
            Self::Pipeline => "pipeline",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure tagged with the phase that produced it
#[derive(Error, Debug)]
#[error("[{phase}] {error}")]
pub struct TaskError {
    pub phase: Phase,
    #[source]
    pub error: SelectError,
}

impl TaskError {
    pub fn new(phase: Phase, error: SelectError) -> Self {
        Self { phase, error }
    }

    /// Phase the failure was raised in
    pub fn trace(&self) -> Phase {
        self.phase
    }

    pub fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }
}
