//! # dog-select: Cancellable select-query transfers
//!
//! `dog-select` runs a server-side select query against a remote object,
//! streams the result into a bounded local scratch file and uploads that file
//! to a derived destination key. Each transfer is a [`SelectTask`] with a
//! retry budget and a cancel switch that reaches whichever phase is active.
//!
//! ## Key Features
//!
//! - **Precheck**: oversized sources are rejected from their declared length before any query runs
//! - **Bounded scratch space**: the select stream is metered and cut off at the local size limit
//! - **Retries**: transient failures are retried, size violations and cancellation are not
//! - **Cancellation**: a single `cancel_task` call stops a precheck, a running stream or an upload
//! - **Storage agnostic**: collaborators are traits; an S3-compatible client is included
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dog_select::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> SelectResult<()> {
//! let store = Arc::new(dog_select::S3CompatibleStore::from_env().await?);
//!
//! let source = ObjectLocation::new("logs", "ap-guangzhou", "2024/01/report.csv");
//! let query = SelectQuery::sql("select * from COSObject s where s.level = 'ERROR'");
//! let params = TaskParameters::builder(source, query)
//!     .config(SelectConfig::from_env(dog_select::ENV_PREFIX)?)
//!     .build()?;
//!
//! let task = SelectTask::with_store(params, store);
//! let outcome = task.run_task().await;
//! if let Some(receipt) = outcome.result {
//!     println!("uploaded {} bytes to {}", receipt.size_bytes, receipt.destination);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │    SelectTask    │  ← retries, state, cancellation
//! ├──────────────────┤
//! │ precheck         │  ← ObjectStorage::head_object
//! │ SelectPipeline   │  ← select stream → ByteCountGuard → LocalSink
//! │ UploadBridge     │  ← UploadSubsystem callbacks → one awaited result
//! └──────────────────┘
//! ```

mod bridge;
mod cancel;
mod config;
mod error;
mod guard;
mod orchestrator;
mod params;
mod pipeline;
mod precheck;
pub mod query;
mod receipt;
mod s3_store;
mod sink;
pub mod store;
mod summary;
mod types;

// Re-export main types for clean API
pub use bridge::UploadBridge;
pub use cancel::{CancelCell, DEFAULT_CANCEL_REASON};
pub use config::{SelectConfig, ENV_PREFIX};
pub use error::{Phase, SelectError, SelectResult, TaskError};
pub use guard::ByteCountGuard;
pub use orchestrator::{RunOutcome, SelectTask};
pub use params::{render_target_key, TaskParameters, TaskParametersBuilder};
pub use pipeline::{Relay, SelectPipeline};
pub use precheck::check_source_size;
pub use query::{OutputSerialization, SelectQuery};
pub use receipt::{UploadInfo, UploadReceipt};
pub use s3_store::{S3CompatibleStore, S3Config};
pub use sink::LocalSink;
pub use store::{FinishFn, ObjectStorage, TaskReadyFn, UploadHandlers, UploadSubsystem};
pub use summary::{run_all, OutcomeSummary, SummaryStatus, SUMMARY_DETAIL_LIMIT};
pub use types::{ObjectHead, ObjectLocation, SelectStream, SelectType, TaskState, UploadRequest, UploadTaskId};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ObjectLocation, ObjectStorage, RunOutcome, SelectConfig, SelectError, SelectQuery, SelectResult,
        SelectTask, TaskParameters, UploadSubsystem,
    };
}
