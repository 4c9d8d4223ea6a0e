use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::pin::Pin;
use uuid::Uuid;

use crate::SelectResult;

/// Stream of result bytes coming back from a select query
pub type SelectStream = Pin<Box<dyn Stream<Item = SelectResult<Bytes>> + Send>>;

/// Bucket, region and key of a remote object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub region: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new<B, R, K>(bucket: B, region: R, key: K) -> Self
    where
        B: Into<String>,
        R: Into<String>,
        K: Into<String>,
    {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({})", self.bucket, self.key, self.region)
    }
}

/// Opaque select dialect selector forwarded to the storage client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectType(pub u32);

impl Default for SelectType {
    fn default() -> Self {
        Self(2)
    }
}

/// Handle issued by an upload subsystem for one in-flight upload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadTaskId(pub String);

impl UploadTaskId {
    /// Generate a new random upload task ID
    pub fn new() -> Self {
        Self(format!("upl_{}", Uuid::new_v4().simple()))
    }

    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadTaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UploadTaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A request to move a local file to a destination object
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub destination: ObjectLocation,
    pub local_path: PathBuf,
    pub content_type: Option<String>,
}

/// Metadata about a remote object
#[derive(Debug, Clone, Default)]
pub struct ObjectHead {
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<i64>,
}

/// Where a task currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running(crate::Phase),
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}
