use serde::{Deserialize, Serialize};

use crate::ObjectLocation;

/// Receipt returned after the select result has been uploaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub destination: ObjectLocation,
    pub size_bytes: u64,
    pub etag: Option<String>,
    pub created_at: i64,
    pub upload: UploadInfo,
}

/// Information about how the artifact was uploaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UploadInfo {
    /// Single-shot upload
    Single {
        method: String, // "put"
    },
    /// Multipart upload
    Multipart {
        upload_id: String,
        part_size: u64,
        parts: u32,
    },
}

impl UploadReceipt {
    pub fn new(destination: ObjectLocation, size_bytes: u64) -> Self {
        Self {
            destination,
            size_bytes,
            etag: None,
            created_at: chrono::Utc::now().timestamp(),
            upload: UploadInfo::Single {
                method: "put".to_string(),
            },
        }
    }

    pub fn with_etag<S: Into<String>>(mut self, etag: S) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_upload_info(mut self, upload: UploadInfo) -> Self {
        self.upload = upload;
        self
    }
}
