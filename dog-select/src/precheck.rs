use tracing::debug;

use crate::{ObjectLocation, ObjectStorage, SelectError, SelectResult};

/// Reject a source whose declared length is over `limit`.
///
/// Only the declared `Content-Length` is consulted; the streaming guard is
/// what actually bounds local disk usage.
pub async fn check_source_size(
    storage: &dyn ObjectStorage,
    source: &ObjectLocation,
    limit: u64,
) -> SelectResult<u64> {
    let head = storage.head_object(source).await?;
    debug!(bucket = %source.bucket, key = %source.key, size = head.size_bytes, limit, "source size checked");

    if head.size_bytes > limit {
        return Err(SelectError::SourceTooLarge {
            observed: head.size_bytes,
            limit,
        });
    }
    Ok(head.size_bytes)
}
