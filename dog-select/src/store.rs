use async_trait::async_trait;

use crate::{
    ObjectHead, ObjectLocation, SelectQuery, SelectResult, SelectStream, SelectType, UploadReceipt,
    UploadRequest, UploadTaskId,
};

/// Read-side object storage operations a select transfer depends on
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Fetch object metadata without content
    async fn head_object(&self, location: &ObjectLocation) -> SelectResult<ObjectHead>;

    /// Run a select query against an object and stream back the result bytes
    async fn open_select_stream(
        &self,
        location: &ObjectLocation,
        select_type: SelectType,
        query: &SelectQuery,
    ) -> SelectResult<SelectStream>;
}

/// Called once the subsystem has assigned an id to a submitted upload
pub type TaskReadyFn = Box<dyn FnOnce(UploadTaskId) + Send>;

/// Called exactly once with the final result of a submitted upload
pub type FinishFn = Box<dyn FnOnce(SelectResult<UploadReceipt>) + Send>;

/// Callbacks handed to [`UploadSubsystem::start_upload`]
pub struct UploadHandlers {
    pub on_task_ready: TaskReadyFn,
    pub on_finish: FinishFn,
}

impl UploadHandlers {
    pub fn new<R, F>(on_task_ready: R, on_finish: F) -> Self
    where
        R: FnOnce(UploadTaskId) + Send + 'static,
        F: FnOnce(SelectResult<UploadReceipt>) + Send + 'static,
    {
        Self {
            on_task_ready: Box::new(on_task_ready),
            on_finish: Box::new(on_finish),
        }
    }
}

/// Fire-and-callback upload service.
///
/// `start_upload` returns immediately; progress is reported through the
/// handlers. Implementations must call `on_finish` exactly once, including
/// after `abort_upload`.
pub trait UploadSubsystem: Send + Sync {
    fn start_upload(&self, request: UploadRequest, handlers: UploadHandlers);

    /// Ask the subsystem to stop the upload identified by `id`.
    /// Unknown or finished ids are ignored.
    fn abort_upload(&self, id: &UploadTaskId);
}
