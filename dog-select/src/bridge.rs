use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::{
    CancelCell, SelectError, SelectResult, UploadHandlers, UploadReceipt, UploadRequest,
    UploadSubsystem, UploadTaskId,
};

/// Turns a callback-style [`UploadSubsystem`] into a single awaitable upload.
///
/// The subsystem's task id is kept while the upload is in flight so that a
/// concurrent cancellation can abort it. If the task is cancelled before the
/// id is known, the abort is sent as soon as the id arrives.
pub struct UploadBridge {
    uploads: Arc<dyn UploadSubsystem>,
    cancel: Arc<CancelCell>,
    task_id: Mutex<Option<UploadTaskId>>,
    abort_sent: AtomicBool,
}

impl UploadBridge {
    pub fn new(uploads: Arc<dyn UploadSubsystem>, cancel: Arc<CancelCell>) -> Arc<Self> {
        Arc::new(Self {
            uploads,
            cancel,
            task_id: Mutex::new(None),
            abort_sent: AtomicBool::new(false),
        })
    }

    /// Id of the in-flight upload, once the subsystem has reported it
    pub fn task_id(&self) -> Option<UploadTaskId> {
        self.task_id.lock().clone()
    }

    /// Submit `request` and wait for the subsystem's single terminal result
    pub async fn upload(self: &Arc<Self>, request: UploadRequest) -> SelectResult<UploadReceipt> {
        if let Some(error) = self.cancel.error() {
            return Err(error);
        }

        let (tx, rx) = oneshot::channel();
        let bridge = Arc::clone(self);
        let handlers = UploadHandlers::new(
            move |id| bridge.task_ready(id),
            move |result| {
                let _ = tx.send(result);
            },
        );

        debug!(destination = %request.destination, path = %request.local_path.display(), "submitting upload");
        self.uploads.start_upload(request, handlers);

        let result = rx.await.unwrap_or_else(|_| {
            Err(SelectError::upload_failed(
                "upload subsystem dropped the task without reporting a result",
            ))
        });

        *self.task_id.lock() = None;
        result
    }

    /// Abort the in-flight upload if its id is known.
    /// Returns false when there is nothing to abort yet.
    pub fn cancel(&self) -> bool {
        let id = self.task_id.lock().clone();
        match id {
            Some(id) => {
                self.abort(&id);
                true
            }
            None => false,
        }
    }

    fn task_ready(&self, id: UploadTaskId) {
        debug!(upload_id = %id, "upload task ready");
        let cancelled = {
            let mut slot = self.task_id.lock();
            *slot = Some(id.clone());
            self.cancel.is_cancelled()
        };

        if cancelled {
            self.abort(&id);
        }
    }

    fn abort(&self, id: &UploadTaskId) {
        if self.abort_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(upload_id = %id, "aborting upload");
        self.uploads.abort_upload(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectLocation;
    use std::path::PathBuf;

    /// Accepts uploads and loses them
    struct Forgetful;

    impl UploadSubsystem for Forgetful {
        fn start_upload(&self, _request: UploadRequest, handlers: UploadHandlers) {
            drop(handlers);
        }

        fn abort_upload(&self, _id: &UploadTaskId) {}
    }

    fn request() -> UploadRequest {
        UploadRequest {
            destination: ObjectLocation::new("dst", "ap-guangzhou", "out.csv"),
            local_path: PathBuf::from("/tmp/out.csv"),
            content_type: None,
        }
    }

    #[tokio::test]
    async fn test_dropped_handlers_fail_the_upload() {
        let bridge = UploadBridge::new(Arc::new(Forgetful), Arc::new(CancelCell::new()));
        let err = bridge.upload(request()).await.unwrap_err();

        assert!(matches!(err, SelectError::UploadFailed { .. }));
        assert!(bridge.task_id().is_none());
        assert!(!bridge.cancel());
    }

    #[tokio::test]
    async fn test_cancelled_bridge_never_submits() {
        let cancel = Arc::new(CancelCell::new());
        cancel.cancel("stop");
        let bridge = UploadBridge::new(Arc::new(Forgetful), cancel);

        let err = bridge.upload(request()).await.unwrap_err();
        assert!(matches!(err, SelectError::Cancelled { reason } if reason == "stop"));
    }
}
