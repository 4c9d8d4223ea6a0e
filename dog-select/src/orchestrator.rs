use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::cancel::DEFAULT_CANCEL_REASON;
use crate::pipeline::Relay;
use crate::{
    precheck, CancelCell, ObjectStorage, Phase, SelectError, SelectPipeline, SelectResult, TaskError,
    TaskParameters, TaskState, UploadBridge, UploadReceipt, UploadRequest, UploadSubsystem,
};

/// Final record of a task run.
///
/// Exactly one of `result` and `error` is set.
#[derive(Debug)]
pub struct RunOutcome {
    pub params: TaskParameters,
    pub result: Option<UploadReceipt>,
    pub error: Option<TaskError>,
    pub attempts: u32,
}

impl RunOutcome {
    fn succeeded(params: TaskParameters, receipt: UploadReceipt, attempts: u32) -> Self {
        Self {
            params,
            result: Some(receipt),
            error: None,
            attempts,
        }
    }

    fn failed(params: TaskParameters, error: TaskError, attempts: u32) -> Self {
        Self {
            params,
            result: None,
            error: Some(error),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Phase resources the cancellation path may need to reach
#[derive(Default)]
struct PipelineHandle {
    relay: Option<Arc<Relay>>,
    upload: Option<Arc<UploadBridge>>,
}

/// One select transfer: precheck, select into a scratch file, upload.
///
/// Construct one per transfer and call [`SelectTask::run_task`] once.
/// [`SelectTask::cancel_task`] may be called from anywhere at any time.
pub struct SelectTask {
    params: TaskParameters,
    storage: Arc<dyn ObjectStorage>,
    uploads: Arc<dyn UploadSubsystem>,
    cancel: Arc<CancelCell>,
    handle: Mutex<PipelineHandle>,
    state: Mutex<TaskState>,
    started: AtomicBool,
}

impl SelectTask {
    pub fn new(
        params: TaskParameters,
        storage: Arc<dyn ObjectStorage>,
        uploads: Arc<dyn UploadSubsystem>,
    ) -> Self {
        Self {
            params,
            storage,
            uploads,
            cancel: Arc::new(CancelCell::new()),
            handle: Mutex::new(PipelineHandle::default()),
            state: Mutex::new(TaskState::Idle),
            started: AtomicBool::new(false),
        }
    }

    /// Create a task against a store that provides both collaborators
    pub fn with_store<S>(params: TaskParameters, store: Arc<S>) -> Self
    where
        S: ObjectStorage + UploadSubsystem + 'static,
    {
        let storage: Arc<dyn ObjectStorage> = store.clone();
        let uploads: Arc<dyn UploadSubsystem> = store;
        Self::new(params, storage, uploads)
    }

    pub fn params(&self) -> &TaskParameters {
        &self.params
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the task to completion, retrying transient failures.
    ///
    /// Never fails: the outcome carries either the upload receipt or the
    /// last phase-tagged error.
    #[instrument(skip(self), fields(source = %self.params.source, destination = %self.params.destination))]
    pub async fn run_task(&self) -> RunOutcome {
        if self.started.swap(true, Ordering::SeqCst) {
            let error = TaskError::new(Phase::Precheck, SelectError::invalid("task has already been run"));
            return RunOutcome::failed(self.params.clone(), error, 0);
        }

        let max_attempts = self.params.max_try_time.max(1);
        let mut attempts = 0;

        let error = loop {
            attempts += 1;
            let error = match self.run_task_once().await {
                Ok(receipt) => {
                    self.set_state(TaskState::Succeeded);
                    info!(attempts, size = receipt.size_bytes, "select task succeeded");
                    return RunOutcome::succeeded(self.params.clone(), receipt, attempts);
                }
                Err(error) => error,
            };

            if self.cancel.is_cancelled() {
                warn!(attempt = attempts, error = %error, "task cancelled, not retrying");
                break error;
            }
            if !error.is_retryable() {
                warn!(attempt = attempts, error = %error, "permanent failure, not retrying");
                break error;
            }
            if attempts >= max_attempts {
                warn!(attempt = attempts, error = %error, "retry budget exhausted");
                break error;
            }

            warn!(attempt = attempts, max_attempts, error = %error, "attempt failed, retrying");
            if !self.pause_before_retry().await {
                break error;
            }
        };

        let state = if self.cancel.is_cancelled() {
            TaskState::Cancelled
        } else {
            TaskState::Failed
        };
        self.set_state(state);

        RunOutcome::failed(self.params.clone(), error, attempts)
    }

    /// Cancel with `reason`. Only the first call has any effect.
    ///
    /// Returns immediately; the active phase fails at its next suspension
    /// point and no further attempt is started.
    pub fn cancel_task<S: Into<String>>(&self, reason: S) {
        let reason = reason.into();
        if !self.cancel.cancel(reason.clone()) {
            debug!("task already cancelled");
            return;
        }
        info!(reason = %reason, state = ?self.state(), "cancelling select task");

        let (relay, upload) = {
            let handle = self.handle.lock();
            (handle.relay.clone(), handle.upload.clone())
        };

        if let Some(relay) = relay {
            relay.inject(SelectError::cancelled(reason));
        }
        if let Some(bridge) = upload {
            bridge.cancel();
        }
    }

    /// Cancel with the default reason
    pub fn cancel(&self) {
        self.cancel_task(DEFAULT_CANCEL_REASON);
    }

    async fn run_task_once(&self) -> Result<UploadReceipt, TaskError> {
        self.set_state(TaskState::Running(Phase::Precheck));
        self.precheck()
            .await
            .map_err(|e| TaskError::new(Phase::Precheck, e))?;

        self.set_state(TaskState::Running(Phase::Pipeline));
        self.run_pipeline()
            .await
            .map_err(|e| TaskError::new(Phase::Pipeline, e))?;

        self.set_state(TaskState::Running(Phase::Upload));
        self.run_upload()
            .await
            .map_err(|e| TaskError::new(Phase::Upload, e))
    }

    async fn precheck(&self) -> SelectResult<u64> {
        if let Some(error) = self.cancel.error() {
            return Err(error);
        }

        let check = precheck::check_source_size(
            self.storage.as_ref(),
            &self.params.source,
            self.params.source_size_limit,
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled_error()),
            result = check => result,
        }
    }

    async fn run_pipeline(&self) -> SelectResult<u64> {
        let pipeline = SelectPipeline::new(
            self.storage.clone(),
            self.params.source.clone(),
            self.params.select_type,
            self.params.query.clone(),
            self.params.scratch_path.clone(),
            self.params.local_size_limit,
        );

        {
            let relay = pipeline.relay();
            let mut handle = self.handle.lock();
            handle.relay = Some(relay.clone());
            if let Some(error) = self.cancel.error() {
                relay.inject(error);
            }
        }

        let result = pipeline.run().await;
        self.handle.lock().relay = None;
        result
    }

    async fn run_upload(&self) -> SelectResult<UploadReceipt> {
        let bridge = UploadBridge::new(self.uploads.clone(), self.cancel.clone());

        {
            let mut handle = self.handle.lock();
            if let Some(error) = self.cancel.error() {
                return Err(error);
            }
            handle.upload = Some(bridge.clone());
        }

        let request = UploadRequest {
            destination: self.params.destination.clone(),
            local_path: self.params.scratch_path.clone(),
            content_type: Some(self.params.content_type().to_string()),
        };

        let result = bridge.upload(request).await;
        self.handle.lock().upload = None;
        result
    }

    /// Wait out the retry delay. Returns false if cancelled meanwhile.
    async fn pause_before_retry(&self) -> bool {
        let delay = self.params.retry_delay;
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn cancelled_error(&self) -> SelectError {
        self.cancel
            .error()
            .unwrap_or_else(|| SelectError::cancelled(DEFAULT_CANCEL_REASON))
    }

    fn set_state(&self, state: TaskState) {
        *self.state.lock() = state;
    }
}
