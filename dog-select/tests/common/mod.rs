#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use dog_select::{
    ObjectHead, ObjectLocation, ObjectStorage, SelectConfig, SelectError, SelectQuery, SelectResult,
    SelectStream, SelectType, TaskParameters, UploadHandlers, UploadReceipt, UploadRequest, UploadSubsystem,
    UploadTaskId,
};

/// What one `open_select_stream` call does
#[derive(Debug, Clone)]
pub enum SelectScript {
    /// Yield the chunks, then end cleanly
    Chunks(Vec<&'static [u8]>),
    /// Yield the chunks, then fail with a backend error
    FailAfter(Vec<&'static [u8]>, &'static str),
    /// Yield the chunks, then never produce another item
    Hang(Vec<&'static [u8]>),
    /// Fail before any stream exists
    OpenError(&'static str),
}

/// Object storage double driven by a per-call script.
/// The last script is reused once the queue is down to one entry.
pub struct ScriptedStorage {
    size_bytes: u64,
    hang_head: bool,
    scripts: Mutex<VecDeque<SelectScript>>,
    pub head_calls: AtomicUsize,
    pub head_started: Notify,
    pub select_calls: AtomicUsize,
    pub select_opened: Notify,
}

impl ScriptedStorage {
    pub fn new(size_bytes: u64, scripts: Vec<SelectScript>) -> Arc<Self> {
        Arc::new(Self {
            size_bytes,
            hang_head: false,
            scripts: Mutex::new(scripts.into()),
            head_calls: AtomicUsize::new(0),
            head_started: Notify::new(),
            select_calls: AtomicUsize::new(0),
            select_opened: Notify::new(),
        })
    }

    /// Storage whose metadata lookups never complete
    pub fn unresponsive() -> Arc<Self> {
        Arc::new(Self {
            size_bytes: 0,
            hang_head: true,
            scripts: Mutex::new(VecDeque::new()),
            head_calls: AtomicUsize::new(0),
            head_started: Notify::new(),
            select_calls: AtomicUsize::new(0),
            select_opened: Notify::new(),
        })
    }

    pub fn serving(chunks: Vec<&'static [u8]>) -> Arc<Self> {
        Self::new(1024, vec![SelectScript::Chunks(chunks)])
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> SelectScript {
        let mut scripts = self.scripts.lock();
        if scripts.len() > 1 {
            scripts.pop_front().unwrap()
        } else {
            scripts.front().cloned().unwrap_or(SelectScript::Chunks(Vec::new()))
        }
    }
}

fn chunk_stream(chunks: Vec<&'static [u8]>) -> impl futures_core::Stream<Item = SelectResult<Bytes>> + Send {
    stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c))))
}

#[async_trait]
impl ObjectStorage for ScriptedStorage {
    async fn head_object(&self, _location: &ObjectLocation) -> SelectResult<ObjectHead> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        self.head_started.notify_one();
        if self.hang_head {
            std::future::pending::<()>().await;
        }
        Ok(ObjectHead {
            size_bytes: self.size_bytes,
            ..ObjectHead::default()
        })
    }

    async fn open_select_stream(
        &self,
        _location: &ObjectLocation,
        _select_type: SelectType,
        _query: &SelectQuery,
    ) -> SelectResult<SelectStream> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.next_script();
        self.select_opened.notify_one();

        let stream: SelectStream = match script {
            SelectScript::Chunks(chunks) => Box::pin(chunk_stream(chunks)),
            SelectScript::FailAfter(chunks, message) => Box::pin(chunk_stream(chunks).chain(stream::once(async move {
                Err(SelectError::backend(std::io::Error::other(message)))
            }))),
            SelectScript::Hang(chunks) => Box::pin(chunk_stream(chunks).chain(stream::pending())),
            SelectScript::OpenError(message) => {
                return Err(SelectError::backend(std::io::Error::other(message)))
            }
        };
        Ok(stream)
    }
}

/// What one `start_upload` call does
#[derive(Debug, Clone, Copy)]
pub enum UploadScript {
    /// Report ready, then succeed with the scratch file's size
    Succeed,
    /// Report ready, then fail
    Fail(&'static str),
    /// Report ready, then wait for an abort
    HoldUntilAbort,
    /// Wait for [`ScriptedUploads::release`] before reporting ready, then wait for an abort
    DeferReady,
}

/// Callback-style upload double that records what it was asked to do
pub struct ScriptedUploads {
    scripts: Mutex<VecDeque<UploadScript>>,
    started: AtomicUsize,
    tokens: Arc<Mutex<HashMap<UploadTaskId, CancellationToken>>>,
    aborted: Mutex<Vec<UploadTaskId>>,
    uploaded: Arc<Mutex<Vec<(UploadRequest, Vec<u8>)>>>,
    /// Notified when a submitted upload starts waiting (after ready, or before it for `DeferReady`)
    pub waiting: Arc<Notify>,
    release: Arc<Notify>,
}

impl ScriptedUploads {
    pub fn new(scripts: Vec<UploadScript>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            started: AtomicUsize::new(0),
            tokens: Arc::new(Mutex::new(HashMap::new())),
            aborted: Mutex::new(Vec::new()),
            uploaded: Arc::new(Mutex::new(Vec::new())),
            waiting: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(vec![UploadScript::Succeed])
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> Vec<UploadTaskId> {
        self.aborted.lock().clone()
    }

    /// Requests that completed, with the scratch file content seen at upload time
    pub fn uploaded(&self) -> Vec<(UploadRequest, Vec<u8>)> {
        self.uploaded.lock().clone()
    }

    /// Let a `DeferReady` upload report its id
    pub fn release(&self) {
        self.release.notify_one();
    }

    fn next_script(&self) -> UploadScript {
        let mut scripts = self.scripts.lock();
        if scripts.len() > 1 {
            scripts.pop_front().unwrap()
        } else {
            scripts.front().copied().unwrap_or(UploadScript::Succeed)
        }
    }
}

impl UploadSubsystem for ScriptedUploads {
    fn start_upload(&self, request: UploadRequest, handlers: UploadHandlers) {
        let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let id = UploadTaskId::from_string(format!("upload-{}", n));
        let token = CancellationToken::new();
        self.tokens.lock().insert(id.clone(), token.clone());

        let script = self.next_script();
        let tokens = self.tokens.clone();
        let uploaded = self.uploaded.clone();
        let waiting = self.waiting.clone();
        let release = self.release.clone();

        tokio::spawn(async move {
            let UploadHandlers {
                on_task_ready,
                on_finish,
            } = handlers;

            let result = match script {
                UploadScript::Succeed => {
                    on_task_ready(id.clone());
                    match tokio::fs::read(&request.local_path).await {
                        Ok(content) => {
                            let receipt = UploadReceipt::new(request.destination.clone(), content.len() as u64);
                            uploaded.lock().push((request, content));
                            Ok(receipt)
                        }
                        Err(e) => Err(SelectError::from(e)),
                    }
                }
                UploadScript::Fail(message) => {
                    on_task_ready(id.clone());
                    Err(SelectError::upload_failed(message))
                }
                UploadScript::HoldUntilAbort => {
                    on_task_ready(id.clone());
                    waiting.notify_one();
                    token.cancelled().await;
                    Err(SelectError::upload_failed("upload aborted"))
                }
                UploadScript::DeferReady => {
                    waiting.notify_one();
                    release.notified().await;
                    on_task_ready(id.clone());
                    token.cancelled().await;
                    Err(SelectError::upload_failed("upload aborted"))
                }
            };

            tokens.lock().remove(&id);
            on_finish(result);
        });
    }

    fn abort_upload(&self, id: &UploadTaskId) {
        self.aborted.lock().push(id.clone());
        if let Some(token) = self.tokens.lock().get(id) {
            token.cancel();
        }
    }
}

pub fn source() -> ObjectLocation {
    ObjectLocation::new("logs", "ap-guangzhou", "2024/01/report.csv")
}

pub fn test_config() -> SelectConfig {
    SelectConfig::default().with_retry_delay(Duration::from_millis(5))
}

pub fn params_with(dir: &Path, name: &str, config: SelectConfig) -> TaskParameters {
    TaskParameters::builder(source(), SelectQuery::sql("select * from COSObject"))
        .target("results", "ap-guangzhou")
        .scratch_path(dir.join(name))
        .config(config)
        .build()
        .unwrap()
}

pub fn params(dir: &Path, config: SelectConfig) -> TaskParameters {
    params_with(dir, "result.csv", config)
}

/// Fail the test instead of hanging when a task never settles
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("Timeout waiting for task")
}
