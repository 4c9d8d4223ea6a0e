use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    ByteCountGuard, LocalSink, ObjectLocation, ObjectStorage, SelectError, SelectQuery, SelectResult,
    SelectType,
};

/// Injection point into a running pipeline.
///
/// An error pushed through [`Relay::inject`] fails the pipeline at its next
/// suspension point. Only the first injection is delivered.
#[derive(Debug)]
pub struct Relay {
    tx: Mutex<Option<oneshot::Sender<SelectError>>>,
}

impl Relay {
    fn new() -> (Arc<Self>, oneshot::Receiver<SelectError>) {
        let (tx, rx) = oneshot::channel();
        (Arc::new(Self { tx: Mutex::new(Some(tx)) }), rx)
    }

    /// Returns false if an error was already injected or the pipeline is gone
    pub fn inject(&self, error: SelectError) -> bool {
        match self.tx.lock().take() {
            Some(tx) => tx.send(error).is_ok(),
            None => false,
        }
    }
}

/// Remote select stream → byte-count guard → local scratch file
pub struct SelectPipeline {
    storage: Arc<dyn ObjectStorage>,
    source: ObjectLocation,
    select_type: SelectType,
    query: SelectQuery,
    scratch_path: PathBuf,
    local_size_limit: u64,
    relay: Arc<Relay>,
    injected: oneshot::Receiver<SelectError>,
}

impl SelectPipeline {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        source: ObjectLocation,
        select_type: SelectType,
        query: SelectQuery,
        scratch_path: PathBuf,
        local_size_limit: u64,
    ) -> Self {
        let (relay, injected) = Relay::new();
        Self {
            storage,
            source,
            select_type,
            query,
            scratch_path,
            local_size_limit,
            relay,
            injected,
        }
    }

    /// Handle for failing this pipeline from outside
    pub fn relay(&self) -> Arc<Relay> {
        self.relay.clone()
    }

    /// Drain the select result into the scratch file.
    ///
    /// The first error from any stage, or an injected one, ends the run;
    /// the remote stream and the file handle are dropped with it.
    pub async fn run(self) -> SelectResult<u64> {
        let Self {
            storage,
            source,
            select_type,
            query,
            scratch_path,
            local_size_limit,
            relay: _relay,
            mut injected,
        } = self;

        let pump = async move {
            let remote = storage.open_select_stream(&source, select_type, &query).await?;
            let mut guarded = ByteCountGuard::with_limit(remote, local_size_limit);
            let mut sink = LocalSink::create(&scratch_path).await?;

            while let Some(chunk) = guarded.next().await {
                sink.write(&chunk?).await?;
            }

            let written = sink.finish().await?;
            debug!(key = %source.key, path = %scratch_path.display(), written, "select result written");
            Ok::<_, SelectError>(written)
        };

        tokio::select! {
            biased;
            Ok(error) = &mut injected => Err(error),
            result = pump => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ObjectHead, SelectStream};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream;

    /// Streams two chunks and then stalls
    struct Stalling;

    #[async_trait]
    impl ObjectStorage for Stalling {
        async fn head_object(&self, _location: &ObjectLocation) -> SelectResult<ObjectHead> {
            Ok(ObjectHead::default())
        }

        async fn open_select_stream(
            &self,
            _location: &ObjectLocation,
            _select_type: SelectType,
            _query: &SelectQuery,
        ) -> SelectResult<SelectStream> {
            let chunks = stream::iter(vec![Ok(Bytes::from_static(b"a,b\n")), Ok(Bytes::from_static(b"1,2\n"))]);
            Ok(Box::pin(chunks.chain(stream::pending())))
        }
    }

    #[tokio::test]
    async fn test_injected_error_ends_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = SelectPipeline::new(
            Arc::new(Stalling),
            ObjectLocation::new("logs", "ap-guangzhou", "a.csv"),
            SelectType::default(),
            SelectQuery::sql("select * from COSObject"),
            dir.path().join("out.csv"),
            1024,
        );
        let relay = pipeline.relay();

        let running = tokio::spawn(pipeline.run());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(relay.inject(SelectError::cancelled("stop")));
        assert!(!relay.inject(SelectError::cancelled("again")));

        let result = running.await.unwrap();
        assert!(matches!(result, Err(SelectError::Cancelled { reason }) if reason == "stop"));
    }
}
