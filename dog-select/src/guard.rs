use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use pin_project::pin_project;

use crate::{SelectError, SelectResult};

/// Pass-through stream that counts bytes and stops at the first chunk for
/// which `validate(total_seen)` returns false.
///
/// The offending chunk is never yielded; the stream ends with
/// [`SelectError::LocalSizeExceeded`] instead. Errors from the inner stream
/// are forwarded untouched.
#[pin_project]
pub struct ByteCountGuard<S, F> {
    #[pin]
    inner: S,
    validate: F,
    seen: u64,
    tripped: bool,
}

impl<S, F> ByteCountGuard<S, F>
where
    S: Stream<Item = SelectResult<Bytes>>,
    F: FnMut(u64) -> bool,
{
    pub fn new(inner: S, validate: F) -> Self {
        Self {
            inner,
            validate,
            seen: 0,
            tripped: false,
        }
    }

    /// Bytes observed so far, including a rejected chunk
    pub fn seen(&self) -> u64 {
        self.seen
    }
}

impl<S> ByteCountGuard<S, Box<dyn FnMut(u64) -> bool + Send>>
where
    S: Stream<Item = SelectResult<Bytes>>,
{
    /// Guard allowing at most `limit` bytes through
    pub fn with_limit(inner: S, limit: u64) -> Self {
        Self::new(inner, Box::new(move |seen| seen <= limit))
    }
}

impl<S, F> Stream for ByteCountGuard<S, F>
where
    S: Stream<Item = SelectResult<Bytes>>,
    F: FnMut(u64) -> bool,
{
    type Item = SelectResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.tripped {
            return Poll::Ready(None);
        }

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                *this.seen += chunk.len() as u64;
                if (this.validate)(*this.seen) {
                    Poll::Ready(Some(Ok(chunk)))
                } else {
                    *this.tripped = true;
                    Poll::Ready(Some(Err(SelectError::LocalSizeExceeded { seen: *this.seen })))
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{stream, StreamExt};

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = SelectResult<Bytes>> {
        stream::iter(parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_forwards_chunks_within_limit() {
        let guard = ByteCountGuard::with_limit(chunks(&["abc", "def"]), 6);
        let out: Vec<_> = guard.collect().await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), &Bytes::from_static(b"abc"));
        assert_eq!(out[1].as_ref().unwrap(), &Bytes::from_static(b"def"));
    }

    #[tokio::test]
    async fn test_trips_on_first_violating_chunk() {
        let mut guard = ByteCountGuard::with_limit(chunks(&["abc", "defg", "hi"]), 5);

        assert_eq!(guard.next().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
        match guard.next().await {
            Some(Err(SelectError::LocalSizeExceeded { seen })) => assert_eq!(seen, 7),
            other => panic!("expected LocalSizeExceeded, got {:?}", other),
        }
        assert!(guard.next().await.is_none());
        assert_eq!(guard.seen(), 7);
    }

    #[tokio::test]
    async fn test_custom_predicate_and_error_passthrough() {
        let inner = stream::iter(vec![
            Ok(Bytes::from_static(b"x")),
            Err(SelectError::upload_failed("boom")),
        ]);
        let mut calls = Vec::new();
        let mut guard = ByteCountGuard::new(inner, |seen| {
            calls.push(seen);
            true
        });

        assert!(guard.next().await.unwrap().is_ok());
        assert!(matches!(guard.next().await, Some(Err(SelectError::UploadFailed { .. }))));
        assert!(guard.next().await.is_none());
        drop(guard);
        assert_eq!(calls, vec![1]);
    }
}
