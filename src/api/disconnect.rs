use crate::core::metrics::try_get_metrics;
use crate::core::StreamCancelHandle;
use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A stream wrapper that triggers a cancellation handle when dropped.
/// This allows detecting when the client disconnects (stops consuming the stream).
pub struct DisconnectStream<S> {
    pub stream: S,
    pub cancel_handle: StreamCancelHandle,
}

impl<S> DisconnectStream<S> {
    pub fn new(stream: S, cancel_handle: StreamCancelHandle) -> Self {
        Self {
            stream,
            cancel_handle,
        }
    }
}

impl<S, E> Stream for DisconnectStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl<S> Drop for DisconnectStream<S> {
    fn drop(&mut self) {
        // Dropped both on normal completion and on disconnect; only the
        // latter leaves the handle uncompleted.
        if !self.cancel_handle.is_completed() {
            tracing::info!("Client disconnect detected - cancelling upstream stream");
            if let Some(metrics) = try_get_metrics() {
                metrics.client_disconnects_total.inc();
            }
        }
        self.cancel_handle.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::convert::Infallible;

    fn body_stream() -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
        futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Ok(Bytes::from_static(b"data: b\n\n")),
        ])
    }

    #[tokio::test]
    async fn test_drop_before_completion_cancels() {
        let handle = StreamCancelHandle::new();
        let mut stream = DisconnectStream::new(body_stream(), handle.clone());

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"data: a\n\n"));
        drop(stream);

        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_drop_after_completion_does_not_cancel() {
        let handle = StreamCancelHandle::new();
        let stream = DisconnectStream::new(body_stream(), handle.clone());

        // The relay marks completion when it emits the terminal event.
        handle.mark_completed();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);

        assert!(!handle.is_cancelled());
    }
}
