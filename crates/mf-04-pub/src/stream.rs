//! # Response Stream
//!
//! Multicast responses are written by a background collector into a
//! bounded channel and read lazily by the caller. Dropping the stream
//! closes the channel, which stops the collector.

use bytes::Bytes;
use http::Response;
use shared_types::TracedError;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;

pub type ResponseItem = Result<Response<Bytes>, TracedError>;

/// Writing end of a response stream.
pub type ResponseSink = mpsc::Sender<ResponseItem>;

pub struct ResponseStream {
    receiver: mpsc::Receiver<ResponseItem>,
}

impl ResponseStream {
    /// A sink and stream pair holding up to `capacity` unread items.
    pub fn channel(capacity: usize) -> (ResponseSink, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self { receiver })
    }

    /// A stream that is already finished.
    pub fn empty() -> Self {
        let (_, stream) = Self::channel(1);
        stream
    }

    /// A stream holding one item.
    pub fn single(item: ResponseItem) -> Self {
        let (sender, stream) = Self::channel(1);
        // Capacity is one and the receiver is alive
        let _ = sender.try_send(item);
        stream
    }

    pub async fn next(&mut self) -> Option<ResponseItem> {
        self.receiver.recv().await
    }

    /// Drains the stream to the end.
    pub async fn collect_all(mut self) -> Vec<ResponseItem> {
        let mut items = Vec::new();
        while let Some(item) = self.receiver.recv().await {
            items.push(item);
        }
        items
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream").finish_non_exhaustive()
    }
}

impl Stream for ResponseStream {
    type Item = ResponseItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use tokio_stream::StreamExt;

    fn ok(status: u16) -> ResponseItem {
        let mut res = Response::new(Bytes::new());
        *res.status_mut() = StatusCode::from_u16(status).unwrap();
        Ok(res)
    }

    #[tokio::test]
    async fn test_items_arrive_in_order_and_stream_ends() {
        let (sink, stream) = ResponseStream::channel(4);
        tokio::spawn(async move {
            for status in [200, 201, 202] {
                sink.send(ok(status)).await.unwrap();
            }
            sink.send(Err(TracedError::timeout("late"))).await.unwrap();
        });

        let items = stream.collect_all().await;
        assert_eq!(items.len(), 4);
        assert_eq!(items[1].as_ref().unwrap().status(), StatusCode::CREATED);
        assert!(items[3].is_err());
    }

    #[tokio::test]
    async fn test_stream_trait() {
        let mut stream = ResponseStream::single(ok(204));
        let item = StreamExt::next(&mut stream).await.unwrap().unwrap();
        assert_eq!(item.status(), StatusCode::NO_CONTENT);
        assert!(StreamExt::next(&mut stream).await.is_none());

        assert!(ResponseStream::empty().collect_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_stream_closes_sink() {
        let (sink, stream) = ResponseStream::channel(1);
        drop(stream);
        assert!(sink.send(ok(200)).await.is_err());
        assert!(sink.is_closed());
    }
}
