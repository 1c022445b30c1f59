use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

/// Frames the pump may run ahead of the socket writer.
pub const CLIENT_CHANNEL_CAPACITY: usize = 8;

/// The client side of the response is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client writer closed")]
pub struct SinkClosed;

/// Writer for encoded event frames.
///
/// Every successful `send` hands the frame to the connection immediately; there is
/// no batching above this trait.
pub trait EventSink: Send {
    /// Whether frames reach the peer as they are sent rather than at end of body.
    fn supports_flush(&self) -> bool {
        true
    }

    fn send(&mut self, frame: Bytes) -> impl Future<Output = Result<(), SinkClosed>> + Send;
}

/// Sink feeding the streaming response body.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl EventSink for ChannelSink {
    async fn send(&mut self, frame: Bytes) -> Result<(), SinkClosed> {
        self.tx.send(frame).await.map_err(|_| SinkClosed)
    }
}

/// Response body half of [`client_channel`].
///
/// Dropping it (the server does so when the peer disconnects) fires the request's
/// cancellation token through the held guard.
pub struct ClientBodyStream {
    rx: mpsc::Receiver<Bytes>,
    _disconnect: DropGuard,
}

impl Stream for ClientBodyStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

/// Pair a sink with the body stream that drains it.
#[must_use]
pub fn client_channel(disconnect: DropGuard) -> (ChannelSink, ClientBodyStream) {
    let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
    (
        ChannelSink { tx },
        ClientBodyStream {
            rx,
            _disconnect: disconnect,
        },
    )
}
