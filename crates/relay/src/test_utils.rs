//! In-memory transport and dialer for session tests

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc as fmpsc;
use futures::{Sink, Stream, StreamExt};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use edgerelay_core::Destination;

use crate::{Dialer, TransportError, TransportFrame};

pub const TOKEN: &str = "d342d11e-d424-4583-b36e-524ab1f0afa4";

/// Session side of an in-memory transport
pub struct ChannelTransport {
    incoming: fmpsc::UnboundedReceiver<Result<Bytes, TransportError>>,
    outgoing: fmpsc::UnboundedSender<TransportFrame>,
}

/// Test side of an in-memory transport
pub struct ChannelClient {
    tx: fmpsc::UnboundedSender<Result<Bytes, TransportError>>,
    rx: fmpsc::UnboundedReceiver<TransportFrame>,
}

pub fn channel_transport() -> (ChannelTransport, ChannelClient) {
    let (in_tx, in_rx) = fmpsc::unbounded();
    let (out_tx, out_rx) = fmpsc::unbounded();
    (
        ChannelTransport {
            incoming: in_rx,
            outgoing: out_tx,
        },
        ChannelClient { tx: in_tx, rx: out_rx },
    )
}

impl ChannelClient {
    pub fn send(&self, message: Bytes) {
        let _ = self.tx.unbounded_send(Ok(message));
    }

    /// End the inbound stream, as a client disconnect would
    pub fn close(&self) {
        self.tx.close_channel();
    }

    pub async fn next_frame(&mut self) -> Option<TransportFrame> {
        self.rx.next().await
    }
}

impl Stream for ChannelTransport {
    type Item = Result<Bytes, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.incoming).poll_next(cx)
    }
}

impl Sink<TransportFrame> for ChannelTransport {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.outgoing.is_closed() {
            return Poll::Ready(Err(TransportError::Closed));
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: TransportFrame) -> Result<(), Self::Error> {
        self.outgoing.unbounded_send(item).map_err(|_| TransportError::Closed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.outgoing.close_channel();
        Poll::Ready(Ok(()))
    }
}

/// Transport whose sink never accepts a frame, like a peer that stopped
/// reading with its receive window full
pub struct StalledTransport {
    incoming: fmpsc::UnboundedReceiver<Result<Bytes, TransportError>>,
}

pub fn stalled_transport() -> (StalledTransport, fmpsc::UnboundedSender<Result<Bytes, TransportError>>) {
    let (tx, rx) = fmpsc::unbounded();
    (StalledTransport { incoming: rx }, tx)
}

impl Stream for StalledTransport {
    type Item = Result<Bytes, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.incoming).poll_next(cx)
    }
}

impl Sink<TransportFrame> for StalledTransport {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn start_send(self: Pin<&mut Self>, _item: TransportFrame) -> Result<(), Self::Error> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }
}

/// Dialer that hands the far end of a `tokio::io::duplex` pair to the test.
///
/// The far end is delivered as soon as dialing starts, so a test can observe
/// what happens to a connection whose dial is later abandoned.
pub struct DuplexDialer {
    peers: mpsc::UnboundedSender<(Destination, DuplexStream)>,
    delay: Duration,
    fail: Option<io::ErrorKind>,
    panic: bool,
}

impl DuplexDialer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(Destination, DuplexStream)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                peers: tx,
                delay: Duration::ZERO,
                fail: None,
                panic: false,
            },
            rx,
        )
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, kind: io::ErrorKind) -> Self {
        self.fail = Some(kind);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }
}

#[async_trait]
impl Dialer for DuplexDialer {
    type Stream = DuplexStream;

    async fn dial(&self, destination: &Destination) -> io::Result<DuplexStream> {
        if self.panic {
            panic!("dialer exploded");
        }
        if let Some(kind) = self.fail {
            return Err(kind.into());
        }

        let (near, far) = tokio::io::duplex(64 * 1024);
        let _ = self.peers.send((destination.clone(), far));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(near)
    }
}
