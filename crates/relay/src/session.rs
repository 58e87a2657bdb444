//! Relay session
//!
//! One session per transport connection. The first inbound message carries
//! the handshake; once the destination is dialed the trailing payload and any
//! messages held during the dial are written upstream in arrival order, then
//! both directions are pumped concurrently until one of them ends or the
//! idle timeout fires.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use edgerelay_core::{decode, Destination, HandshakeHeader};

use crate::{CloseCode, Dialer, Phase, RelayError, Result, SessionConfig, Transport, TransportError, TransportFrame};

/// Read buffer reserved per upstream read (16 KB)
const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Why a relay that reached `Relaying` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The transport connection reached end of stream
    ClientClosed,
    /// The upstream connection reached end of stream
    UpstreamClosed,
    /// The idle timeout elapsed
    IdleTimeout,
}

impl RelayEnd {
    fn close_code(self) -> CloseCode {
        match self {
            Self::ClientClosed | Self::UpstreamClosed => CloseCode::Normal,
            Self::IdleTimeout => CloseCode::GoingAway,
        }
    }
}

/// Summary of a completed relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub destination: Destination,
    /// Bytes written to the upstream, including the handshake payload
    pub bytes_up: u64,
    /// Bytes sent to the client
    pub bytes_down: u64,
    pub end: RelayEnd,
}

/// Transport sink that closes at most once
struct ClientSink<S> {
    inner: S,
    closed: bool,
    close_timeout: Duration,
}

impl<S> ClientSink<S>
where
    S: Sink<TransportFrame, Error = TransportError> + Unpin,
{
    fn new(inner: S, close_timeout: Duration) -> Self {
        Self {
            inner,
            closed: false,
            close_timeout,
        }
    }

    async fn send(&mut self, data: Bytes) -> Result<()> {
        if self.closed {
            return Err(RelayError::Transport(TransportError::Closed));
        }
        self.inner.send(TransportFrame::Binary(data)).await?;
        Ok(())
    }

    /// Returns false if the sink was already closed.
    ///
    /// A peer that stops reading gets `close_timeout`; after that the sink is
    /// left for the caller to drop.
    async fn close(&mut self, code: CloseCode) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;

        let inner = &mut self.inner;
        let closing = async move {
            // The peer may already be gone
            if let Err(e) = inner.send(TransportFrame::Close(code)).await {
                debug!("Close frame not delivered: {}", e);
            }
            let _ = inner.close().await;
        };
        if tokio::time::timeout(self.close_timeout, closing).await.is_err() {
            debug!("Transport close not flushed within {:?}", self.close_timeout);
        }
        true
    }
}

/// Upstream write half that shuts down at most once
struct UpstreamWriter<W> {
    inner: W,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> UpstreamWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, closed: false }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(RelayError::InternalWrite(std::io::ErrorKind::NotConnected.into()));
        }
        self.inner.write_all(data).await.map_err(RelayError::InternalWrite)
    }

    /// Returns false if already shut down
    async fn shutdown(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        let _ = self.inner.shutdown().await;
        true
    }
}

/// Messages received while the upstream is being dialed
struct PendingMessages {
    messages: Vec<Bytes>,
    bytes: usize,
    limit: usize,
}

impl PendingMessages {
    fn new(limit: usize) -> Self {
        Self {
            messages: Vec::new(),
            bytes: 0,
            limit,
        }
    }

    fn push(&mut self, message: Bytes) -> Result<()> {
        self.bytes += message.len();
        if self.bytes > self.limit {
            return Err(RelayError::PendingOverflow { limit: self.limit });
        }
        self.messages.push(message);
        Ok(())
    }
}

/// Per-connection relay state machine
pub struct RelaySession<T: Transport, D: Dialer> {
    id: String,
    phase: Phase,
    destination: Option<Destination>,
    client: ClientSink<SplitSink<T, TransportFrame>>,
    inbound: SplitStream<T>,
    dialer: Arc<D>,
    config: Arc<SessionConfig>,
}

impl<T: Transport, D: Dialer> RelaySession<T, D> {
    /// Take ownership of `transport` for the session's lifetime
    pub fn new(transport: T, dialer: Arc<D>, config: Arc<SessionConfig>) -> Self {
        let (sink, inbound) = transport.split();
        Self {
            id: hex::encode(rand::random::<[u8; 8]>()),
            phase: Phase::AwaitingHandshake,
            destination: None,
            client: ClientSink::new(sink, config.close_timeout),
            inbound,
            dialer,
            config,
        }
    }

    /// Short hex id used in log lines
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Drive the session to `Closed`.
    ///
    /// Both connections are closed on every path before this returns.
    pub async fn run(mut self) -> Result<SessionStats> {
        debug!("Session {} started", self.id);

        let result = self.drive().await;

        let code = match &result {
            Ok(stats) => stats.end.close_code(),
            Err(e) => e.close_code(),
        };
        self.client.close(code).await;
        if let Err(e) = self.advance(Phase::Closed) {
            warn!("Session {}: {}", self.id, e);
        }

        match &result {
            Ok(stats) => info!(
                "Session {} to {} ended ({:?}): {} bytes up, {} bytes down",
                self.id, stats.destination, stats.end, stats.bytes_up, stats.bytes_down
            ),
            Err(RelayError::Decode(e)) => warn!("Session {} rejected handshake at {}: {}", self.id, e.field(), e),
            Err(e @ (RelayError::UpstreamConnect { .. } | RelayError::UpstreamTimeout(_))) => {
                warn!("Session {} upstream unreachable: {}", self.id, e)
            }
            Err(RelayError::TransportClosed) => debug!("Session {} closed by client before relaying", self.id),
            Err(e) => warn!("Session {} to {} failed: {}", self.id, self.destination_label(), e),
        }

        result
    }

    async fn drive(&mut self) -> Result<SessionStats> {
        let (header, first) = self.await_handshake().await?;
        let destination = header.destination.clone();
        debug!("Session {} handshake accepted, dialing {}", self.id, destination);

        self.destination = Some(destination.clone());
        self.advance(Phase::Connecting)?;

        let (upstream, pending) = self.connect(&destination).await?;
        // Armed once on connect; traffic does not push it back
        let idle = tokio::time::sleep(self.config.idle_timeout);

        info!("Session {} relaying to {}", self.id, destination);
        self.advance(Phase::Relaying)?;

        // Handshake payload goes first, then whatever arrived during the dial
        let payload = first.slice(header.payload_offset.min(first.len())..);
        let initial: Vec<Bytes> = std::iter::once(payload).chain(pending).collect();
        self.relay(destination, upstream, initial, idle).await
    }

    async fn await_handshake(&mut self) -> Result<(HandshakeHeader, Bytes)> {
        let first = match self.inbound.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(RelayError::TransportClosed),
        };

        let header = decode(&first, self.config.expected_token())?;
        Ok((header, first))
    }

    /// Dial while holding any messages that arrive in the meantime.
    ///
    /// If the transport ends first the dial future is dropped, which also
    /// drops a stream it may have just produced.
    async fn connect(&mut self, destination: &Destination) -> Result<(D::Stream, Vec<Bytes>)> {
        let dialer = Arc::clone(&self.dialer);
        let connect_timeout = self.config.connect_timeout;
        let mut pending = PendingMessages::new(self.config.max_pending_bytes);

        let dial = tokio::time::timeout(connect_timeout, dialer.dial(destination));
        tokio::pin!(dial);

        loop {
            tokio::select! {
                biased;
                result = &mut dial => {
                    return match result {
                        Ok(Ok(stream)) => Ok((stream, pending.messages)),
                        Ok(Err(source)) => Err(RelayError::UpstreamConnect {
                            destination: destination.to_string(),
                            source,
                        }),
                        Err(_) => Err(RelayError::UpstreamTimeout(connect_timeout)),
                    };
                }
                message = self.inbound.next() => match message {
                    Some(Ok(data)) => {
                        debug!("Session {} holding {} bytes until upstream is ready", self.id, data.len());
                        pending.push(data)?;
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(RelayError::TransportClosed),
                },
            }
        }
    }

    /// Pump both directions until one ends or `idle` fires.
    ///
    /// `initial` is written upstream before any further client message, and
    /// under the same idle deadline.
    async fn relay(
        &mut self,
        destination: Destination,
        upstream: D::Stream,
        initial: Vec<Bytes>,
        idle: tokio::time::Sleep,
    ) -> Result<SessionStats> {
        let (mut reader, writer) = tokio::io::split(upstream);
        let mut writer = UpstreamWriter::new(writer);
        let mut bytes_up = 0u64;
        let mut bytes_down = 0u64;
        tokio::pin!(idle);

        let end = tokio::select! {
            result = forward_inbound(initial, &mut self.inbound, &mut writer, &mut bytes_up) => {
                result?;
                RelayEnd::ClientClosed
            }
            result = forward_outbound(&mut reader, &mut self.client, &mut bytes_down) => {
                result?;
                RelayEnd::UpstreamClosed
            }
            _ = &mut idle => RelayEnd::IdleTimeout,
        };

        writer.shutdown().await;

        Ok(SessionStats {
            destination,
            bytes_up,
            bytes_down,
            end,
        })
    }

    fn advance(&mut self, next: Phase) -> Result<()> {
        if self.phase == next && next.is_closed() {
            return Ok(());
        }
        let previous = self.phase;
        self.phase = previous.advance(next)?;
        debug!("Session {} {} -> {}", self.id, previous, next);
        Ok(())
    }

    fn destination_label(&self) -> String {
        self.destination
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "<unknown>".to_string())
    }
}

/// Client messages to upstream, verbatim and in arrival order
async fn forward_inbound<S, W>(
    initial: Vec<Bytes>,
    inbound: &mut S,
    writer: &mut UpstreamWriter<W>,
    counter: &mut u64,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<Bytes, TransportError>> + Unpin,
    W: AsyncWrite + Unpin,
{
    for chunk in initial.into_iter().filter(|c| !c.is_empty()) {
        writer.write(&chunk).await?;
        *counter += chunk.len() as u64;
    }
    while let Some(message) = inbound.next().await {
        let data = message?;
        writer.write(&data).await?;
        *counter += data.len() as u64;
    }
    Ok(())
}

/// Upstream reads to client, one transport message per read
async fn forward_outbound<R, S>(reader: &mut R, client: &mut ClientSink<S>, counter: &mut u64) -> Result<()>
where
    R: AsyncRead + Unpin,
    S: Sink<TransportFrame, Error = TransportError> + Unpin,
{
    let mut buf = BytesMut::with_capacity(RELAY_BUFFER_SIZE);
    loop {
        buf.reserve(RELAY_BUFFER_SIZE);
        let n = reader.read_buf(&mut buf).await.map_err(RelayError::UpstreamIo)?;
        if n == 0 {
            return Ok(());
        }
        client.send(buf.split().freeze()).await?;
        *counter += n as u64;
    }
}
