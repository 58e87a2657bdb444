//! Client-facing transport seam
//!
//! A transport is any message-framed duplex connection: a stream of inbound
//! binary messages plus a sink of outbound frames. The stream ending means the
//! peer closed the connection.

use bytes::Bytes;
use futures::{Sink, Stream};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Transport protocol error: {0}")]
    Protocol(String),

    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Status sent when the relay closes the transport.
///
/// Values are WebSocket close codes and stay fixed across releases.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    Normal = 1000,
    /// Idle timeout elapsed
    GoingAway = 1001,
    /// Malformed or unsupported handshake
    ProtocolError = 1002,
    /// Authentication failed
    PolicyViolation = 1008,
    /// Too much data arrived before the upstream was ready
    MessageTooBig = 1009,
    InternalError = 1011,
    /// Upstream connect failed or timed out
    UpstreamUnreachable = 1014,
}

impl CloseCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Outbound frame on the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    Binary(Bytes),
    Close(CloseCode),
}

/// A message-framed duplex connection the relay can own
pub trait Transport:
    Stream<Item = Result<Bytes, TransportError>> + Sink<TransportFrame, Error = TransportError> + Send + Unpin + 'static
{
}

impl<T> Transport for T where
    T: Stream<Item = Result<Bytes, TransportError>> + Sink<TransportFrame, Error = TransportError> + Send + Unpin + 'static
{
}
