//! Outbound connection seam

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use edgerelay_core::Destination;

/// Opens the outbound byte stream for a session.
///
/// Name resolution is up to the implementation; the relay only hands over
/// the decoded host string and port.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn dial(&self, destination: &Destination) -> io::Result<Self::Stream>;
}

/// Plain TCP dialer using the system resolver
#[derive(Debug, Clone)]
pub struct TcpDialer {
    nodelay: bool,
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpDialer {
    pub fn new() -> Self {
        Self { nodelay: true }
    }

    /// Disable `TCP_NODELAY` on dialed sockets
    pub fn with_nagle(mut self) -> Self {
        self.nodelay = false;
        self
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, destination: &Destination) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((destination.address.as_str(), destination.port)).await?;
        if self.nodelay {
            stream.set_nodelay(true)?;
        }
        debug!(
            "Dialed {} (local {})",
            destination,
            stream.local_addr().map(|a| a.to_string()).unwrap_or_default()
        );
        Ok(stream)
    }
}
