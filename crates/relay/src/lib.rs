//! edgerelay Relay
//!
//! Per-connection relay sessions: wait for the handshake on a message-framed
//! transport, dial the decoded destination, then pump bytes both ways until
//! either side closes.
//!
//! ## Components
//!
//! - **RelaySession**: the per-connection state machine
//! - **Relay**: spawns guarded session tasks and counts live sessions
//! - **Transport** / **Dialer**: seams for the client connection and the
//!   outbound stream

mod config;
mod dialer;
mod phase;
mod relay;
mod session;
mod transport;

#[cfg(test)]
mod test_utils;

pub use config::{SessionConfig, DEFAULT_CLOSE_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_PENDING_BYTES};
pub use dialer::{Dialer, TcpDialer};
pub use phase::Phase;
pub use relay::Relay;
pub use session::{RelayEnd, RelaySession, SessionStats};
pub use transport::{CloseCode, Transport, TransportError, TransportFrame};

use std::time::Duration;

use edgerelay_core::DecodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Handshake rejected: {0}")]
    Decode(#[from] DecodeError),

    #[error("Upstream connect to {destination} failed: {source}")]
    UpstreamConnect {
        destination: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Upstream connect timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Upstream I/O error: {0}")]
    UpstreamIo(std::io::Error),

    #[error("Transport closed before relaying started")]
    TransportClosed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Write to upstream failed: {0}")]
    InternalWrite(std::io::Error),

    #[error("More than {limit} bytes arrived before the upstream was ready")]
    PendingOverflow { limit: usize },

    #[error("Illegal phase transition {from} -> {to}")]
    IllegalTransition { from: Phase, to: Phase },
}

impl RelayError {
    /// Close status reported to the client for this error
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::Decode(e) if e.is_auth_failure() => CloseCode::PolicyViolation,
            Self::Decode(_) => CloseCode::ProtocolError,
            Self::UpstreamConnect { .. } | Self::UpstreamTimeout(_) => CloseCode::UpstreamUnreachable,
            Self::TransportClosed => CloseCode::Normal,
            Self::PendingOverflow { .. } => CloseCode::MessageTooBig,
            Self::UpstreamIo(_) | Self::Transport(_) | Self::InternalWrite(_) | Self::IllegalTransition { .. } => {
                CloseCode::InternalError
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
