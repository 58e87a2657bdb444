//! Relay session lifecycle

use std::fmt;

use crate::{RelayError, Result};

/// Session phase.
///
/// `AwaitingHandshake -> Connecting -> Relaying -> Closed`, with `Closed`
/// reachable from every phase and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    AwaitingHandshake,
    Connecting,
    Relaying,
    Closed,
}

impl Phase {
    pub fn can_advance_to(self, next: Phase) -> bool {
        match (self, next) {
            (Self::AwaitingHandshake, Self::Connecting) => true,
            (Self::Connecting, Self::Relaying) => true,
            (Self::Closed, _) => false,
            (_, Self::Closed) => true,
            _ => false,
        }
    }

    /// The phase after `next`, or `IllegalTransition`
    pub fn advance(self, next: Phase) -> Result<Phase> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(RelayError::IllegalTransition { from: self, to: next })
        }
    }

    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingHandshake => "awaiting-handshake",
            Self::Connecting => "connecting",
            Self::Relaying => "relaying",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
