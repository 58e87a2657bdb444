//! edgerelay Core
//!
//! Handshake decoding for the WebSocket-to-TCP relay. Everything in this
//! crate is pure: no I/O, no state carried between calls.

mod destination;
mod error;
mod header;
mod token;

pub use destination::{format_ipv4, format_ipv6, AddressType, Destination};
pub use error::*;
pub use header::{
    address_field_width, decode, Command, HandshakeBuilder, HandshakeHeader, FIXED_PREFIX_LEN,
    MIN_HEADER_LEN, PROTOCOL_VERSION,
};
pub use token::{AuthToken, CANONICAL_TOKEN_LEN};
