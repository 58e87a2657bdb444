//! Handshake header codec
//!
//! Wire layout of the first transport message:
//!
//! ```text
//! VER (1) | TOKEN (16) | OPTLEN (1) | OPTIONS (OPTLEN) | CMD (1) | PORT (2, BE) | ATYP (1) | ADDR | PAYLOAD
//! ```
//!
//! ADDR is 4 bytes for IPv4, a length byte plus that many bytes for a domain,
//! and 16 bytes for IPv6. Everything after ADDR is application payload.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::destination::{format_ipv4, format_ipv6, AddressType, Destination};
use crate::{AuthToken, DecodeError, EncodeError, HeaderField, Result};

/// The only supported protocol version
pub const PROTOCOL_VERSION: u8 = 0;

/// Smallest buffer that can hold a complete header
pub const MIN_HEADER_LEN: usize = 23;

/// Bytes before the address field when the options block is empty
pub const FIXED_PREFIX_LEN: usize = 22;

/// Handshake command
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open a TCP stream to the destination
    Tcp = 1,
}

impl Command {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Tcp),
            _ => None,
        }
    }
}

/// Decoded handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeHeader {
    pub version: u8,
    pub auth_token: AuthToken,
    /// Length of the skipped options block
    pub options_length: u8,
    pub command: Command,
    pub destination: Destination,
    /// Index into the decoded buffer where payload begins
    pub payload_offset: usize,
}

impl HandshakeHeader {
    /// Payload bytes that followed the header in `buffer`
    pub fn payload<'a>(&self, buffer: &'a [u8]) -> &'a [u8] {
        buffer.get(self.payload_offset..).unwrap_or(&[])
    }
}

/// Bounds-checked reader over the handshake buffer
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let bytes = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn u8(&mut self, field: HeaderField) -> Result<u8> {
        self.take(1).map(|b| b[0]).ok_or(DecodeError::Truncated(field))
    }

    fn u16_be(&mut self, field: HeaderField) -> Result<u16> {
        self.take(2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or(DecodeError::Truncated(field))
    }

    fn array<const N: usize>(&mut self, err: DecodeError) -> Result<[u8; N]> {
        let bytes = self.take(N).ok_or(err)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

/// Decode the handshake at the start of `buffer`.
///
/// `expected_token` is the canonical dashed-hex token for this deployment.
/// The received token bytes are rendered the same way and compared as strings.
pub fn decode(buffer: &[u8], expected_token: &str) -> Result<HandshakeHeader> {
    if buffer.len() < MIN_HEADER_LEN {
        return Err(DecodeError::TooShort {
            len: buffer.len(),
            min: MIN_HEADER_LEN,
        });
    }

    let mut cursor = Cursor::new(buffer);

    let version = cursor.u8(HeaderField::Version)?;
    if version != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let token_bytes: [u8; 16] = cursor.array(DecodeError::Truncated(HeaderField::AuthToken))?;
    if !AuthToken::bytes_match_canonical(&token_bytes, expected_token) {
        return Err(DecodeError::AuthenticationFailed);
    }

    let options_length = cursor.u8(HeaderField::Options)?;
    let available = cursor.remaining();
    cursor
        .take(options_length as usize)
        .ok_or(DecodeError::TruncatedOptions {
            declared: options_length as usize,
            available,
        })?;

    let command_byte = cursor.u8(HeaderField::Command)?;
    let command = Command::from_u8(command_byte).ok_or(DecodeError::UnsupportedCommand(command_byte))?;

    let port = cursor.u16_be(HeaderField::Port)?;

    let atyp = cursor.u8(HeaderField::AddressType)?;
    let address_type = AddressType::from_u8(atyp).ok_or(DecodeError::UnsupportedAddressType(atyp))?;

    let address = match address_type {
        AddressType::Ipv4 => format_ipv4(cursor.array(DecodeError::TruncatedAddress)?),
        AddressType::Domain => {
            let len = cursor.u8(HeaderField::Address).map_err(|_| DecodeError::TruncatedAddress)?;
            let bytes = cursor.take(len as usize).ok_or(DecodeError::TruncatedAddress)?;
            std::str::from_utf8(bytes)
                .map_err(|_| DecodeError::InvalidDomain)?
                .to_string()
        }
        AddressType::Ipv6 => format_ipv6(&cursor.array(DecodeError::TruncatedAddress)?),
    };

    Ok(HandshakeHeader {
        version,
        auth_token: AuthToken::from_bytes(token_bytes),
        options_length,
        command,
        destination: Destination::new(address, port, address_type),
        payload_offset: cursor.pos,
    })
}

/// Width of the address field (including a domain's length byte)
pub fn address_field_width(address_type: AddressType, domain_len: usize) -> usize {
    match address_type {
        AddressType::Ipv4 => 4,
        AddressType::Domain => 1 + domain_len,
        AddressType::Ipv6 => 16,
    }
}

/// Client-side handshake encoder
#[derive(Debug, Clone)]
pub struct HandshakeBuilder {
    version: u8,
    token: [u8; 16],
    options: Vec<u8>,
    command: u8,
    port: u16,
    address_type: u8,
    address: Vec<u8>,
    payload: Vec<u8>,
}

impl HandshakeBuilder {
    /// Start a TCP handshake to `0.0.0.0:0`
    pub fn new(token: &AuthToken) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            token: *token.as_bytes(),
            options: Vec::new(),
            command: Command::Tcp as u8,
            port: 0,
            address_type: AddressType::Ipv4.into_u8(),
            address: vec![0; 4],
            payload: Vec::new(),
        }
    }

    pub fn ipv4(mut self, addr: Ipv4Addr, port: u16) -> Self {
        self.port = port;
        self.address_type = AddressType::Ipv4.into_u8();
        self.address = addr.octets().to_vec();
        self
    }

    pub fn ipv6(mut self, addr: Ipv6Addr, port: u16) -> Self {
        self.port = port;
        self.address_type = AddressType::Ipv6.into_u8();
        self.address = addr.octets().to_vec();
        self
    }

    pub fn domain(mut self, name: &str, port: u16) -> Self {
        self.port = port;
        self.address_type = AddressType::Domain.into_u8();
        self.address = name.as_bytes().to_vec();
        self
    }

    /// Raw address type tag and bytes, written as-is
    pub fn raw_address(mut self, address_type: u8, bytes: Vec<u8>, port: u16) -> Self {
        self.port = port;
        self.address_type = address_type;
        self.address = bytes;
        self
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn command(mut self, command: u8) -> Self {
        self.command = command;
        self
    }

    pub fn options(mut self, options: Vec<u8>) -> Self {
        self.options = options;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(&self) -> std::result::Result<Vec<u8>, EncodeError> {
        let options_len = u8::try_from(self.options.len()).map_err(|_| EncodeError::OptionsTooLong(self.options.len()))?;

        let mut out = Vec::with_capacity(FIXED_PREFIX_LEN + self.options.len() + self.address.len() + 1 + self.payload.len());
        out.push(self.version);
        out.extend_from_slice(&self.token);
        out.push(options_len);
        out.extend_from_slice(&self.options);
        out.push(self.command);
        out.extend_from_slice(&self.port.to_be_bytes());
        out.push(self.address_type);
        if self.address_type == AddressType::Domain.into_u8() {
            let len = u8::try_from(self.address.len()).map_err(|_| EncodeError::DomainTooLong(self.address.len()))?;
            out.push(len);
        }
        out.extend_from_slice(&self.address);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}
