use std::fmt;

use thiserror::Error;

/// Handshake field the decoder was reading when it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    Length,
    Version,
    AuthToken,
    Options,
    Command,
    Port,
    AddressType,
    Address,
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Length => "length",
            Self::Version => "version",
            Self::AuthToken => "auth token",
            Self::Options => "options",
            Self::Command => "command",
            Self::Port => "port",
            Self::AddressType => "address type",
            Self::Address => "address",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Handshake too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Options truncated: declared {declared} bytes, {available} available")]
    TruncatedOptions { declared: usize, available: usize },

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(u8),

    #[error("Handshake truncated while reading {0}")]
    Truncated(HeaderField),

    #[error("Unsupported address type: {0}")]
    UnsupportedAddressType(u8),

    #[error("Destination address truncated")]
    TruncatedAddress,

    #[error("Domain name is not valid UTF-8")]
    InvalidDomain,
}

impl DecodeError {
    /// The field that failed to decode
    pub fn field(&self) -> HeaderField {
        match self {
            Self::TooShort { .. } => HeaderField::Length,
            Self::UnsupportedVersion(_) => HeaderField::Version,
            Self::AuthenticationFailed => HeaderField::AuthToken,
            Self::TruncatedOptions { .. } => HeaderField::Options,
            Self::UnsupportedCommand(_) => HeaderField::Command,
            Self::Truncated(field) => *field,
            Self::UnsupportedAddressType(_) => HeaderField::AddressType,
            Self::TruncatedAddress | Self::InvalidDomain => HeaderField::Address,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed)
    }
}

/// Errors parsing a configured auth token
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Auth token must be 36 characters in 8-4-4-4-12 form, got {0}")]
    WrongLength(usize),

    #[error("Auth token is not valid hex: {0}")]
    Invalid(#[from] uuid::Error),
}

/// Errors building a handshake
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Domain name too long: {0} bytes, at most 255")]
    DomainTooLong(usize),

    #[error("Options too long: {0} bytes, at most 255")]
    OptionsTooLong(usize),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
