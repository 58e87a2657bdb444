//! Destination address types

use std::fmt;
use std::net::Ipv4Addr;

/// Address type tag in the handshake
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    Ipv4 = 1,
    Domain = 2,
    Ipv6 = 3,
}

impl AddressType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Ipv4),
            2 => Some(Self::Domain),
            3 => Some(Self::Ipv6),
            _ => None,
        }
    }

    pub fn into_u8(self) -> u8 {
        self as u8
    }
}

/// Where a session's outbound connection goes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub address: String,
    pub port: u16,
    pub address_type: AddressType,
}

impl Destination {
    pub fn new(address: impl Into<String>, port: u16, address_type: AddressType) -> Self {
        Self {
            address: address.into(),
            port,
            address_type,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address_type {
            AddressType::Ipv6 => write!(f, "[{}]:{}", self.address, self.port),
            _ => write!(f, "{}:{}", self.address, self.port),
        }
    }
}

/// Dotted-decimal rendering of 4 address bytes
pub fn format_ipv4(octets: [u8; 4]) -> String {
    Ipv4Addr::from(octets).to_string()
}

/// Eight lowercase hex groups joined by colons, without `::` compression
pub fn format_ipv6(octets: &[u8; 16]) -> String {
    let groups: Vec<String> = octets
        .chunks_exact(2)
        .map(|pair| format!("{:x}", u16::from_be_bytes([pair[0], pair[1]])))
        .collect();
    groups.join(":")
}
