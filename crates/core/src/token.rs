//! Authentication token
//!
//! Tokens are 16 raw bytes on the wire and compared in their canonical
//! lowercase `8-4-4-4-12` hex form.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::TokenError;

/// Length of the canonical dashed-hex form
pub const CANONICAL_TOKEN_LEN: usize = 36;

/// A 16-byte authentication token
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuthToken([u8; 16]);

impl AuthToken {
    pub const LEN: usize = 16;

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Generate a fresh random token
    pub fn generate() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    /// Canonical lowercase dashed-hex form
    pub fn canonical(&self) -> String {
        Uuid::from_bytes(self.0).hyphenated().to_string()
    }

    /// Compare raw wire bytes against a canonical token string.
    ///
    /// Encodes into a stack buffer.
    pub fn bytes_match_canonical(bytes: &[u8; 16], expected: &str) -> bool {
        let mut scratch = Uuid::encode_buffer();
        let received = Uuid::from_bytes(*bytes).hyphenated().encode_lower(&mut scratch);
        &*received == expected
    }
}

impl FromStr for AuthToken {
    type Err = TokenError;

    /// Parses the dashed form only; braced, URN and undashed spellings are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != CANONICAL_TOKEN_LEN {
            return Err(TokenError::WrongLength(s.len()));
        }
        let uuid = Uuid::try_parse(s)?;
        Ok(Self(*uuid.as_bytes()))
    }
}

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Uuid::from_bytes(self.0).hyphenated(), f)
    }
}

// Keeps the token out of `{:?}` logs.
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}
