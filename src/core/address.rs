//! Account Addresses
//!
//! Players and the referee's signing key are identified by 20-byte EVM
//! account addresses. Parsing accepts any hex case; rendering is always
//! lowercase with a `0x` prefix, so two spellings of one account compare equal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Address length in bytes.
pub const ADDRESS_LEN: usize = 20;

/// A normalized 20-byte account address.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PlayerAddress([u8; ADDRESS_LEN]);

impl PlayerAddress {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Short form for log lines (`0x1234..abcd`).
    pub fn short(&self) -> String {
        format!("0x{}..{}", hex::encode(&self.0[..2]), hex::encode(&self.0[18..]))
    }
}

/// Address parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Input is not valid hex.
    #[error("address is not valid hex")]
    InvalidHex,
    /// Decoded length is not 20 bytes.
    #[error("address must be 20 bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for PlayerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = hex::decode(digits).map_err(|_| AddressError::InvalidHex)?;
        if bytes.len() != ADDRESS_LEN {
            return Err(AddressError::InvalidLength(bytes.len()));
        }

        let mut arr = [0u8; ADDRESS_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for PlayerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PlayerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerAddress({})", self)
    }
}

impl Serialize for PlayerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PlayerAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
