use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::CeloError;

/// A 20-byte account address.
///
/// Equality, hashing and `Display` all use the lowercase `0x`-prefixed form,
/// so two spellings of the same address (checksummed, uppercase, lowercase)
/// compare equal once parsed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CeloError> {
        let bytes: [u8; 20] = bytes.try_into().map_err(|_| {
            CeloError::InvalidAddress(format!("expected 20 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Derives the address of an uncompressed secp256k1 public key (65 bytes,
    /// starting with 0x04).
    ///
    /// The derivation takes the Keccak-256 hash of the 64-byte public key
    /// (without the 0x04 prefix) and uses the last 20 bytes as the address.
    pub fn from_public_key(uncompressed_pubkey: &[u8; 65]) -> Result<Self, CeloError> {
        if uncompressed_pubkey[0] != 0x04 {
            return Err(CeloError::InvalidPublicKey(
                "uncompressed key must start with 0x04".into(),
            ));
        }

        let hash = Keccak256::digest(&uncompressed_pubkey[1..]);

        let mut addr_bytes = [0u8; 20];
        addr_bytes.copy_from_slice(&hash[12..]);
        Ok(Self(addr_bytes))
    }

    /// Renders the address with the EIP-55 mixed-case checksum.
    pub fn to_checksum(&self) -> String {
        let hex_part = hex::encode(self.0);
        apply_checksum(&hex_part)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = CeloError;

    /// Parses a 40-hex-digit address, with or without the `0x` prefix, in any
    /// letter case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if hex_part.len() != 40 {
            return Err(CeloError::InvalidAddress(format!(
                "expected 40 hex characters, got {}",
                hex_part.len()
            )));
        }

        let bytes = hex::decode(hex_part)
            .map_err(|e| CeloError::InvalidAddress(format!("invalid hex: {e}")))?;
        Self::from_slice(&bytes)
    }
}

impl TryFrom<String> for Address {
    type Error = CeloError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

/// EIP-55: uppercase every letter whose nibble in keccak(lowercase hex) is >= 8.
fn apply_checksum(lower_hex: &str) -> String {
    let hash = Keccak256::digest(lower_hex.as_bytes());

    let mut checksummed = String::with_capacity(42);
    checksummed.push_str("0x");

    for (i, c) in lower_hex.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            checksummed.push(c.to_ascii_uppercase());
        } else {
            checksummed.push(c);
        }
    }

    checksummed
}
