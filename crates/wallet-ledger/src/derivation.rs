use std::fmt;
use std::str::FromStr;

use bip32::ChildNumber;

use crate::error::WalletError;

/// Base path of Celo accounts: `m/44'/52752'/0'/0`, written without `m/`
/// the way the Ledger app expects it.
pub const CELO_BASE_DERIVATION_PATH: &str = "44'/52752'/0'/0";

/// Number of accounts discovered when no indexes are configured.
pub const DEFAULT_ADDRESS_QTY: u32 = 5;

/// Deepest path the device app accepts.
const MAX_DEPTH: usize = 10;

/// A BIP-32 derivation path as sent to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath(bip32::DerivationPath);

impl DerivationPath {
    /// Appends a non-hardened `address_index` to this path.
    pub fn child(&self, index: u32) -> Result<Self, WalletError> {
        let child = ChildNumber::new(index, false).map_err(|e| {
            WalletError::InvalidConfiguration(format!("invalid address index {index}: {e}"))
        })?;
        if self.depth() >= MAX_DEPTH {
            return Err(WalletError::InvalidConfiguration(format!(
                "derivation path deeper than {MAX_DEPTH} components"
            )));
        }

        let mut path = self.0.clone();
        path.push(child);
        Ok(Self(path))
    }

    pub fn components(&self) -> impl Iterator<Item = ChildNumber> + '_ {
        self.0.iter()
    }

    pub fn depth(&self) -> usize {
        self.0.iter().count()
    }

    /// Serializes the path for an APDU payload: one depth byte followed by
    /// each component as a big-endian u32, hardened bit included.
    pub fn to_apdu_bytes(&self) -> Vec<u8> {
        let depth = self.depth();
        let mut bytes = Vec::with_capacity(1 + depth * 4);
        bytes.push(depth as u8);
        for child in self.0.iter() {
            bytes.extend_from_slice(&child.to_bytes());
        }
        bytes
    }
}

impl FromStr for DerivationPath {
    type Err = WalletError;

    /// Parses `44'/52752'/0'/0` style paths, with or without a leading `m/`.
    /// Both `'` and `h` mark hardened components.
    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let relative = path.strip_prefix("m/").unwrap_or(path);
        if relative.is_empty() {
            return Err(WalletError::InvalidConfiguration(
                "derivation path is empty".into(),
            ));
        }

        let canonical = relative
            .split('/')
            .fold(String::from("m"), |mut acc, component| {
                acc.push('/');
                match component.strip_suffix('h') {
                    Some(index) => {
                        acc.push_str(index);
                        acc.push('\'');
                    }
                    None => acc.push_str(component),
                }
                acc
            });

        let inner: bip32::DerivationPath = canonical.parse().map_err(|e: bip32::Error| {
            WalletError::InvalidConfiguration(format!("invalid derivation path {path:?}: {e}"))
        })?;

        let depth = inner.iter().count();
        if depth > MAX_DEPTH {
            return Err(WalletError::InvalidConfiguration(format!(
                "derivation path too deep: {depth} components"
            )));
        }

        Ok(Self(inner))
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self.0.to_string();
        f.write_str(rendered.strip_prefix("m/").unwrap_or(&rendered))
    }
}
