//! Celo chain support for the hardware-wallet signer.
//!
//! This crate provides:
//! - Celo/EVM address handling (normalization, EIP-55 checksums, derivation
//!   from secp256k1 public keys)
//! - Celo legacy transaction encoding for device signing and for broadcast
//! - EIP-191 and EIP-712 digest helpers

pub mod address;
pub mod error;
pub mod message;
pub mod transaction;

pub use address::Address;
pub use error::CeloError;
pub use transaction::{CeloTx, EncodedTransaction};
