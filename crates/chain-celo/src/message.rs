//! Digests for off-chain signatures.
//!
//! The device computes these itself; they are exposed here so callers can
//! recover and check the signer of a returned signature.

use sha3::{Digest, Keccak256};

/// EIP-191 personal message digest:
/// `keccak256("\x19Ethereum Signed Message:\n" + len(message) + message)`.
pub fn hash_personal_message(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// EIP-712 digest from an already computed domain separator and struct hash:
/// `keccak256(0x19 0x01 || domainSeparator || hashStruct(message))`.
pub fn hash_typed_data(domain_separator: &[u8; 32], struct_hash: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update([0x19, 0x01]);
    hasher.update(domain_separator);
    hasher.update(struct_hash);
    hasher.finalize().into()
}
