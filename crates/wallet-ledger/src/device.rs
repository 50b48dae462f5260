use async_trait::async_trait;
use chain_celo::Address;
use serde::{Deserialize, Serialize};

use crate::derivation::DerivationPath;
use crate::error::DeviceError;
use crate::signature::RawSignature;

/// Result of an address request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    /// `None` when the device declined to return an address.
    pub address: Option<Address>,
    pub path: DerivationPath,
}

/// Capabilities reported by the device app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfiguration {
    /// Whether the app accepts transactions carrying contract data.
    pub arbitrary_data_enabled: bool,
    pub version: String,
}

/// A session with the signing device.
///
/// The device processes one command at a time; callers hold exclusive access
/// (`&mut self`) for the duration of each call, and every call may block on
/// the user pressing buttons on the device.
#[async_trait]
pub trait LedgerDevice: Send {
    /// Returns the address at `path`. With `force_validation` the device
    /// displays the address and waits for the user to confirm it.
    async fn get_address(
        &mut self,
        path: &DerivationPath,
        force_validation: bool,
    ) -> Result<AddressInfo, DeviceError>;

    /// Signs an RLP-encoded transaction signing payload.
    ///
    /// `v` is either the EIP-155 value for the payload's chain id, whole or
    /// truncated to its low byte, or the bare recovery id. The returned
    /// [`v_format`](RawSignature::v_format) must say which.
    async fn sign_transaction(
        &mut self,
        path: &DerivationPath,
        encoded_tx: &[u8],
    ) -> Result<RawSignature, DeviceError>;

    /// Signs `data` as an EIP-191 personal message. `v` is a recovery id,
    /// bare or offset by 27.
    async fn sign_personal_message(
        &mut self,
        path: &DerivationPath,
        data: &[u8],
    ) -> Result<RawSignature, DeviceError>;

    /// Signs an EIP-712 message given its domain separator and struct hash.
    /// `v` follows the same convention as personal messages.
    async fn sign_typed_data_hash(
        &mut self,
        path: &DerivationPath,
        domain_separator: &[u8; 32],
        struct_hash: &[u8; 32],
    ) -> Result<RawSignature, DeviceError>;

    async fn get_app_configuration(&mut self) -> Result<AppConfiguration, DeviceError>;
}
