//! [`LedgerDevice`] implementation speaking to the Celo app over APDUs.

use async_trait::async_trait;
use chain_celo::Address;
use tracing::{debug, info};

use crate::apdu::{ApduCommand, Exchange, Instruction, MAX_DATA_LEN};
use crate::derivation::DerivationPath;
use crate::device::{AddressInfo, AppConfiguration, LedgerDevice};
use crate::error::DeviceError;
use crate::signature::{RawSignature, VFormat};

const P1_FIRST_CHUNK: u8 = 0x00;
const P1_MORE_CHUNKS: u8 = 0x80;
const P1_NO_DISPLAY: u8 = 0x00;
const P1_DISPLAY: u8 = 0x01;
const P2_NO_CHAIN_CODE: u8 = 0x00;

/// Bit of the configuration flags byte set when contract data is allowed.
const FLAG_ARBITRARY_DATA: u8 = 0x01;

/// The Celo app on a Ledger device, reached through `E`.
pub struct CeloApp<E> {
    transport: E,
}

impl<E: Exchange> CeloApp<E> {
    pub fn new(transport: E) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> E {
        self.transport
    }

    async fn send(
        &mut self,
        ins: Instruction,
        p1: u8,
        p2: u8,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, DeviceError> {
        let command = ApduCommand::new(ins, p1, p2, data)?;
        self.transport.exchange(&command).await?.into_result()
    }

    /// Streams `payload` after `header` in 255-byte chunks; the response of
    /// the last chunk is returned.
    async fn send_chunked(
        &mut self,
        ins: Instruction,
        header: Vec<u8>,
        payload: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        let first_len = MAX_DATA_LEN.saturating_sub(header.len()).min(payload.len());
        let (first, mut rest) = payload.split_at(first_len);

        let mut data = header;
        data.extend_from_slice(first);
        let mut response = self.send(ins, P1_FIRST_CHUNK, 0x00, data).await?;

        while !rest.is_empty() {
            let len = MAX_DATA_LEN.min(rest.len());
            let (chunk, tail) = rest.split_at(len);
            response = self
                .send(ins, P1_MORE_CHUNKS, 0x00, chunk.to_vec())
                .await?;
            rest = tail;
        }

        Ok(response)
    }
}

#[async_trait]
impl<E: Exchange> LedgerDevice for CeloApp<E> {
    async fn get_address(
        &mut self,
        path: &DerivationPath,
        force_validation: bool,
    ) -> Result<AddressInfo, DeviceError> {
        debug!(%path, force_validation, "requesting address");

        let p1 = if force_validation {
            P1_DISPLAY
        } else {
            P1_NO_DISPLAY
        };
        let response = self
            .send(Instruction::GetAddress, p1, P2_NO_CHAIN_CODE, path.to_apdu_bytes())
            .await?;

        Ok(AddressInfo {
            address: parse_address_response(&response)?,
            path: path.clone(),
        })
    }

    async fn sign_transaction(
        &mut self,
        path: &DerivationPath,
        encoded_tx: &[u8],
    ) -> Result<RawSignature, DeviceError> {
        info!(%path, len = encoded_tx.len(), "signing transaction on device");
        let response = self
            .send_chunked(Instruction::SignTransaction, path.to_apdu_bytes(), encoded_tx)
            .await?;
        parse_signature_response(&response, VFormat::Eip155)
    }

    async fn sign_personal_message(
        &mut self,
        path: &DerivationPath,
        data: &[u8],
    ) -> Result<RawSignature, DeviceError> {
        info!(%path, len = data.len(), "signing personal message on device");
        let len = u32::try_from(data.len())
            .map_err(|_| DeviceError::Other("message too long".into()))?;

        let mut header = path.to_apdu_bytes();
        header.extend_from_slice(&len.to_be_bytes());
        let response = self
            .send_chunked(Instruction::SignPersonalMessage, header, data)
            .await?;
        parse_signature_response(&response, VFormat::RecoveryId)
    }

    async fn sign_typed_data_hash(
        &mut self,
        path: &DerivationPath,
        domain_separator: &[u8; 32],
        struct_hash: &[u8; 32],
    ) -> Result<RawSignature, DeviceError> {
        info!(%path, "signing typed data on device");
        let mut data = path.to_apdu_bytes();
        data.extend_from_slice(domain_separator);
        data.extend_from_slice(struct_hash);

        let response = self
            .send(Instruction::SignEip712Hashed, 0x00, 0x00, data)
            .await?;
        parse_signature_response(&response, VFormat::RecoveryId)
    }

    async fn get_app_configuration(&mut self) -> Result<AppConfiguration, DeviceError> {
        let response = self
            .send(Instruction::GetAppConfiguration, 0x00, 0x00, Vec::new())
            .await?;

        if response.len() < 4 {
            return Err(DeviceError::InvalidResponse(format!(
                "app configuration is {} bytes, expected 4",
                response.len()
            )));
        }

        Ok(AppConfiguration {
            arbitrary_data_enabled: response[0] & FLAG_ARBITRARY_DATA != 0,
            version: format!("{}.{}.{}", response[1], response[2], response[3]),
        })
    }
}

/// `pubkey_len || pubkey || addr_len || ascii hex address`. An empty address
/// field means the device returned no address.
fn parse_address_response(data: &[u8]) -> Result<Option<Address>, DeviceError> {
    let pubkey_len = *data
        .first()
        .ok_or_else(|| DeviceError::InvalidResponse("empty address response".into()))?
        as usize;

    let addr_len_offset = 1 + pubkey_len;
    let addr_len = *data.get(addr_len_offset).ok_or_else(|| {
        DeviceError::InvalidResponse("address response truncated after public key".into())
    })? as usize;
    if addr_len == 0 {
        return Ok(None);
    }

    let start = addr_len_offset + 1;
    let ascii = data.get(start..start + addr_len).ok_or_else(|| {
        DeviceError::InvalidResponse("address response truncated".into())
    })?;
    let text = std::str::from_utf8(ascii)
        .map_err(|e| DeviceError::InvalidResponse(format!("address is not ascii: {e}")))?;

    text.parse::<Address>()
        .map(Some)
        .map_err(|e| DeviceError::InvalidResponse(e.to_string()))
}

/// `v (1) || r (32) || s (32)`. The app answers transactions with the low
/// byte of the EIP-155 `v` and messages with `27 + recovery_id`.
fn parse_signature_response(
    data: &[u8],
    v_format: VFormat,
) -> Result<RawSignature, DeviceError> {
    if data.len() < 65 {
        return Err(DeviceError::InvalidResponse(format!(
            "signature is {} bytes, expected 65",
            data.len()
        )));
    }

    Ok(RawSignature {
        v: u64::from(data[0]),
        v_format,
        r: data[1..33].to_vec(),
        s: data[33..65].to_vec(),
    })
}
