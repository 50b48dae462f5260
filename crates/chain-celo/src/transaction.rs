use alloy_rlp::{Encodable, RlpEncodable};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::address::Address;
use crate::error::CeloError;

/// An unsigned Celo legacy transaction, as handed to the wallet by callers.
///
/// Either `gas_price` or the fee-market pair (`max_fee_per_gas`,
/// `max_priority_fee_per_gas`) may be set; hardware signing only understands
/// `gas_price`, see [`CeloTx::normalize_legacy_fees`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CeloTx {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub chain_id: u64,
    pub nonce: u64,
    /// Gas limit.
    pub gas: u64,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    /// Token used to pay fees; `None` pays in CELO.
    pub fee_currency: Option<Address>,
    pub gateway_fee_recipient: Option<Address>,
    pub gateway_fee: Option<u128>,
    /// Transfer value in wei.
    pub value: u128,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl CeloTx {
    /// Folds the fee-market fields into `gas_price`.
    ///
    /// `gas_price` takes `max_fee_per_gas` when it is unset, and both
    /// fee-market fields are removed. Returns `true` when any fee-market field
    /// was present, so callers can surface the lossy rewrite.
    pub fn normalize_legacy_fees(&mut self) -> bool {
        if self.gas_price.is_none() {
            self.gas_price = self.max_fee_per_gas;
        }

        let had_fee_market =
            self.max_fee_per_gas.is_some() || self.max_priority_fee_per_gas.is_some();
        self.max_fee_per_gas = None;
        self.max_priority_fee_per_gas = None;
        had_fee_market
    }
}

/// A signed transaction ready for broadcast.
#[derive(Debug, Clone)]
pub struct EncodedTransaction {
    /// RLP-encoded signed transaction bytes.
    pub raw: Vec<u8>,
    /// Transaction hash as a 0x-prefixed hex string.
    pub tx_hash: String,
    /// The transaction that was signed, after fee normalization.
    pub tx: CeloTx,
    pub v: u64,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl EncodedTransaction {
    /// `r` as 0x-prefixed hex without leading zero bytes.
    pub fn r_hex(&self) -> String {
        format!("0x{}", hex::encode(strip_leading_zeros(&self.r)))
    }

    /// `s` as 0x-prefixed hex without leading zero bytes.
    pub fn s_hex(&self) -> String {
        format!("0x{}", hex::encode(strip_leading_zeros(&self.s)))
    }
}

/// Encodes the transaction as the EIP-155 signing payload:
/// `rlp([nonce, gasPrice, gas, feeCurrency, gatewayFeeRecipient, gatewayFee,
///       to, value, data, chainId, 0, 0])`.
///
/// These are the bytes streamed to the device.
pub fn encode_for_signing(tx: &CeloTx) -> Result<Vec<u8>, CeloError> {
    let fields = UnsignedTxFields {
        nonce: tx.nonce,
        gas_price: required_gas_price(tx)?,
        gas: tx.gas,
        fee_currency: RlpOptAddress(tx.fee_currency),
        gateway_fee_recipient: RlpOptAddress(tx.gateway_fee_recipient),
        gateway_fee: tx.gateway_fee.unwrap_or(0),
        to: RlpOptAddress(tx.to),
        value: tx.value,
        data: RlpBytes(tx.data.clone()),
        chain_id: tx.chain_id,
        empty_r: 0,
        empty_s: 0,
    };

    let mut rlp_buf = Vec::new();
    fields.encode(&mut rlp_buf);
    Ok(rlp_buf)
}

/// Keccak-256 of the signing payload; the digest the device signs.
pub fn signing_hash(tx: &CeloTx) -> Result<[u8; 32], CeloError> {
    let payload = encode_for_signing(tx)?;
    Ok(Keccak256::digest(&payload).into())
}

/// Builds the signed transaction from an already canonical signature.
///
/// `v` must already carry the EIP-155 chain offset. `r` and `s` are written as
/// minimal big-endian integers, so a leading zero byte never reaches the wire.
pub fn encode_signed(
    tx: &CeloTx,
    v: u64,
    r: [u8; 32],
    s: [u8; 32],
) -> Result<EncodedTransaction, CeloError> {
    let fields = SignedTxFields {
        nonce: tx.nonce,
        gas_price: required_gas_price(tx)?,
        gas: tx.gas,
        fee_currency: RlpOptAddress(tx.fee_currency),
        gateway_fee_recipient: RlpOptAddress(tx.gateway_fee_recipient),
        gateway_fee: tx.gateway_fee.unwrap_or(0),
        to: RlpOptAddress(tx.to),
        value: tx.value,
        data: RlpBytes(tx.data.clone()),
        v,
        r: RlpU256(r),
        s: RlpU256(s),
    };

    let mut raw = Vec::new();
    fields.encode(&mut raw);

    let tx_hash = Keccak256::digest(&raw);

    Ok(EncodedTransaction {
        raw,
        tx_hash: format!("0x{}", hex::encode(tx_hash)),
        tx: tx.clone(),
        v,
        r,
        s,
    })
}

fn required_gas_price(tx: &CeloTx) -> Result<u128, CeloError> {
    tx.gas_price
        .ok_or(CeloError::MissingField("gasPrice"))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

// ---------------------------------------------------------------------------
// RLP-encodable structures
// ---------------------------------------------------------------------------

#[derive(RlpEncodable)]
struct UnsignedTxFields {
    nonce: u64,
    gas_price: u128,
    gas: u64,
    fee_currency: RlpOptAddress,
    gateway_fee_recipient: RlpOptAddress,
    gateway_fee: u128,
    to: RlpOptAddress,
    value: u128,
    data: RlpBytes,
    chain_id: u64,
    empty_r: u8,
    empty_s: u8,
}

#[derive(RlpEncodable)]
struct SignedTxFields {
    nonce: u64,
    gas_price: u128,
    gas: u64,
    fee_currency: RlpOptAddress,
    gateway_fee_recipient: RlpOptAddress,
    gateway_fee: u128,
    to: RlpOptAddress,
    value: u128,
    data: RlpBytes,
    v: u64,
    r: RlpU256,
    s: RlpU256,
}

/// Optional 20-byte address; `None` encodes as the empty string (contract
/// creation, CELO fee currency, no gateway recipient).
#[derive(Debug, Clone)]
struct RlpOptAddress(Option<Address>);

impl Encodable for RlpOptAddress {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        match &self.0 {
            Some(address) => address.as_bytes().as_slice().encode(out),
            None => [0u8; 0].as_slice().encode(out),
        }
    }

    fn length(&self) -> usize {
        match &self.0 {
            Some(address) => address.as_bytes().as_slice().length(),
            None => [0u8; 0].as_slice().length(),
        }
    }
}

/// Byte string (as opposed to a list of integers).
#[derive(Debug, Clone)]
struct RlpBytes(Vec<u8>);

impl Encodable for RlpBytes {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.0.as_slice().encode(out);
    }

    fn length(&self) -> usize {
        self.0.as_slice().length()
    }
}

/// 256-bit integer encoded as minimal big-endian bytes with leading zeros
/// stripped (standard RLP integer encoding).
#[derive(Debug, Clone)]
struct RlpU256([u8; 32]);

impl Encodable for RlpU256 {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        strip_leading_zeros(&self.0).encode(out);
    }

    fn length(&self) -> usize {
        strip_leading_zeros(&self.0).length()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let hex_part = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(hex_part).map_err(serde::de::Error::custom)
    }
}
