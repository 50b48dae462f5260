//! Canonicalization of device signatures.
//!
//! The device hands back `(v, r, s)` with `r`/`s` as variable-width big-endian
//! byte strings and `v` in whatever convention the command uses. Everything
//! here is a pure transformation into fixed-width components plus the `v`
//! value the target encoding expects.

use chain_celo::Address;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::FieldBytes;

use crate::error::WalletError;

/// A signature exactly as the device returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSignature {
    pub v: u64,
    /// How the device encoded `v`.
    pub v_format: VFormat,
    pub r: Vec<u8>,
    pub s: Vec<u8>,
}

/// Convention the device used for `v`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VFormat {
    /// The recovery id, bare (`0`/`1`) or offset by 27.
    #[default]
    RecoveryId,
    /// The EIP-155 value, either full width or truncated to its low byte.
    /// Ledger apps answer transaction signing this way.
    Eip155,
}

/// How the recovery id is embedded in the final `v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryScheme {
    /// `v = 27 + recovery_id`, used by EIP-191 and EIP-712 signatures.
    Legacy,
    /// `v = chain_id * 2 + 35 + recovery_id`, used by transactions.
    Eip155 { chain_id: u64 },
}

impl RecoveryScheme {
    fn offset(&self) -> Result<u64, WalletError> {
        match self {
            RecoveryScheme::Legacy => Ok(27),
            RecoveryScheme::Eip155 { chain_id } => chain_id
                .checked_mul(2)
                .and_then(|doubled| doubled.checked_add(35))
                .ok_or_else(|| {
                    WalletError::MalformedSignature(format!("chain id {chain_id} out of range"))
                }),
        }
    }
}

/// Fixed-width signature with `v` already transformed for its scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalSignature {
    pub v: u64,
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// The `{0, 1}` recovery id `v` was derived from.
    pub recovery_id: u8,
}

impl CanonicalSignature {
    /// `r` as a minimal big-endian integer (no leading zero bytes).
    pub fn r_minimal(&self) -> &[u8] {
        strip_leading_zeros(&self.r)
    }

    /// `s` as a minimal big-endian integer (no leading zero bytes).
    pub fn s_minimal(&self) -> &[u8] {
        strip_leading_zeros(&self.s)
    }

    /// `r || s || v`, with `v` as minimal big-endian bytes (one byte for the
    /// legacy scheme).
    pub fn to_rsv_bytes(&self) -> Vec<u8> {
        let v_bytes = self.v.to_be_bytes();
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&self.r);
        out.extend_from_slice(&self.s);
        out.extend_from_slice(strip_leading_zeros(&v_bytes));
        out
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_rsv_bytes()))
    }
}

/// Turns a device signature into its canonical form for `scheme`.
///
/// `r` and `s` lose any leading zero bytes and are left-padded back to 32
/// bytes; more than 32 significant bytes, or a zero component, is malformed.
/// The device `v` is reduced to a recovery id, which must be 0 or 1, then
/// re-encoded with the scheme's offset.
pub fn canonicalize(
    raw: &RawSignature,
    scheme: RecoveryScheme,
) -> Result<CanonicalSignature, WalletError> {
    let r = fixed_width("r", &raw.r)?;
    let s = fixed_width("s", &raw.s)?;

    let recovery_id = device_recovery_id(raw, scheme)?;
    if recovery_id > 1 {
        return Err(WalletError::MalformedSignature(format!(
            "recovery id {recovery_id} out of range (device v = {})",
            raw.v
        )));
    }

    let v = scheme
        .offset()?
        .checked_add(u64::from(recovery_id))
        .ok_or_else(|| WalletError::MalformedSignature("v overflows u64".into()))?;

    Ok(CanonicalSignature {
        v,
        r,
        s,
        recovery_id,
    })
}

/// Recovers the address that produced `signature` over `prehash`.
pub fn recover_address(
    prehash: &[u8; 32],
    signature: &CanonicalSignature,
) -> Result<Address, WalletError> {
    let sig = Signature::from_scalars(
        FieldBytes::clone_from_slice(&signature.r),
        FieldBytes::clone_from_slice(&signature.s),
    )
    .map_err(|e| WalletError::MalformedSignature(e.to_string()))?;

    let recovery_id = RecoveryId::from_byte(signature.recovery_id).ok_or_else(|| {
        WalletError::MalformedSignature(format!("invalid recovery id {}", signature.recovery_id))
    })?;

    let key = VerifyingKey::recover_from_prehash(prehash, &sig, recovery_id)
        .map_err(|e| WalletError::MalformedSignature(e.to_string()))?;

    let point = key.to_encoded_point(false);
    let uncompressed: [u8; 65] = point
        .as_bytes()
        .try_into()
        .map_err(|_| WalletError::MalformedSignature("unexpected public key length".into()))?;

    Ok(Address::from_public_key(&uncompressed)?)
}

/// Reduces the device's `v` to a recovery id.
///
/// A [`VFormat::Eip155`] value is only meaningful for transactions; the
/// Ledger truncates it to its low byte when the chain id is large, so the
/// low byte is compared modulo 256 against the scheme's offset.
fn device_recovery_id(raw: &RawSignature, scheme: RecoveryScheme) -> Result<u8, WalletError> {
    let out_of_range = || {
        WalletError::MalformedSignature(format!(
            "recovery id out of range (device v = {}, {:?})",
            raw.v, raw.v_format
        ))
    };

    match (raw.v_format, scheme) {
        (VFormat::RecoveryId, _) => match raw.v {
            0 | 1 => Ok(raw.v as u8),
            27 | 28 => Ok((raw.v - 27) as u8),
            _ => Err(out_of_range()),
        },
        (VFormat::Eip155, RecoveryScheme::Eip155 { .. }) => {
            let offset = scheme.offset()?;
            if raw.v >= offset && raw.v - offset <= 1 {
                return Ok((raw.v - offset) as u8);
            }
            if raw.v > 0xff {
                return Err(out_of_range());
            }
            let parity = (raw.v as u8).wrapping_sub(offset as u8);
            if parity <= 1 {
                Ok(parity)
            } else {
                Err(out_of_range())
            }
        }
        (VFormat::Eip155, RecoveryScheme::Legacy) => Err(WalletError::MalformedSignature(
            "EIP-155 v returned for a message signature".into(),
        )),
    }
}

fn fixed_width(name: &str, bytes: &[u8]) -> Result<[u8; 32], WalletError> {
    let significant = strip_leading_zeros(bytes);
    if significant.is_empty() {
        return Err(WalletError::MalformedSignature(format!("{name} is zero")));
    }
    if significant.len() > 32 {
        return Err(WalletError::MalformedSignature(format!(
            "{name} is {} bytes, expected at most 32",
            significant.len()
        )));
    }

    let mut out = [0u8; 32];
    out[32 - significant.len()..].copy_from_slice(significant);
    Ok(out)
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}
