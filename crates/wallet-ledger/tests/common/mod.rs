//! In-memory Ledger test double.
//!
//! Signs with real secp256k1 keys so that signatures recover, and records
//! every command it receives so tests can count forced validations.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chain_celo::message::{hash_personal_message, hash_typed_data};
use chain_celo::Address;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use wallet_ledger::{
    AddressInfo, AppConfiguration, DerivationPath, DeviceError, LedgerDevice, RawSignature,
    VFormat,
};

pub const CHAIN_ID: u64 = 44378;

pub const PRIVATE_KEYS: [&str; 5] = [
    "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef",
    "1234567890abcdef1234567890abcdef1234567890abcdef1234567890fdeccc",
    "1234567890abcdef1234567890abcdef1234567890abcdef1234567890fffff1",
    "1234567890abcdef1234567890abcdef1234567890abcdef1234567890fffff2",
    "1234567890abcdef1234567890abcdef1234567890abcdef1234567890fffff3",
];

/// Never handed to the device.
pub const PRIVATE_KEY_NEVER: &str =
    "1234567890abcdef1234567890abcdef1234567890abcdef1234567890ffffff";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn signing_key(key_hex: &str) -> SigningKey {
    SigningKey::from_slice(&hex::decode(key_hex).unwrap()).unwrap()
}

pub fn address_of(key_hex: &str) -> Address {
    let point = signing_key(key_hex).verifying_key().to_encoded_point(false);
    let uncompressed: [u8; 65] = point.as_bytes().try_into().unwrap();
    Address::from_public_key(&uncompressed).unwrap()
}

/// Addresses of [`PRIVATE_KEYS`], in index order.
pub fn known_addresses() -> Vec<Address> {
    PRIVATE_KEYS.iter().map(|key| address_of(key)).collect()
}

pub fn celo_path(index: u32) -> DerivationPath {
    format!("44'/52752'/0'/0/{index}").parse().unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AppConfiguration,
    GetAddress { path: String, forced: bool },
    SignTransaction { path: String },
    SignPersonalMessage { path: String },
    SignTypedData { path: String },
}

/// How a scripted command fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The HID channel went away.
    Disconnected,
    /// The user pressed reject on the device.
    Rejected,
    /// Not a transport error.
    Firmware,
}

impl Failure {
    fn to_error(self) -> DeviceError {
        match self {
            Failure::Disconnected => DeviceError::Transport {
                id: "DisconnectedDevice".into(),
                message: "The device was disconnected.".into(),
            },
            Failure::Rejected => DeviceError::status(0x6985),
            Failure::Firmware => DeviceError::Other("firmware hiccup".into()),
        }
    }
}

/// Observes a [`MockLedger`] after it has been moved into a wallet.
#[derive(Clone, Default)]
pub struct MockHandle {
    calls: Arc<Mutex<Vec<Call>>>,
    in_flight: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
}

impl MockHandle {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// `getAddress` calls that asked the device to display the address.
    pub fn forced_validations(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| matches!(call, Call::GetAddress { forced: true, .. }))
            .count()
    }

    /// Commands that started while another one was still running.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn begin(&self, call: Call) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push(call);
    }

    fn end(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

pub struct MockLedger {
    keys: HashMap<String, SigningKey>,
    handle: MockHandle,
    arbitrary_data_enabled: bool,
    declined: HashSet<String>,
    address_failures: HashMap<String, Failure>,
    sign_failure: Option<Failure>,
    trim_signatures: bool,
    chain_id: u64,
    bare_transaction_v: bool,
}

impl MockLedger {
    /// A device holding [`PRIVATE_KEYS`] at indexes `0..5` of the Celo path.
    pub fn new() -> Self {
        let mut ledger = Self {
            keys: HashMap::new(),
            handle: MockHandle::default(),
            arbitrary_data_enabled: true,
            declined: HashSet::new(),
            address_failures: HashMap::new(),
            sign_failure: None,
            trim_signatures: false,
            chain_id: CHAIN_ID,
            bare_transaction_v: false,
        };
        for (index, key) in PRIVATE_KEYS.iter().enumerate() {
            ledger = ledger.with_key(index as u32, key);
        }
        ledger
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }

    pub fn with_key(mut self, index: u32, key_hex: &str) -> Self {
        self.keys
            .insert(celo_path(index).to_string(), signing_key(key_hex));
        self
    }

    pub fn with_contract_data_disabled(mut self) -> Self {
        self.arbitrary_data_enabled = false;
        self
    }

    /// Returns an empty `getAddress` result for `index`.
    pub fn declining(mut self, index: u32) -> Self {
        self.declined.insert(celo_path(index).to_string());
        self
    }

    pub fn failing_address(mut self, index: u32, failure: Failure) -> Self {
        self.address_failures
            .insert(celo_path(index).to_string(), failure);
        self
    }

    pub fn failing_signatures(mut self, failure: Failure) -> Self {
        self.sign_failure = Some(failure);
        self
    }

    /// Sends `r`/`s` without leading zero bytes, as some firmware does.
    pub fn trimming_signatures(mut self) -> Self {
        self.trim_signatures = true;
        self
    }

    /// Chain id the device folds into transaction `v`. It must match the
    /// `chain_id` of the transactions being signed.
    pub fn on_chain(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Answers transactions with the bare recovery id instead of the
    /// truncated EIP-155 `v`.
    pub fn reporting_bare_transaction_v(mut self) -> Self {
        self.bare_transaction_v = true;
        self
    }

    async fn busy(&self) {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    fn key(&self, path: &DerivationPath) -> Result<&SigningKey, DeviceError> {
        self.keys
            .get(&path.to_string())
            .ok_or_else(|| DeviceError::Other(format!("no key at {path}")))
    }

    fn sign_prehash(
        &self,
        path: &DerivationPath,
        prehash: &[u8; 32],
        v_offset: u64,
        v_format: VFormat,
    ) -> Result<RawSignature, DeviceError> {
        if let Some(failure) = self.sign_failure {
            return Err(failure.to_error());
        }

        let (signature, recovery_id) = self
            .key(path)?
            .sign_prehash_recoverable(prehash)
            .map_err(|e| DeviceError::Other(e.to_string()))?;

        let rs = signature.to_bytes();
        let mut r = rs[..32].to_vec();
        let mut s = rs[32..].to_vec();
        if self.trim_signatures {
            r = trim(r);
            s = trim(s);
        }

        // The device reports v as a single byte.
        let v = (v_offset + u64::from(recovery_id.to_byte())) & 0xff;
        Ok(RawSignature { v, v_format, r, s })
    }

    async fn run<T>(
        &self,
        call: Call,
        f: impl FnOnce(&Self) -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        self.handle.begin(call);
        self.busy().await;
        let result = f(self);
        self.handle.end();
        result
    }
}

fn trim(bytes: Vec<u8>) -> Vec<u8> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

#[async_trait]
impl LedgerDevice for MockLedger {
    async fn get_address(
        &mut self,
        path: &DerivationPath,
        force_validation: bool,
    ) -> Result<AddressInfo, DeviceError> {
        let call = Call::GetAddress {
            path: path.to_string(),
            forced: force_validation,
        };
        self.run(call, |ledger| {
            let key = path.to_string();
            if let Some(failure) = ledger.address_failures.get(&key) {
                return Err(failure.to_error());
            }
            if ledger.declined.contains(&key) {
                return Ok(AddressInfo {
                    address: None,
                    path: path.clone(),
                });
            }

            let point = ledger.key(path)?.verifying_key().to_encoded_point(false);
            let uncompressed: [u8; 65] = point
                .as_bytes()
                .try_into()
                .map_err(|_| DeviceError::Other("bad public key".into()))?;
            let address = Address::from_public_key(&uncompressed)
                .map_err(|e| DeviceError::Other(e.to_string()))?;

            Ok(AddressInfo {
                address: Some(address),
                path: path.clone(),
            })
        })
        .await
    }

    async fn sign_transaction(
        &mut self,
        path: &DerivationPath,
        encoded_tx: &[u8],
    ) -> Result<RawSignature, DeviceError> {
        let call = Call::SignTransaction {
            path: path.to_string(),
        };
        let prehash: [u8; 32] = Keccak256::digest(encoded_tx).into();
        self.run(call, |ledger| {
            if ledger.bare_transaction_v {
                ledger.sign_prehash(path, &prehash, 0, VFormat::RecoveryId)
            } else {
                ledger.sign_prehash(path, &prehash, ledger.chain_id * 2 + 35, VFormat::Eip155)
            }
        })
        .await
    }

    async fn sign_personal_message(
        &mut self,
        path: &DerivationPath,
        data: &[u8],
    ) -> Result<RawSignature, DeviceError> {
        let call = Call::SignPersonalMessage {
            path: path.to_string(),
        };
        let prehash = hash_personal_message(data);
        self.run(call, |ledger| ledger.sign_prehash(path, &prehash, 27, VFormat::RecoveryId))
            .await
    }

    async fn sign_typed_data_hash(
        &mut self,
        path: &DerivationPath,
        domain_separator: &[u8; 32],
        struct_hash: &[u8; 32],
    ) -> Result<RawSignature, DeviceError> {
        let call = Call::SignTypedData {
            path: path.to_string(),
        };
        let prehash = hash_typed_data(domain_separator, struct_hash);
        self.run(call, |ledger| ledger.sign_prehash(path, &prehash, 27, VFormat::RecoveryId))
            .await
    }

    async fn get_app_configuration(&mut self) -> Result<AppConfiguration, DeviceError> {
        let enabled = self.arbitrary_data_enabled;
        self.run(Call::AppConfiguration, |_| {
            Ok(AppConfiguration {
                arbitrary_data_enabled: enabled,
                version: "1.0.3".into(),
            })
        })
        .await
    }
}
