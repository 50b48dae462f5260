//! Hardware-wallet signer for Celo accounts held on a Ledger device.
//!
//! The wallet discovers the accounts the device exposes along a base
//! derivation path, then forwards transaction, personal-message and typed-data
//! signing requests to the device and reassembles the device's raw `(v, r, s)`
//! into canonical, chain-correct signatures.
//!
//! ```text
//! LedgerWallet ──init()──► discovery (sequential getAddress per path)
//!      │                          │
//!      └── sign_*() ──► LedgerSigner ──► Session { device, policy } ──► canonicalize
//! ```

pub mod apdu;
pub mod celo_app;
pub mod config;
pub mod derivation;
pub mod device;
pub mod error;
pub mod signature;
pub mod signer;
pub mod validation;
pub mod wallet;

pub use config::WalletConfig;
pub use derivation::DerivationPath;
pub use device::{AddressInfo, AppConfiguration, LedgerDevice};
pub use error::{DeviceError, WalletError};
pub use signature::{CanonicalSignature, RawSignature, RecoveryScheme, VFormat};
pub use signer::LedgerSigner;
pub use validation::AddressValidation;
pub use wallet::{new_ledger_wallet_with_setup, LedgerWallet};
