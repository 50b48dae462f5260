use serde::{Deserialize, Serialize};

use crate::derivation::{DerivationPath, CELO_BASE_DERIVATION_PATH, DEFAULT_ADDRESS_QTY};
use crate::error::WalletError;
use crate::validation::AddressValidation;

/// Construction parameters of a [`LedgerWallet`](crate::wallet::LedgerWallet).
///
/// Every field has a default, so `{}` is a valid JSON configuration:
/// indexes `0..5` under `44'/52752'/0'/0`, validating each address on its
/// first transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct WalletConfig {
    /// `address_index` values appended to the base path, discovered in this
    /// order.
    pub derivation_path_indexes: Vec<u32>,
    pub base_derivation_path: String,
    pub address_validation: AddressValidation,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            derivation_path_indexes: (0..DEFAULT_ADDRESS_QTY).collect(),
            base_derivation_path: CELO_BASE_DERIVATION_PATH.to_string(),
            address_validation: AddressValidation::default(),
        }
    }
}

impl WalletConfig {
    /// Parses a JSON configuration. Negative or fractional indexes fail here.
    pub fn from_json(json: &str) -> Result<Self, WalletError> {
        serde_json::from_str(json).map_err(|e| {
            WalletError::InvalidConfiguration(format!("ledger-wallet: {e}"))
        })
    }

    pub fn with_indexes(mut self, indexes: impl IntoIterator<Item = u32>) -> Self {
        self.derivation_path_indexes = indexes.into_iter().collect();
        self
    }

    pub fn with_base_derivation_path(mut self, path: impl Into<String>) -> Self {
        self.base_derivation_path = path.into();
        self
    }

    pub fn with_address_validation(mut self, validation: AddressValidation) -> Self {
        self.address_validation = validation;
        self
    }

    /// Checks the base path and every index without touching a device.
    pub fn validate(&self) -> Result<(), WalletError> {
        self.derivation_paths().map(|_| ())
    }

    /// Resolves every configured index against the base path, in order.
    pub fn derivation_paths(&self) -> Result<Vec<DerivationPath>, WalletError> {
        let base: DerivationPath = self.base_derivation_path.parse()?;
        self.derivation_path_indexes
            .iter()
            .map(|&index| {
                base.child(index).map_err(|_| {
                    WalletError::InvalidConfiguration(format!(
                        "ledger-wallet: Invalid address index {index}"
                    ))
                })
            })
            .collect()
    }
}
