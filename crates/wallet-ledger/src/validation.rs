use std::collections::HashSet;

use chain_celo::Address;
use serde::{Deserialize, Serialize};

/// When the device is asked to re-display an address for user confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AddressValidation {
    /// Validates every address only while the wallet is initialized.
    InitializationOnly,
    /// Validates the address before every signing request.
    EveryTransaction,
    /// Validates the address the first time it signs.
    #[default]
    FirstTransactionPerAddress,
    /// Never validates.
    Never,
}

/// Where a validation question is being asked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase<'a> {
    /// Account discovery during `init()`.
    Discovery,
    /// A signing request for the given address.
    Transaction(&'a Address),
}

/// Validation mode plus the set of addresses already validated.
///
/// One instance is shared by every signer of a wallet, so "first transaction
/// per address" is tracked wallet-wide.
#[derive(Debug, Default)]
pub struct ValidationPolicy {
    mode: AddressValidation,
    validated: HashSet<Address>,
}

impl ValidationPolicy {
    pub fn new(mode: AddressValidation) -> Self {
        Self {
            mode,
            validated: HashSet::new(),
        }
    }

    pub fn mode(&self) -> AddressValidation {
        self.mode
    }

    pub fn should_validate(&self, phase: Phase<'_>) -> bool {
        match (self.mode, phase) {
            (AddressValidation::Never, _) => false,
            (AddressValidation::InitializationOnly, Phase::Discovery) => true,
            (AddressValidation::InitializationOnly, Phase::Transaction(_)) => false,
            (AddressValidation::EveryTransaction, Phase::Discovery) => false,
            (AddressValidation::EveryTransaction, Phase::Transaction(_)) => true,
            (AddressValidation::FirstTransactionPerAddress, Phase::Discovery) => false,
            (AddressValidation::FirstTransactionPerAddress, Phase::Transaction(address)) => {
                !self.validated.contains(address)
            }
        }
    }

    /// Records a successful forced validation. Only the per-address mode keeps
    /// state; for the others this is a no-op.
    pub fn mark_validated(&mut self, address: Address) {
        if self.mode == AddressValidation::FirstTransactionPerAddress {
            self.validated.insert(address);
        }
    }

    pub fn validated_count(&self) -> usize {
        self.validated.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Address::new(bytes)
    }

    #[test]
    fn default_mode_is_first_transaction_per_address() {
        assert_eq!(
            AddressValidation::default(),
            AddressValidation::FirstTransactionPerAddress
        );
        assert_eq!(
            ValidationPolicy::default().mode(),
            AddressValidation::FirstTransactionPerAddress
        );
    }

    #[test]
    fn never_is_always_false() {
        let mut policy = ValidationPolicy::new(AddressValidation::Never);
        assert!(!policy.should_validate(Phase::Discovery));
        assert!(!policy.should_validate(Phase::Transaction(&addr(1))));
        policy.mark_validated(addr(1));
        assert!(!policy.should_validate(Phase::Transaction(&addr(1))));
        assert_eq!(policy.validated_count(), 0);
    }

    #[test]
    fn initialization_only_validates_during_discovery() {
        let policy = ValidationPolicy::new(AddressValidation::InitializationOnly);
        assert!(policy.should_validate(Phase::Discovery));
        assert!(!policy.should_validate(Phase::Transaction(&addr(1))));
    }

    #[test]
    fn every_transaction_ignores_history() {
        let mut policy = ValidationPolicy::new(AddressValidation::EveryTransaction);
        assert!(!policy.should_validate(Phase::Discovery));
        assert!(policy.should_validate(Phase::Transaction(&addr(1))));
        policy.mark_validated(addr(1));
        assert!(policy.should_validate(Phase::Transaction(&addr(1))));
        assert_eq!(policy.validated_count(), 0);
    }

    #[test]
    fn first_transaction_per_address_validates_once_each() {
        let mut policy = ValidationPolicy::new(AddressValidation::FirstTransactionPerAddress);
        assert!(!policy.should_validate(Phase::Discovery));

        assert!(policy.should_validate(Phase::Transaction(&addr(1))));
        policy.mark_validated(addr(1));
        assert!(!policy.should_validate(Phase::Transaction(&addr(1))));

        assert!(policy.should_validate(Phase::Transaction(&addr(2))));
        policy.mark_validated(addr(2));
        policy.mark_validated(addr(2));
        assert_eq!(policy.validated_count(), 2);
    }

    #[test]
    fn serde_names_are_camel_case() {
        let parsed: AddressValidation = serde_json::from_str("\"initializationOnly\"").unwrap();
        assert_eq!(parsed, AddressValidation::InitializationOnly);
        assert_eq!(
            serde_json::to_string(&AddressValidation::FirstTransactionPerAddress).unwrap(),
            "\"firstTransactionPerAddress\""
        );
    }
}
