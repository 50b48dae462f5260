use std::fmt;
use std::sync::Arc;

use chain_celo::Address;
use tokio::sync::Mutex;
use tracing::debug;

use crate::derivation::DerivationPath;
use crate::device::{AppConfiguration, LedgerDevice};
use crate::error::WalletError;
use crate::signature::{canonicalize, CanonicalSignature, RecoveryScheme};
use crate::validation::{Phase, ValidationPolicy};

/// The device plus the validation state, behind one lock.
///
/// Holding the lock is holding the device: validation decisions and the
/// commands they trigger happen under the same guard, in arrival order.
pub(crate) struct Session {
    pub(crate) device: Box<dyn LedgerDevice>,
    pub(crate) policy: ValidationPolicy,
}

pub(crate) type SharedSession = Arc<Mutex<Session>>;

/// Signs for one discovered account.
#[derive(Clone)]
pub struct LedgerSigner {
    address: Address,
    path: DerivationPath,
    session: SharedSession,
    app_configuration: Arc<AppConfiguration>,
}

impl LedgerSigner {
    pub(crate) fn new(
        address: Address,
        path: DerivationPath,
        session: SharedSession,
        app_configuration: Arc<AppConfiguration>,
    ) -> Self {
        Self {
            address,
            path,
            session,
            app_configuration,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn derivation_path(&self) -> &DerivationPath {
        &self.path
    }

    pub fn app_configuration(&self) -> &AppConfiguration {
        &self.app_configuration
    }

    /// Signs an RLP-encoded transaction signing payload for `chain_id`.
    pub async fn sign_transaction(
        &self,
        encoded_tx: &[u8],
        chain_id: u64,
    ) -> Result<CanonicalSignature, WalletError> {
        let raw = {
            let mut session = self.session.lock().await;
            self.validate_if_required(&mut session).await?;
            session.device.sign_transaction(&self.path, encoded_tx).await?
        };
        canonicalize(&raw, RecoveryScheme::Eip155 { chain_id })
    }

    pub async fn sign_personal_message(
        &self,
        data: &[u8],
    ) -> Result<CanonicalSignature, WalletError> {
        let raw = {
            let mut session = self.session.lock().await;
            self.validate_if_required(&mut session).await?;
            session.device.sign_personal_message(&self.path, data).await?
        };
        canonicalize(&raw, RecoveryScheme::Legacy)
    }

    pub async fn sign_typed_data_hash(
        &self,
        domain_separator: &[u8; 32],
        struct_hash: &[u8; 32],
    ) -> Result<CanonicalSignature, WalletError> {
        let raw = {
            let mut session = self.session.lock().await;
            self.validate_if_required(&mut session).await?;
            session
                .device
                .sign_typed_data_hash(&self.path, domain_separator, struct_hash)
                .await?
        };
        canonicalize(&raw, RecoveryScheme::Legacy)
    }

    /// Has the device re-display this account's address when the policy asks
    /// for it. The returned address is not used; the confirmation is.
    async fn validate_if_required(&self, session: &mut Session) -> Result<(), WalletError> {
        if !session
            .policy
            .should_validate(Phase::Transaction(&self.address))
        {
            return Ok(());
        }

        debug!(address = %self.address, path = %self.path, "forcing address validation");
        session.device.get_address(&self.path, true).await?;
        session.policy.mark_validated(self.address);
        Ok(())
    }
}

impl fmt::Debug for LedgerSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerSigner")
            .field("address", &self.address)
            .field("path", &self.path.to_string())
            .field("app_configuration", &self.app_configuration)
            .finish()
    }
}
