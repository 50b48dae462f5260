use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chain_celo::transaction::{encode_for_signing, encode_signed};
use chain_celo::{Address, CeloError, CeloTx, EncodedTransaction};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::WalletConfig;
use crate::derivation::DerivationPath;
use crate::device::{AppConfiguration, LedgerDevice};
use crate::error::{DeviceError, WalletError};
use crate::signature::CanonicalSignature;
use crate::signer::{LedgerSigner, Session, SharedSession};
use crate::validation::{Phase, ValidationPolicy};

enum WalletState {
    Uninitialized,
    /// Discovery started but never finished (the `init` future was dropped).
    Discovering,
    Ready(Accounts),
    Failed(String),
}

/// Discovered accounts, in discovery order.
struct Accounts {
    order: Vec<Address>,
    signers: HashMap<Address, LedgerSigner>,
    app_configuration: Arc<AppConfiguration>,
}

impl Accounts {
    fn new(app_configuration: Arc<AppConfiguration>) -> Self {
        Self {
            order: Vec::new(),
            signers: HashMap::new(),
            app_configuration,
        }
    }

    fn insert(&mut self, signer: LedgerSigner) {
        let address = *signer.address();
        match self.signers.insert(address, signer) {
            Some(previous) => warn!(
                %address,
                previous_path = %previous.derivation_path(),
                "device returned the same address for two paths; keeping the later one"
            ),
            None => self.order.push(address),
        }
    }

    fn signer(&self, address: &Address) -> Result<&LedgerSigner, WalletError> {
        self.signers
            .get(address)
            .ok_or(WalletError::UnknownAddress(*address))
    }
}

/// A wallet whose keys live on a Ledger device running the Celo app.
///
/// Call [`init`](Self::init) once to discover the accounts; every query and
/// signing method fails with [`WalletError::NotInitialized`] until it has
/// succeeded. After that the wallet can be shared (`Arc<LedgerWallet>`) and
/// signed through concurrently: device commands are queued in arrival order.
pub struct LedgerWallet {
    config: WalletConfig,
    paths: Vec<DerivationPath>,
    session: SharedSession,
    state: WalletState,
}

impl fmt::Debug for LedgerWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerWallet")
            .field("config", &self.config)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl LedgerWallet {
    /// Validates `config` and takes ownership of the device. No device
    /// command is sent.
    pub fn new(
        config: WalletConfig,
        device: impl LedgerDevice + 'static,
    ) -> Result<Self, WalletError> {
        let paths = config.derivation_paths()?;
        let session = Session {
            device: Box::new(device),
            policy: ValidationPolicy::new(config.address_validation),
        };

        Ok(Self {
            config,
            paths,
            session: Arc::new(Mutex::new(session)),
            state: WalletState::Uninitialized,
        })
    }

    /// [`new`](Self::new) followed by [`init`](Self::init).
    pub async fn new_with_setup(
        config: WalletConfig,
        device: impl LedgerDevice + 'static,
    ) -> Result<Self, WalletError> {
        let mut wallet = Self::new(config, device)?;
        wallet.init().await?;
        Ok(wallet)
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, WalletState::Ready(_))
    }

    /// Discovers the configured accounts.
    ///
    /// Idempotent once it has succeeded. A failed discovery is final: later
    /// calls return [`WalletError::InitializationFailed`] and a new wallet
    /// has to be built.
    pub async fn init(&mut self) -> Result<(), WalletError> {
        match &self.state {
            WalletState::Ready(_) => return Ok(()),
            WalletState::Failed(reason) => {
                return Err(WalletError::InitializationFailed(reason.clone()))
            }
            WalletState::Uninitialized | WalletState::Discovering => {}
        }

        self.state = WalletState::Discovering;
        info!(accounts = self.paths.len(), "fetching addresses from the ledger");

        match self.discover().await {
            Ok(accounts) => {
                info!(accounts = accounts.order.len(), "ledger wallet ready");
                self.state = WalletState::Ready(accounts);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "ledger discovery failed");
                self.state = WalletState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// One pass over the configured paths. Nothing is kept unless every
    /// path yields an address.
    async fn discover(&self) -> Result<Accounts, WalletError> {
        let mut session = self.session.lock().await;

        let app_configuration = session.device.get_app_configuration().await?;
        if !app_configuration.arbitrary_data_enabled {
            warn!(
                version = %app_configuration.version,
                "Beware, your ledger does not allow the use of contract data. Some features may not work correctly, \
                 including token transfers. You can enable it from the ledger app settings menu."
            );
        }
        let app_configuration = Arc::new(app_configuration);

        let force_validation = session.policy.should_validate(Phase::Discovery);
        let mut accounts = Accounts::new(Arc::clone(&app_configuration));

        for path in &self.paths {
            debug!(%path, "discovering account");
            let info = session.device.get_address(path, force_validation).await?;
            let address = info.address.ok_or_else(|| DeviceError::AddressUnavailable {
                path: path.to_string(),
            })?;

            accounts.insert(LedgerSigner::new(
                address,
                path.clone(),
                Arc::clone(&self.session),
                Arc::clone(&app_configuration),
            ));
        }

        Ok(accounts)
    }

    fn accounts(&self) -> Result<&Accounts, WalletError> {
        match &self.state {
            WalletState::Ready(accounts) => Ok(accounts),
            _ => Err(WalletError::NotInitialized),
        }
    }

    /// Discovered addresses, in the order their indexes were configured.
    pub fn get_accounts(&self) -> Result<Vec<Address>, WalletError> {
        Ok(self.accounts()?.order.clone())
    }

    pub fn has_account(&self, address: &Address) -> Result<bool, WalletError> {
        Ok(self.accounts()?.signers.contains_key(address))
    }

    pub fn get_signer(&self, address: &Address) -> Result<&LedgerSigner, WalletError> {
        self.accounts()?.signer(address)
    }

    /// App configuration fetched during discovery.
    pub fn app_configuration(&self) -> Result<&AppConfiguration, WalletError> {
        Ok(&self.accounts()?.app_configuration)
    }

    /// Signs `tx` with the account named by `tx.from`.
    ///
    /// Fee-market fields are folded into `gasPrice` first, since the device
    /// only signs legacy Celo transactions.
    pub async fn sign_transaction(&self, mut tx: CeloTx) -> Result<EncodedTransaction, WalletError> {
        let accounts = self.accounts()?;

        if tx.normalize_legacy_fees() {
            warn!(
                "maxFeePerGas and maxPriorityFeePerGas are not supported on Ledger yet. \
                 Automatically using gasPrice instead."
            );
        }

        let from = tx.from.ok_or(CeloError::MissingField("from"))?;
        let signer = accounts.signer(&from)?;

        if !tx.data.is_empty() && !signer.app_configuration().arbitrary_data_enabled {
            warn!(
                %from,
                "transaction carries contract data but contract data is disabled on the device"
            );
        }

        let encoded = encode_for_signing(&tx)?;
        let signature = signer.sign_transaction(&encoded, tx.chain_id).await?;
        Ok(encode_signed(&tx, signature.v, signature.r, signature.s)?)
    }

    /// Signs `data` as an EIP-191 personal message.
    pub async fn sign_personal_message(
        &self,
        address: &Address,
        data: &[u8],
    ) -> Result<CanonicalSignature, WalletError> {
        self.accounts()?
            .signer(address)?
            .sign_personal_message(data)
            .await
    }

    /// Signs an EIP-712 message from its precomputed hashes.
    pub async fn sign_typed_data_hash(
        &self,
        address: &Address,
        domain_separator: &[u8; 32],
        struct_hash: &[u8; 32],
    ) -> Result<CanonicalSignature, WalletError> {
        self.accounts()?
            .signer(address)?
            .sign_typed_data_hash(domain_separator, struct_hash)
            .await
    }

    /// Number of addresses already confirmed on the device under
    /// `firstTransactionPerAddress`.
    pub async fn validated_address_count(&self) -> usize {
        self.session.lock().await.policy.validated_count()
    }
}

/// Builds a [`LedgerWallet`] and runs discovery.
pub async fn new_ledger_wallet_with_setup(
    config: WalletConfig,
    device: impl LedgerDevice + 'static,
) -> Result<LedgerWallet, WalletError> {
    LedgerWallet::new_with_setup(config, device).await
}
