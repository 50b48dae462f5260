use chain_celo::{Address, CeloError};
use thiserror::Error;

/// Errors raised by a [`LedgerDevice`](crate::device::LedgerDevice).
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device answered with a non-success APDU status word.
    #[error("ledger device: {message} (0x{status_code:04x})")]
    TransportStatus { status_code: u16, message: String },

    /// The transport below the device app failed (disconnected, busy channel,
    /// HID I/O error).
    #[error("ledger transport error ({id}): {message}")]
    Transport { id: String, message: String },

    #[error("device returned no address for path {path}")]
    AddressUnavailable { path: String },

    #[error("invalid device response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

impl DeviceError {
    /// Builds a status error with the standard description of `status_code`.
    pub fn status(status_code: u16) -> Self {
        DeviceError::TransportStatus {
            status_code,
            message: status_description(status_code).to_string(),
        }
    }
}

/// Wallet operation errors.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet needs to be initialized first")]
    NotInitialized,

    #[error("wallet initialization failed: {0}")]
    InitializationFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A transport-level failure, rewritten for the user.
    #[error("{message}")]
    DeviceUnavailable {
        message: String,
        #[source]
        source: DeviceError,
    },

    #[error(transparent)]
    Device(DeviceError),

    #[error("could not find address {0}")]
    UnknownAddress(Address),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("transaction error: {0}")]
    Transaction(#[from] CeloError),
}

impl From<DeviceError> for WalletError {
    fn from(e: DeviceError) -> Self {
        match friendly_message(&e) {
            Some(message) => WalletError::DeviceUnavailable { message, source: e },
            None => WalletError::Device(e),
        }
    }
}

/// User-facing rewrite of the two transport error categories. Everything else
/// is left untouched.
fn friendly_message(e: &DeviceError) -> Option<String> {
    match e {
        DeviceError::TransportStatus {
            status_code,
            message,
        } => {
            let hint = match status_code {
                0x5515 | 0x6b0c => "Ledger device is locked. Unlock it and try again.",
                0x6985 => "The request was rejected on the Ledger device.",
                0x6a80 => {
                    "The Ledger refused the transaction data. Enable contract data in the Celo app settings."
                }
                0x6511 | 0x6d00 | 0x6e00 | 0x6e01 => {
                    "The Celo app is not open on the Ledger device. Open it and try again."
                }
                _ => "Possible connection lost with the ledger. Check if still on and connected.",
            };
            Some(format!("{hint} ({message}, 0x{status_code:04x})"))
        }
        DeviceError::Transport { message, .. } => Some(format!(
            "Possible connection lost with the ledger. Check if still on and connected. {message}"
        )),
        _ => None,
    }
}

/// Standard description of an APDU status word.
pub(crate) fn status_description(status_code: u16) -> &'static str {
    match status_code {
        0x9000 => "success",
        0x5515 | 0x6b0c => "device locked",
        0x6700 => "incorrect length",
        0x6804 => "unknown error",
        0x6982 => "security status not satisfied",
        0x6985 => "conditions of use not satisfied",
        0x6a80 => "incorrect data",
        0x6b00 => "incorrect parameters",
        0x6511 | 0x6d00 => "instruction not supported",
        0x6e00 | 0x6e01 => "class not supported",
        0x6f00 => "technical problem",
        _ => "unknown status",
    }
}
