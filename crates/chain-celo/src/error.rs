use thiserror::Error;

#[derive(Debug, Error)]
pub enum CeloError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A field the legacy Celo encoding cannot do without.
    #[error("transaction is missing {0}")]
    MissingField(&'static str),
}
