//! Error types for flowdex-sync

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    /// The remote gateway reported a non-online status.
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// A gateway call failed for a transient reason (network, node error).
    #[error("gateway error: {0}")]
    Gateway(String),

    /// A requested chain object does not exist (e.g. height past the head).
    #[error("not found: {0}")]
    NotFound(String),

    /// The account does not exist on chain. Callers use this as a
    /// control-flow signal ("not bootstrapped yet"), not as a failure.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("block processing error at height {height}: {message}")]
    BlockProcessing { height: u64, message: String },

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl IndexerError {
    /// Whether this error means "the account is not yet live on chain".
    pub fn is_account_not_found(&self) -> bool {
        matches!(self, IndexerError::AccountNotFound(_))
    }
}

pub type IndexerResult<T> = Result<T, IndexerError>;
