use std::io;

use thiserror::Error;

/// Failures reported by the wallet, contract or feed collaborators.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no injected wallet detected")]
    NoWallet,
    #[error("request rejected by user")]
    UserRejected,
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("wallet not detected")]
    NoWallet,
    #[error("connection rejected")]
    Rejected,
    #[error("wallet returned no accounts")]
    NoAccounts,
    #[error("connection already in progress")]
    InProgress,
    /// A disconnect or account change replaced this attempt while it ran
    #[error("connection attempt superseded")]
    Superseded,
    #[error("connection failed: {0}")]
    Provider(ProviderError),
}

impl From<ProviderError> for ConnectError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NoWallet => ConnectError::NoWallet,
            ProviderError::UserRejected => ConnectError::Rejected,
            other => ConnectError::Provider(other),
        }
    }
}

/// Parse failures for user-typed amounts.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount is not a number: {0}")]
    NotANumber(String),
    #[error("amount has more than {0} decimal places")]
    TooPrecise(u8),
    #[error("amount is too large")]
    Overflow,
}

/// Local rejections. The display text is the reason shown to the user.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("wallet not connected")]
    NotConnected,
    #[error("wrong network")]
    WrongNetwork,
    #[error("not authorized")]
    NotAuthorized,
    #[error("contract paused")]
    Paused,
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("exceeds available reserve")]
    ExceedsReserve,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("below total supply")]
    BelowTotalSupply,
    #[error("reserve can only be set on a mock feed")]
    MockFeedOnly,
    #[error("invalid address")]
    InvalidAddress,
    #[error("invalid amount: {0}")]
    InvalidAmount(AmountError),
    #[error("reserve data not loaded")]
    NoSnapshot,
}

impl From<AmountError> for ValidationError {
    fn from(err: AmountError) -> Self {
        ValidationError::InvalidAmount(err)
    }
}

/// Failures after a transaction left the client.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TxError {
    #[error("transaction reverted")]
    Reverted(Option<String>),
    #[error("signature declined by user")]
    Declined,
    #[error("operation not supported: {0}")]
    Unsupported(String),
    #[error("confirmation dropped")]
    Dropped,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl TxError {
    /// Reason worth showing verbatim, if the collaborator gave one.
    pub fn reason(&self) -> Option<String> {
        match self {
            TxError::Reverted(reason) => reason.clone(),
            TxError::Declined => Some("user rejected transaction".to_string()),
            TxError::Unsupported(what) => Some(what.clone()),
            TxError::Dropped | TxError::Provider(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DappError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transaction(#[from] TxError),
    #[error("read failed: {0}")]
    Read(#[from] ProviderError),
}

pub type DappResult<T> = Result<T, DappError>;
