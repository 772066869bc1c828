use thiserror::Error;

use crate::account::AccountId;

/// Coarse classification callers can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Inactive,
    InsufficientFunds,
    InvalidArgument,
    SessionConflict,
    PermissionDenied,
    Concurrency,
    StorageFailure,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("Account not found: '{0}'")]
    AccountNameNotFound(String),
    #[error("Account name already taken: '{0}'")]
    AccountNameTaken(String),
    #[error("Invalid account name: '{0}'")]
    InvalidAccountName(String),
    #[error("Account {0} is deactivated")]
    AccountInactive(AccountId),
    #[error("Insufficient balance: needed {needed}s, available {available}s")]
    InsufficientBalance { needed: u64, available: u64 },
    #[error("Insufficient reserve: requested {requested}s, available {available}s")]
    InsufficientReserve { requested: u64, available: u64 },
    #[error("Amount must be greater than zero")]
    InvalidAmount,
    #[error("Cannot transfer to the same account")]
    SelfTransfer,
    #[error("No eligible recipients")]
    NoRecipients,
    #[error("Minimum stake is {minimum}s, requested {requested}s")]
    BelowMinimumStake { minimum: u64, requested: u64 },
    #[error("Account {0} already has an active stake session")]
    ActiveSessionExists(AccountId),
    #[error("Stake session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("Stake session {0} is already settled")]
    SessionAlreadySettled(uuid::Uuid),
    #[error("Account {0} is not an admin")]
    NotAdmin(AccountId),
    #[error("Balance overflow")]
    Overflow,
    #[error("Transaction aborted by contention: {0}")]
    Concurrency(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccountNotFound(_) | Self::AccountNameNotFound(_) | Self::SessionNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::AccountInactive(_) => ErrorKind::Inactive,
            Self::InsufficientBalance { .. } | Self::InsufficientReserve { .. } => {
                ErrorKind::InsufficientFunds
            }
            Self::AccountNameTaken(_)
            | Self::InvalidAccountName(_)
            | Self::InvalidAmount
            | Self::SelfTransfer
            | Self::NoRecipients
            | Self::BelowMinimumStake { .. }
            | Self::Overflow => ErrorKind::InvalidArgument,
            Self::ActiveSessionExists(_) | Self::SessionAlreadySettled(_) => {
                ErrorKind::SessionConflict
            }
            Self::NotAdmin(_) => ErrorKind::PermissionDenied,
            Self::Concurrency(_) => ErrorKind::Concurrency,
            Self::Storage(_) | Self::Serialization(_) => ErrorKind::StorageFailure,
        }
    }

    /// Only contention aborts are worth retrying verbatim.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Concurrency
    }
}

impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind as Rk;
        match err.kind() {
            Rk::Busy | Rk::TimedOut | Rk::TryAgain | Rk::Expired => {
                LedgerError::Concurrency(err.into_string())
            }
            _ => LedgerError::Storage(err.into_string()),
        }
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(err: bincode::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}
