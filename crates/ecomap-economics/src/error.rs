use crate::storage::StorageError;
use crate::types::{Currency, UserId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(UserId),

    #[error("Account already exists: {0}")]
    AccountExists(UserId),

    #[error(
        "Insufficient {currency}: needed {required}, available {available} (short by {shortfall})"
    )]
    InsufficientBalance {
        currency: Currency,
        available: u64,
        required: u64,
        shortfall: u64,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    pub fn insufficient(currency: Currency, available: u64, required: u64) -> Self {
        Self::InsufficientBalance {
            currency,
            available,
            required,
            shortfall: required.saturating_sub(available),
        }
    }
}

impl From<StorageError> for LedgerError {
    fn from(e: StorageError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
