//! Multi-currency account ledger for the EcoMap incentive economy.
//!
//! Every balance change is a batch of [`LedgerTransaction`] lines applied through
//! [`AccountStore::apply`], which checks non-negativity and writes in one step.

pub mod error;
pub mod ledger;
pub mod retry;
pub mod storage;
pub mod types;

pub use error::{LedgerError, Result};
pub use ledger::{AccountLedger, AuditReport, Conversion, LedgerReceipt};
pub use retry::{RetryPolicy, Retrying};
pub use storage::{
    AccountStore, ApplyOutcome, MemoryStorage, StorageError, StorageResult, TransactionLog,
};
pub use types::{
    Account, Currency, EntityId, LedgerTransaction, Posting, TransactionKind, UserId,
    CLEANUP_POINTS, POINTS_PER_CREDIT, REPORT_POINTS_PER_ITEM, STARTING_CREDITS,
};
