use crate::types::{Account, Currency, LedgerTransaction, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Worth retrying; nothing was written.
    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("storage failure: {0}")]
    Permanent(String),

    #[error("write conflict: {0}")]
    Conflict(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result of a conditional balance update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(Account),
    AccountMissing,
    /// Nothing was written; `currency` would have gone negative.
    Insufficient {
        currency: Currency,
        available: u64,
        required: u64,
    },
}

/// Keyed account records. Every balance change goes through [`AccountStore::apply`],
/// which checks and writes in one step so concurrent debits cannot both pass.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, user_id: &UserId) -> StorageResult<Option<Account>>;

    /// Inserts a new account. Returns `false` if one already exists.
    async fn create_account(&self, account: Account) -> StorageResult<bool>;

    /// Atomically applies every line's delta to the user's account and appends the
    /// lines to the transaction log. If any balance would go negative the whole batch
    /// is rejected and nothing changes.
    async fn apply(&self, user_id: &UserId, lines: &[LedgerTransaction])
        -> StorageResult<ApplyOutcome>;

    async fn list_accounts(&self) -> StorageResult<Vec<Account>>;
}

/// Append-only view of every ledger line.
#[async_trait]
pub trait TransactionLog: Send + Sync {
    async fn history(&self, user_id: &UserId) -> StorageResult<Vec<LedgerTransaction>>;

    async fn all_transactions(&self) -> StorageResult<Vec<LedgerTransaction>>;
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<UserId, Account>,
    log: Vec<LedgerTransaction>,
}

/// In-process store. Accounts and the log share one lock so a balance and the lines
/// explaining it are always observed together.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<LedgerState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStorage {
    async fn get_account(&self, user_id: &UserId) -> StorageResult<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(user_id).cloned())
    }

    async fn create_account(&self, account: Account) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        if state.accounts.contains_key(&account.user_id) {
            return Ok(false);
        }
        debug!(user = %account.user_id, storage_type = "memory", "Account stored");
        state.accounts.insert(account.user_id.clone(), account);
        Ok(true)
    }

    async fn apply(
        &self,
        user_id: &UserId,
        lines: &[LedgerTransaction],
    ) -> StorageResult<ApplyOutcome> {
        let mut state = self.state.write().await;

        let Some(current) = state.accounts.get(user_id) else {
            return Ok(ApplyOutcome::AccountMissing);
        };

        // Validate the whole batch against a scratch copy before touching anything.
        let mut next = current.clone();
        for line in lines {
            match next.checked_apply(line.currency, line.delta) {
                Some(balance) => *next.balance_mut(line.currency) = balance,
                None => {
                    return Ok(ApplyOutcome::Insufficient {
                        currency: line.currency,
                        available: next.balance(line.currency),
                        required: line.delta.unsigned_abs(),
                    })
                }
            }
        }

        state.accounts.insert(user_id.clone(), next.clone());
        state.log.extend_from_slice(lines);

        info!(
            user = %user_id,
            lines = lines.len(),
            log_size = state.log.len(),
            storage_type = "memory",
            "💾 Ledger batch stored"
        );
        Ok(ApplyOutcome::Applied(next))
    }

    async fn list_accounts(&self) -> StorageResult<Vec<Account>> {
        let state = self.state.read().await;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(accounts)
    }
}

#[async_trait]
impl TransactionLog for MemoryStorage {
    async fn history(&self, user_id: &UserId) -> StorageResult<Vec<LedgerTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .log
            .iter()
            .filter(|tx| &tx.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn all_transactions(&self) -> StorageResult<Vec<LedgerTransaction>> {
        let state = self.state.read().await;
        Ok(state.log.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityId, TransactionKind};
    use chrono::Utc;

    fn line(user: &UserId, currency: Currency, delta: i64) -> LedgerTransaction {
        LedgerTransaction {
            id: EntityId::generate(),
            txn_id: EntityId::generate(),
            user_id: user.clone(),
            kind: TransactionKind::Purchase,
            currency,
            delta,
            cash_php: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_apply_is_all_or_nothing() {
        let storage = MemoryStorage::new();
        let user = EntityId::from("user-a");
        assert!(storage
            .create_account(Account::empty(user.clone(), Utc::now()))
            .await
            .unwrap());

        let outcome = storage
            .apply(&user, &[line(&user, Currency::Tokens, 5)])
            .await
            .unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied(ref a) if a.tokens_balance == 5));

        // Second line fails, so the first must not land either.
        let outcome = storage
            .apply(
                &user,
                &[
                    line(&user, Currency::Tokens, -3),
                    line(&user, Currency::Credits, -1),
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::Insufficient {
                currency: Currency::Credits,
                available: 0,
                required: 1,
            }
        );

        let account = storage.get_account(&user).await.unwrap().unwrap();
        assert_eq!(account.tokens_balance, 5);
        assert_eq!(storage.history(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_account_and_duplicate_create() {
        let storage = MemoryStorage::new();
        let user = EntityId::from("ghost");
        let outcome = storage
            .apply(&user, &[line(&user, Currency::Points, 1)])
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::AccountMissing);

        let account = Account::empty(user.clone(), Utc::now());
        assert!(storage.create_account(account.clone()).await.unwrap());
        assert!(!storage.create_account(account).await.unwrap());
    }
}
