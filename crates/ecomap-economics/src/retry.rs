//! Retry-with-backoff adapter for the external stores.
//!
//! Only [`StorageError::Transient`] failures are retried. Business-rule outcomes
//! (insufficient balance, missing account) come back as `Ok` values and pass
//! straight through.

use crate::storage::{AccountStore, ApplyOutcome, StorageResult, TransactionLog};
use crate::types::{Account, LedgerTransaction, UserId};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay.saturating_mul(2u32.saturating_pow(attempt.min(10)));
        backoff.min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut f: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "🔄 Retrying storage operation"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(
                            operation,
                            attempts = attempt + 1,
                            error = %e,
                            "❌ Storage retries exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Wraps any store and retries its transient failures.
#[derive(Clone)]
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<S: AccountStore> AccountStore for Retrying<S> {
    async fn get_account(&self, user_id: &UserId) -> StorageResult<Option<Account>> {
        self.policy
            .run("get_account", || self.inner.get_account(user_id))
            .await
    }

    async fn create_account(&self, account: Account) -> StorageResult<bool> {
        self.policy
            .run("create_account", || self.inner.create_account(account.clone()))
            .await
    }

    async fn apply(
        &self,
        user_id: &UserId,
        lines: &[LedgerTransaction],
    ) -> StorageResult<ApplyOutcome> {
        self.policy
            .run("apply", || self.inner.apply(user_id, lines))
            .await
    }

    async fn list_accounts(&self) -> StorageResult<Vec<Account>> {
        self.policy
            .run("list_accounts", || self.inner.list_accounts())
            .await
    }
}

#[async_trait]
impl<S: TransactionLog> TransactionLog for Retrying<S> {
    async fn history(&self, user_id: &UserId) -> StorageResult<Vec<LedgerTransaction>> {
        self.policy
            .run("history", || self.inner.history(user_id))
            .await
    }

    async fn all_transactions(&self) -> StorageResult<Vec<LedgerTransaction>> {
        self.policy
            .run("all_transactions", || self.inner.all_transactions())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);
        let result = policy
            .run("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(StorageError::Transient("timeout".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);
        let result: StorageResult<()> = policy
            .run("broken", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StorageError::Permanent("corrupt".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
