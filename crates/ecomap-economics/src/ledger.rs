use crate::error::{LedgerError, Result};
use crate::storage::{AccountStore, ApplyOutcome, TransactionLog};
use crate::types::{
    Account, Currency, EntityId, LedgerTransaction, Posting, TransactionKind, UserId,
    CLEANUP_POINTS, POINTS_PER_CREDIT, REPORT_POINTS_PER_ITEM, STARTING_CREDITS,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a committed ledger operation wrote.
#[derive(Debug, Clone)]
pub struct LedgerReceipt {
    pub txn_id: EntityId,
    pub account: Account,
    pub lines: Vec<LedgerTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    pub txn_id: EntityId,
    pub points_spent: u64,
    pub credits_gained: u64,
    pub new_points_balance: u64,
    pub new_credits_balance: u64,
}

/// Account balances next to the sums of their ledger lines.
#[derive(Debug, Clone)]
pub struct AuditReport {
    pub account: Account,
    pub ledger_sums: HashMap<Currency, i64>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        Currency::ALL.iter().all(|currency| {
            let sum = self.ledger_sums.get(currency).copied().unwrap_or(0);
            sum >= 0 && sum as u64 == self.account.balance(*currency)
        })
    }
}

/// The only writer of account balances.
pub struct AccountLedger {
    accounts: Arc<dyn AccountStore>,
    log: Arc<dyn TransactionLog>,
}

impl AccountLedger {
    pub fn new(accounts: Arc<dyn AccountStore>, log: Arc<dyn TransactionLog>) -> Self {
        Self { accounts, log }
    }

    /// Creates the account and grants the starting credits through the log.
    pub async fn open_account(&self, user_id: &UserId) -> Result<Account> {
        let created = self
            .accounts
            .create_account(Account::empty(user_id.clone(), Utc::now()))
            .await?;
        if !created {
            return Err(LedgerError::AccountExists(user_id.clone()));
        }

        let receipt = self
            .commit(
                user_id,
                &[Posting::credit(
                    Currency::Credits,
                    STARTING_CREDITS,
                    TransactionKind::SignupGrant,
                )],
                None,
            )
            .await?;

        info!(
            user = %user_id,
            credits = receipt.account.credits_balance,
            "✨ Account opened"
        );
        Ok(receipt.account)
    }

    pub async fn get_account(&self, user_id: &UserId) -> Result<Account> {
        self.accounts
            .get_account(user_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.clone()))
    }

    pub async fn balance(&self, user_id: &UserId, currency: Currency) -> Result<u64> {
        Ok(self.get_account(user_id).await?.balance(currency))
    }

    pub async fn credit(
        &self,
        user_id: &UserId,
        currency: Currency,
        amount: u64,
        kind: TransactionKind,
    ) -> Result<Account> {
        validate_amount(amount)?;
        let receipt = self
            .commit(user_id, &[Posting::credit(currency, amount, kind)], None)
            .await?;

        info!(
            user = %user_id,
            currency = %currency,
            amount,
            kind = %kind,
            balance_after = receipt.account.balance(currency),
            "💰 Balance credited"
        );
        Ok(receipt.account)
    }

    pub async fn debit(
        &self,
        user_id: &UserId,
        currency: Currency,
        amount: u64,
        kind: TransactionKind,
    ) -> Result<Account> {
        validate_amount(amount)?;
        let receipt = self
            .commit(user_id, &[Posting::debit(currency, amount, kind)], None)
            .await?;

        info!(
            user = %user_id,
            currency = %currency,
            amount,
            kind = %kind,
            balance_after = receipt.account.balance(currency),
            "💸 Balance debited"
        );
        Ok(receipt.account)
    }

    /// Applies several postings to one account as a single logical transaction:
    /// either every line lands or none does.
    pub async fn commit(
        &self,
        user_id: &UserId,
        postings: &[Posting],
        cash_php: Option<Decimal>,
    ) -> Result<LedgerReceipt> {
        if postings.is_empty() {
            return Err(LedgerError::Validation("empty ledger batch".to_string()));
        }
        let txn_id = EntityId::generate();
        let now = Utc::now();
        let mut lines = Vec::with_capacity(postings.len());
        for posting in postings {
            validate_amount(posting.amount)?;
            let delta = posting.delta().ok_or_else(|| {
                LedgerError::Validation(format!("amount {} too large", posting.amount))
            })?;
            lines.push(LedgerTransaction {
                id: EntityId::generate(),
                txn_id: txn_id.clone(),
                user_id: user_id.clone(),
                kind: posting.kind,
                currency: posting.currency,
                delta,
                cash_php,
                created_at: now,
            });
        }

        match self.accounts.apply(user_id, &lines).await? {
            ApplyOutcome::Applied(account) => {
                debug!(
                    user = %user_id,
                    txn_id = %txn_id,
                    lines = lines.len(),
                    "📝 Ledger transaction committed"
                );
                Ok(LedgerReceipt {
                    txn_id,
                    account,
                    lines,
                })
            }
            ApplyOutcome::AccountMissing => Err(LedgerError::AccountNotFound(user_id.clone())),
            ApplyOutcome::Insufficient {
                currency,
                available,
                required,
            } => {
                warn!(
                    user = %user_id,
                    currency = %currency,
                    available,
                    required,
                    "Debit rejected"
                );
                Err(LedgerError::insufficient(currency, available, required))
            }
        }
    }

    /// Exchanges points for credits at the fixed rate. Points must be a positive
    /// multiple of [`POINTS_PER_CREDIT`].
    pub async fn convert_points_to_credits(
        &self,
        user_id: &UserId,
        points_to_convert: u64,
    ) -> Result<Conversion> {
        if points_to_convert < POINTS_PER_CREDIT || points_to_convert % POINTS_PER_CREDIT != 0 {
            return Err(LedgerError::Validation(format!(
                "points to convert must be a positive multiple of {POINTS_PER_CREDIT}, got {points_to_convert}"
            )));
        }
        validate_amount(points_to_convert)?;
        let credits_gained = points_to_convert / POINTS_PER_CREDIT;

        let receipt = self
            .commit(
                user_id,
                &[
                    Posting::debit(Currency::Points, points_to_convert, TransactionKind::Convert),
                    Posting::credit(Currency::Credits, credits_gained, TransactionKind::Convert),
                ],
                None,
            )
            .await?;

        info!(
            user = %user_id,
            points_spent = points_to_convert,
            credits_gained,
            txn_id = %receipt.txn_id,
            "🔄 Points converted to credits"
        );

        Ok(Conversion {
            txn_id: receipt.txn_id,
            points_spent: points_to_convert,
            credits_gained,
            new_points_balance: receipt.account.points_balance,
            new_credits_balance: receipt.account.credits_balance,
        })
    }

    /// Credits purchased tokens, keeping the PHP cash amount on the ledger line.
    pub async fn purchase_tokens(
        &self,
        user_id: &UserId,
        amount: u64,
        php_amount: Decimal,
    ) -> Result<LedgerReceipt> {
        validate_amount(amount)?;
        if php_amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "cash amount must be positive, got {php_amount}"
            )));
        }

        let receipt = self
            .commit(
                user_id,
                &[Posting::credit(
                    Currency::Tokens,
                    amount,
                    TransactionKind::Purchase,
                )],
                Some(php_amount),
            )
            .await?;

        info!(
            user = %user_id,
            tokens = amount,
            php = %php_amount,
            balance_after = receipt.account.tokens_balance,
            "💎 Tokens purchased"
        );
        Ok(receipt)
    }

    /// Points for a submitted report: 33 per item, at least one item.
    pub fn report_reward_points(trash_count: Option<u32>) -> u64 {
        REPORT_POINTS_PER_ITEM * u64::from(trash_count.unwrap_or(1).max(1))
    }

    pub async fn reward_report(&self, user_id: &UserId, trash_count: Option<u32>) -> Result<u64> {
        let points = Self::report_reward_points(trash_count);
        self.credit(user_id, Currency::Points, points, TransactionKind::ReportReward)
            .await?;
        Ok(points)
    }

    pub async fn reward_cleanup(&self, user_id: &UserId) -> Result<u64> {
        self.credit(
            user_id,
            Currency::Points,
            CLEANUP_POINTS,
            TransactionKind::CleanupReward,
        )
        .await?;
        Ok(CLEANUP_POINTS)
    }

    /// Ledger lines for a user, newest first, optionally for one currency.
    pub async fn history(
        &self,
        user_id: &UserId,
        currency: Option<Currency>,
    ) -> Result<Vec<LedgerTransaction>> {
        let mut lines: Vec<LedgerTransaction> = self
            .log
            .history(user_id)
            .await?
            .into_iter()
            .filter(|line| currency.map_or(true, |c| line.currency == c))
            .collect();
        lines.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(lines)
    }

    pub async fn all_transactions(&self) -> Result<Vec<LedgerTransaction>> {
        Ok(self.log.all_transactions().await?)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.list_accounts().await?)
    }

    pub async fn audit(&self, user_id: &UserId) -> Result<AuditReport> {
        let account = self.get_account(user_id).await?;
        let mut ledger_sums = HashMap::new();
        for line in self.log.history(user_id).await? {
            *ledger_sums.entry(line.currency).or_insert(0i64) += line.delta;
        }
        Ok(AuditReport {
            account,
            ledger_sums,
        })
    }
}

fn validate_amount(amount: u64) -> Result<()> {
    if amount == 0 {
        return Err(LedgerError::Validation("amount must be positive".to_string()));
    }
    if amount > i64::MAX as u64 {
        return Err(LedgerError::Validation(format!("amount {amount} too large")));
    }
    Ok(())
}
