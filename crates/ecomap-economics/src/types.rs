use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Credits every new account starts with.
pub const STARTING_CREDITS: u64 = 15;
/// Eco points exchanged for one credit.
pub const POINTS_PER_CREDIT: u64 = 5;
/// Points credited per reported item of trash.
pub const REPORT_POINTS_PER_ITEM: u64 = 33;
/// Flat reward for a confirmed cleanup.
pub const CLEANUP_POINTS: u64 = 100;

const ID_BYTES: usize = 10;

/// Opaque 20-character lowercase hex identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn generate() -> Self {
        let bytes: [u8; ID_BYTES] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

pub type UserId = EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Currency {
    Points,
    Tokens,
    Credits,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Points, Currency::Tokens, Currency::Credits];
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Currency::Points => "points",
            Currency::Tokens => "tokens",
            Currency::Credits => "credits",
        };
        f.write_str(name)
    }
}

/// Why a ledger line was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    SignupGrant,
    Purchase,
    Escrow,
    PostingFee,
    Refund,
    Convert,
    Redemption,
    ReportReward,
    CleanupReward,
}

impl TransactionKind {
    /// Kinds that hand out freshly earned points.
    pub fn is_reward(&self) -> bool {
        matches!(self, Self::ReportReward | Self::CleanupReward)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SignupGrant => "signup-grant",
            Self::Purchase => "purchase",
            Self::Escrow => "escrow",
            Self::PostingFee => "posting-fee",
            Self::Refund => "refund",
            Self::Convert => "convert",
            Self::Redemption => "redemption",
            Self::ReportReward => "report-reward",
            Self::CleanupReward => "cleanup-reward",
        };
        f.write_str(name)
    }
}

/// Per-user balances. Never negative by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub points_balance: u64,
    pub tokens_balance: u64,
    pub credits_balance: u64,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// A zero-balance account; the starting credits are granted through the ledger.
    pub fn empty(user_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            points_balance: 0,
            tokens_balance: 0,
            credits_balance: 0,
            created_at,
        }
    }

    pub fn balance(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Points => self.points_balance,
            Currency::Tokens => self.tokens_balance,
            Currency::Credits => self.credits_balance,
        }
    }

    pub fn balance_mut(&mut self, currency: Currency) -> &mut u64 {
        match currency {
            Currency::Points => &mut self.points_balance,
            Currency::Tokens => &mut self.tokens_balance,
            Currency::Credits => &mut self.credits_balance,
        }
    }

    /// Balance after applying `delta`, or `None` if it would go negative or overflow.
    pub fn checked_apply(&self, currency: Currency, delta: i64) -> Option<u64> {
        let current = self.balance(currency);
        if delta >= 0 {
            current.checked_add(delta as u64)
        } else {
            current.checked_sub(delta.unsigned_abs())
        }
    }
}

/// One immutable ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: EntityId,
    /// Shared by every line written in the same logical operation.
    pub txn_id: EntityId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub currency: Currency,
    pub delta: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_php: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Balance movement requested by a ledger operation, before it is stamped into a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub currency: Currency,
    pub amount: u64,
    pub outgoing: bool,
    pub kind: TransactionKind,
}

impl Posting {
    pub fn credit(currency: Currency, amount: u64, kind: TransactionKind) -> Self {
        Self {
            currency,
            amount,
            outgoing: false,
            kind,
        }
    }

    pub fn debit(currency: Currency, amount: u64, kind: TransactionKind) -> Self {
        Self {
            currency,
            amount,
            outgoing: true,
            kind,
        }
    }

    /// Signed ledger delta, or `None` when the amount does not fit in an `i64`.
    pub fn delta(&self) -> Option<i64> {
        let magnitude = i64::try_from(self.amount).ok()?;
        Some(if self.outgoing { -magnitude } else { magnitude })
    }
}
