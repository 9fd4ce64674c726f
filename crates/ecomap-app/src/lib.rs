//! EcoMap incentive core: reward redemption, job escrow and the report gate on
//! top of the account ledger.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod escrow;
pub mod geo;
pub mod lifecycle;
pub mod locks;
pub mod logging;
pub mod market;
pub mod report_gate;
pub mod storage;
pub mod types;

pub use config::EcoConfig;
pub use dashboard::{Dashboard, DashboardStats};
pub use error::{AppError, CooldownReason, Result};
pub use escrow::JobEscrowWorkflow;
pub use geo::GeoPoint;
pub use lifecycle::{ApprovalStatus, JobStatus, LifecycleState, RedemptionStatus, ReportStatus};
pub use market::RedemptionMarket;
pub use report_gate::{CleanupReceipt, GateParams, ReportGate, ReportQuery, ReportSubmission};
pub use storage::{
    CatalogStore, JobStore, MemoryAppStorage, RedemptionStore, ReportStore, StockOutcome,
    Transition,
};
pub use types::*;

use ecomap_economics::{
    Account, AccountLedger, AccountStore, Conversion, Currency, LedgerReceipt, LedgerTransaction,
    Retrying, TransactionLog, UserId,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Every component wired over one injected storage value.
pub struct EcoMapCore {
    ledger: Arc<AccountLedger>,
    market: RedemptionMarket,
    jobs: JobEscrowWorkflow,
    gate: ReportGate,
    dashboard: Dashboard,
}

impl EcoMapCore {
    /// Wraps `storage` in the configured retry policy and builds each component on it.
    pub fn new<S>(storage: S, config: &EcoConfig) -> Self
    where
        S: AccountStore
            + TransactionLog
            + CatalogStore
            + RedemptionStore
            + JobStore
            + ReportStore
            + 'static,
    {
        let storage = Arc::new(Retrying::new(storage, config.retry_policy()));
        let ledger = Arc::new(AccountLedger::new(storage.clone(), storage.clone()));

        let market = RedemptionMarket::new(ledger.clone(), storage.clone(), storage.clone());
        let jobs = JobEscrowWorkflow::new(
            ledger.clone(),
            storage.clone(),
            config.jobs.credits_per_post,
        );
        let gate = ReportGate::new(ledger.clone(), storage.clone(), config.gate_params());
        let dashboard = Dashboard::new(
            ledger.clone(),
            storage.clone(),
            storage.clone(),
            storage.clone(),
            storage,
        );

        info!(
            cooldown_hours = config.report_gate.cooldown_hours,
            radius_meters = config.report_gate.radius_meters,
            retry_attempts = config.retry.max_attempts,
            "✨ EcoMap core initialized"
        );

        Self {
            ledger,
            market,
            jobs,
            gate,
            dashboard,
        }
    }

    /// Core over a fresh in-process store; the returned handle seeds catalogs.
    pub fn in_memory(config: &EcoConfig) -> (Self, MemoryAppStorage) {
        let storage = MemoryAppStorage::new();
        (Self::new(storage.clone(), config), storage)
    }

    pub fn ledger(&self) -> &Arc<AccountLedger> {
        &self.ledger
    }

    pub fn market(&self) -> &RedemptionMarket {
        &self.market
    }

    pub fn jobs(&self) -> &JobEscrowWorkflow {
        &self.jobs
    }

    pub fn gate(&self) -> &ReportGate {
        &self.gate
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub async fn open_account(&self, user_id: &UserId) -> Result<Account> {
        Ok(self.ledger.open_account(user_id).await?)
    }

    pub async fn balances(&self, user_id: &UserId) -> Result<Account> {
        Ok(self.ledger.get_account(user_id).await?)
    }

    pub async fn history(
        &self,
        user_id: &UserId,
        currency: Option<Currency>,
    ) -> Result<Vec<LedgerTransaction>> {
        Ok(self.ledger.history(user_id, currency).await?)
    }

    pub async fn convert_points(&self, user_id: &UserId, points: u64) -> Result<Conversion> {
        Ok(self.ledger.convert_points_to_credits(user_id, points).await?)
    }

    pub async fn purchase_tokens(
        &self,
        user_id: &UserId,
        amount: u64,
        php_amount: Decimal,
    ) -> Result<LedgerReceipt> {
        Ok(self.ledger.purchase_tokens(user_id, amount, php_amount).await?)
    }
}
