use crate::error::Result;
use crate::lifecycle::{ApprovalStatus, ReportStatus};
use crate::storage::{CatalogStore, JobStore, RedemptionStore, ReportStore};
use crate::types::{Redemption, Report};
use ecomap_economics::AccountLedger;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_users: usize,
    pub total_reports: usize,
    pub cleaned_reports: usize,
    /// Sum of report and cleanup reward lines.
    pub points_distributed: u64,
    pub total_redemptions: usize,
    pub total_jobs: usize,
    pub pending_jobs: usize,
    pub partner_products: usize,
    pub recent_reports: Vec<Report>,
    pub recent_redemptions: Vec<Redemption>,
}

/// Read-only aggregation over every store.
#[derive(Clone)]
pub struct Dashboard {
    ledger: Arc<AccountLedger>,
    catalog: Arc<dyn CatalogStore>,
    redemptions: Arc<dyn RedemptionStore>,
    jobs: Arc<dyn JobStore>,
    reports: Arc<dyn ReportStore>,
}

impl Dashboard {
    pub fn new(
        ledger: Arc<AccountLedger>,
        catalog: Arc<dyn CatalogStore>,
        redemptions: Arc<dyn RedemptionStore>,
        jobs: Arc<dyn JobStore>,
        reports: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            ledger,
            catalog,
            redemptions,
            jobs,
            reports,
        }
    }

    pub async fn stats(&self) -> Result<DashboardStats> {
        let accounts = self.ledger.list_accounts().await?;
        let points_distributed = self
            .ledger
            .all_transactions()
            .await?
            .iter()
            .filter(|line| line.kind.is_reward() && line.delta > 0)
            .map(|line| line.delta.unsigned_abs())
            .sum();

        let mut reports = self.reports.all_reports().await?;
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let cleaned_reports = reports
            .iter()
            .filter(|report| report.status == ReportStatus::Cleaned)
            .count();

        let mut redemptions = self.redemptions.all_redemptions().await?;
        redemptions.sort_by(|a, b| b.redeemed_at.cmp(&a.redeemed_at));

        let jobs = self.jobs.all_jobs().await?;
        let pending_jobs = jobs
            .iter()
            .filter(|job| job.approval_status == ApprovalStatus::Pending)
            .count();

        let stats = DashboardStats {
            total_users: accounts.len(),
            total_reports: reports.len(),
            cleaned_reports,
            points_distributed,
            total_redemptions: redemptions.len(),
            total_jobs: jobs.len(),
            pending_jobs,
            partner_products: self.catalog.partner_products().await?.len(),
            recent_reports: reports.into_iter().take(RECENT_LIMIT).collect(),
            recent_redemptions: redemptions.into_iter().take(RECENT_LIMIT).collect(),
        };
        debug!(
            users = stats.total_users,
            reports = stats.total_reports,
            points = stats.points_distributed,
            "📊 Dashboard stats collected"
        );
        Ok(stats)
    }
}
