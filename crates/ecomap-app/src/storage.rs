//! Repository interfaces for catalog, redemption, job and report records.
//!
//! Each mutation that guards an invariant (stock, approval status, report status)
//! is a conditional write: the store compares and updates in one step.

use crate::lifecycle::{ApprovalStatus, ReportStatus};
use crate::types::{
    CatalogSource, Cleanup, JobPosting, ProductItem, Redemption, Report, Review, RewardItem,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ecomap_economics::{
    Account, AccountStore, ApplyOutcome, EntityId, LedgerTransaction, MemoryStorage, Retrying,
    StorageError, StorageResult, TransactionLog, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockOutcome {
    Taken { remaining: u64 },
    OutOfStock,
    Missing,
}

/// Result of a compare-and-set on a status field.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<T> {
    Applied(T),
    Missing,
    /// The record was not in the expected state; carries what was found.
    Stale(T),
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn curated_items(&self) -> StorageResult<Vec<RewardItem>>;
    async fn partner_products(&self) -> StorageResult<Vec<ProductItem>>;
    async fn get_curated(&self, id: &EntityId) -> StorageResult<Option<RewardItem>>;
    async fn get_product(&self, id: &EntityId) -> StorageResult<Option<ProductItem>>;

    /// Decrements stock by exactly one if any is left.
    async fn take_one(&self, source: CatalogSource, id: &EntityId) -> StorageResult<StockOutcome>;

    /// Returns one unit taken by [`CatalogStore::take_one`].
    async fn put_back(&self, source: CatalogSource, id: &EntityId) -> StorageResult<()>;
}

#[async_trait]
pub trait RedemptionStore: Send + Sync {
    async fn insert_redemption(&self, redemption: Redemption) -> StorageResult<()>;
    async fn redemptions_for(&self, user_id: &UserId) -> StorageResult<Vec<Redemption>>;
    async fn all_redemptions(&self) -> StorageResult<Vec<Redemption>>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: JobPosting) -> StorageResult<()>;
    async fn get_job(&self, id: &EntityId) -> StorageResult<Option<JobPosting>>;
    async fn all_jobs(&self) -> StorageResult<Vec<JobPosting>>;

    /// Sets `approval_status` to `to` (and `review`) only if it is currently `from`.
    async fn transition_job(
        &self,
        id: &EntityId,
        from: ApprovalStatus,
        to: ApprovalStatus,
        review: Option<Review>,
    ) -> StorageResult<Transition<JobPosting>>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert_report(&self, report: Report) -> StorageResult<()>;
    async fn remove_report(&self, id: &EntityId) -> StorageResult<()>;
    async fn get_report(&self, id: &EntityId) -> StorageResult<Option<Report>>;
    async fn reports_since(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<Report>>;
    async fn all_reports(&self) -> StorageResult<Vec<Report>>;

    /// Sets `status` to `to` and replaces the cleanup record, only if the status
    /// is currently `from`.
    async fn transition_report(
        &self,
        id: &EntityId,
        from: ReportStatus,
        to: ReportStatus,
        cleanup: Option<Cleanup>,
    ) -> StorageResult<Transition<Report>>;
}

/// In-process implementation of every repository, ledger stores included.
#[derive(Clone, Default)]
pub struct MemoryAppStorage {
    ledger: MemoryStorage,
    rewards: Arc<RwLock<HashMap<EntityId, RewardItem>>>,
    products: Arc<RwLock<HashMap<EntityId, ProductItem>>>,
    redemptions: Arc<RwLock<Vec<Redemption>>>,
    jobs: Arc<RwLock<HashMap<EntityId, JobPosting>>>,
    reports: Arc<RwLock<HashMap<EntityId, Report>>>,
}

impl MemoryAppStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog-owner edit: add or replace a curated reward.
    pub async fn upsert_reward(&self, item: RewardItem) {
        self.rewards.write().await.insert(item.id.clone(), item);
    }

    /// Catalog-owner edit: add or replace a partner product.
    pub async fn upsert_product(&self, product: ProductItem) {
        self.products.write().await.insert(product.id.clone(), product);
    }
}

#[async_trait]
impl AccountStore for MemoryAppStorage {
    async fn get_account(&self, user_id: &UserId) -> StorageResult<Option<Account>> {
        self.ledger.get_account(user_id).await
    }

    async fn create_account(&self, account: Account) -> StorageResult<bool> {
        self.ledger.create_account(account).await
    }

    async fn apply(
        &self,
        user_id: &UserId,
        lines: &[LedgerTransaction],
    ) -> StorageResult<ApplyOutcome> {
        self.ledger.apply(user_id, lines).await
    }

    async fn list_accounts(&self) -> StorageResult<Vec<Account>> {
        self.ledger.list_accounts().await
    }
}

#[async_trait]
impl TransactionLog for MemoryAppStorage {
    async fn history(&self, user_id: &UserId) -> StorageResult<Vec<LedgerTransaction>> {
        self.ledger.history(user_id).await
    }

    async fn all_transactions(&self) -> StorageResult<Vec<LedgerTransaction>> {
        self.ledger.all_transactions().await
    }
}

#[async_trait]
impl CatalogStore for MemoryAppStorage {
    async fn curated_items(&self) -> StorageResult<Vec<RewardItem>> {
        let mut items: Vec<RewardItem> = self.rewards.read().await.values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn partner_products(&self) -> StorageResult<Vec<ProductItem>> {
        let mut products: Vec<ProductItem> =
            self.products.read().await.values().cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn get_curated(&self, id: &EntityId) -> StorageResult<Option<RewardItem>> {
        Ok(self.rewards.read().await.get(id).cloned())
    }

    async fn get_product(&self, id: &EntityId) -> StorageResult<Option<ProductItem>> {
        Ok(self.products.read().await.get(id).cloned())
    }

    async fn take_one(&self, source: CatalogSource, id: &EntityId) -> StorageResult<StockOutcome> {
        let outcome = match source {
            CatalogSource::Curated => {
                let mut rewards = self.rewards.write().await;
                take_from(rewards.get_mut(id).map(|item| &mut item.stock))
            }
            CatalogSource::Partner => {
                let mut products = self.products.write().await;
                take_from(products.get_mut(id).map(|product| &mut product.stock))
            }
        };
        debug!(item = %id, source = ?source, outcome = ?outcome, "Stock decrement attempted");
        Ok(outcome)
    }

    async fn put_back(&self, source: CatalogSource, id: &EntityId) -> StorageResult<()> {
        let stock = match source {
            CatalogSource::Curated => {
                let mut rewards = self.rewards.write().await;
                rewards.get_mut(id).map(|item| {
                    item.stock += 1;
                    item.stock
                })
            }
            CatalogSource::Partner => {
                let mut products = self.products.write().await;
                products.get_mut(id).map(|product| {
                    product.stock += 1;
                    product.stock
                })
            }
        };
        match stock {
            Some(_) => Ok(()),
            None => Err(StorageError::Permanent(format!("catalog item {id} vanished"))),
        }
    }
}

fn take_from(stock: Option<&mut u64>) -> StockOutcome {
    match stock {
        None => StockOutcome::Missing,
        Some(stock) if *stock == 0 => StockOutcome::OutOfStock,
        Some(stock) => {
            *stock -= 1;
            StockOutcome::Taken { remaining: *stock }
        }
    }
}

#[async_trait]
impl RedemptionStore for MemoryAppStorage {
    async fn insert_redemption(&self, redemption: Redemption) -> StorageResult<()> {
        self.redemptions.write().await.push(redemption);
        Ok(())
    }

    async fn redemptions_for(&self, user_id: &UserId) -> StorageResult<Vec<Redemption>> {
        Ok(self
            .redemptions
            .read()
            .await
            .iter()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn all_redemptions(&self) -> StorageResult<Vec<Redemption>> {
        Ok(self.redemptions.read().await.clone())
    }
}

#[async_trait]
impl JobStore for MemoryAppStorage {
    async fn insert_job(&self, job: JobPosting) -> StorageResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StorageError::Conflict(format!("job {} exists", job.id)));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get_job(&self, id: &EntityId) -> StorageResult<Option<JobPosting>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn all_jobs(&self) -> StorageResult<Vec<JobPosting>> {
        let mut jobs: Vec<JobPosting> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn transition_job(
        &self,
        id: &EntityId,
        from: ApprovalStatus,
        to: ApprovalStatus,
        review: Option<Review>,
    ) -> StorageResult<Transition<JobPosting>> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return Ok(Transition::Missing);
        };
        if job.approval_status != from {
            return Ok(Transition::Stale(job.clone()));
        }
        job.approval_status = to;
        job.review = review;
        Ok(Transition::Applied(job.clone()))
    }
}

#[async_trait]
impl ReportStore for MemoryAppStorage {
    async fn insert_report(&self, report: Report) -> StorageResult<()> {
        let mut reports = self.reports.write().await;
        if reports.contains_key(&report.id) {
            return Err(StorageError::Conflict(format!("report {} exists", report.id)));
        }
        reports.insert(report.id.clone(), report);
        Ok(())
    }

    async fn remove_report(&self, id: &EntityId) -> StorageResult<()> {
        self.reports.write().await.remove(id);
        Ok(())
    }

    async fn get_report(&self, id: &EntityId) -> StorageResult<Option<Report>> {
        Ok(self.reports.read().await.get(id).cloned())
    }

    async fn reports_since(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<Report>> {
        Ok(self
            .reports
            .read()
            .await
            .values()
            .filter(|r| r.created_at >= cutoff)
            .cloned()
            .collect())
    }

    async fn all_reports(&self) -> StorageResult<Vec<Report>> {
        let mut reports: Vec<Report> = self.reports.read().await.values().cloned().collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    async fn transition_report(
        &self,
        id: &EntityId,
        from: ReportStatus,
        to: ReportStatus,
        cleanup: Option<Cleanup>,
    ) -> StorageResult<Transition<Report>> {
        let mut reports = self.reports.write().await;
        let Some(report) = reports.get_mut(id) else {
            return Ok(Transition::Missing);
        };
        if report.status != from {
            return Ok(Transition::Stale(report.clone()));
        }
        report.status = to;
        report.cleanup = cleanup;
        Ok(Transition::Applied(report.clone()))
    }
}

// Retry delegation for the app repositories, mirroring the ledger stores.

#[async_trait]
impl<S: CatalogStore> CatalogStore for Retrying<S> {
    async fn curated_items(&self) -> StorageResult<Vec<RewardItem>> {
        self.policy()
            .run("curated_items", || self.inner().curated_items())
            .await
    }

    async fn partner_products(&self) -> StorageResult<Vec<ProductItem>> {
        self.policy()
            .run("partner_products", || self.inner().partner_products())
            .await
    }

    async fn get_curated(&self, id: &EntityId) -> StorageResult<Option<RewardItem>> {
        self.policy()
            .run("get_curated", || self.inner().get_curated(id))
            .await
    }

    async fn get_product(&self, id: &EntityId) -> StorageResult<Option<ProductItem>> {
        self.policy()
            .run("get_product", || self.inner().get_product(id))
            .await
    }

    async fn take_one(&self, source: CatalogSource, id: &EntityId) -> StorageResult<StockOutcome> {
        self.policy()
            .run("take_one", || self.inner().take_one(source, id))
            .await
    }

    async fn put_back(&self, source: CatalogSource, id: &EntityId) -> StorageResult<()> {
        self.policy()
            .run("put_back", || self.inner().put_back(source, id))
            .await
    }
}

#[async_trait]
impl<S: RedemptionStore> RedemptionStore for Retrying<S> {
    async fn insert_redemption(&self, redemption: Redemption) -> StorageResult<()> {
        self.policy()
            .run("insert_redemption", || {
                self.inner().insert_redemption(redemption.clone())
            })
            .await
    }

    async fn redemptions_for(&self, user_id: &UserId) -> StorageResult<Vec<Redemption>> {
        self.policy()
            .run("redemptions_for", || self.inner().redemptions_for(user_id))
            .await
    }

    async fn all_redemptions(&self) -> StorageResult<Vec<Redemption>> {
        self.policy()
            .run("all_redemptions", || self.inner().all_redemptions())
            .await
    }
}

#[async_trait]
impl<S: JobStore> JobStore for Retrying<S> {
    async fn insert_job(&self, job: JobPosting) -> StorageResult<()> {
        self.policy()
            .run("insert_job", || self.inner().insert_job(job.clone()))
            .await
    }

    async fn get_job(&self, id: &EntityId) -> StorageResult<Option<JobPosting>> {
        self.policy()
            .run("get_job", || self.inner().get_job(id))
            .await
    }

    async fn all_jobs(&self) -> StorageResult<Vec<JobPosting>> {
        self.policy()
            .run("all_jobs", || self.inner().all_jobs())
            .await
    }

    async fn transition_job(
        &self,
        id: &EntityId,
        from: ApprovalStatus,
        to: ApprovalStatus,
        review: Option<Review>,
    ) -> StorageResult<Transition<JobPosting>> {
        self.policy()
            .run("transition_job", || {
                self.inner().transition_job(id, from, to, review.clone())
            })
            .await
    }
}

#[async_trait]
impl<S: ReportStore> ReportStore for Retrying<S> {
    async fn insert_report(&self, report: Report) -> StorageResult<()> {
        self.policy()
            .run("insert_report", || self.inner().insert_report(report.clone()))
            .await
    }

    async fn remove_report(&self, id: &EntityId) -> StorageResult<()> {
        self.policy()
            .run("remove_report", || self.inner().remove_report(id))
            .await
    }

    async fn get_report(&self, id: &EntityId) -> StorageResult<Option<Report>> {
        self.policy()
            .run("get_report", || self.inner().get_report(id))
            .await
    }

    async fn reports_since(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<Report>> {
        self.policy()
            .run("reports_since", || self.inner().reports_since(cutoff))
            .await
    }

    async fn all_reports(&self) -> StorageResult<Vec<Report>> {
        self.policy()
            .run("all_reports", || self.inner().all_reports())
            .await
    }

    async fn transition_report(
        &self,
        id: &EntityId,
        from: ReportStatus,
        to: ReportStatus,
        cleanup: Option<Cleanup>,
    ) -> StorageResult<Transition<Report>> {
        self.policy()
            .run("transition_report", || {
                self.inner().transition_report(id, from, to, cleanup.clone())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_take_one_stops_at_zero() {
        let storage = MemoryAppStorage::new();
        let item = RewardItem::curated("Tumbler", 100, 2);
        let id = item.id.clone();
        storage.upsert_reward(item).await;

        assert_eq!(
            storage.take_one(CatalogSource::Curated, &id).await.unwrap(),
            StockOutcome::Taken { remaining: 1 }
        );
        assert_eq!(
            storage.take_one(CatalogSource::Curated, &id).await.unwrap(),
            StockOutcome::Taken { remaining: 0 }
        );
        assert_eq!(
            storage.take_one(CatalogSource::Curated, &id).await.unwrap(),
            StockOutcome::OutOfStock
        );
        // Wrong catalog
        assert_eq!(
            storage.take_one(CatalogSource::Partner, &id).await.unwrap(),
            StockOutcome::Missing
        );

        storage.put_back(CatalogSource::Curated, &id).await.unwrap();
        assert_eq!(storage.get_curated(&id).await.unwrap().unwrap().stock, 1);
    }
}
