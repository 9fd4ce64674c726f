//! Job posting escrow: funds are held when a job is posted and either settled in
//! place on approval or returned to the poster on rejection.

use crate::error::{AppError, Result};
use crate::lifecycle::{ApprovalStatus, JobStatus, LifecycleState};
use crate::storage::{JobStore, Transition};
use crate::types::{JobPosting, JobRequest, Review};
use chrono::Utc;
use ecomap_economics::{
    AccountLedger, Currency, EntityId, LedgerError, Posting, TransactionKind, UserId,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const DEFAULT_CREDITS_PER_POST: u64 = 10;

#[derive(Clone)]
pub struct JobEscrowWorkflow {
    ledger: Arc<AccountLedger>,
    jobs: Arc<dyn JobStore>,
    credits_per_post: u64,
}

impl JobEscrowWorkflow {
    pub fn new(ledger: Arc<AccountLedger>, jobs: Arc<dyn JobStore>, credits_per_post: u64) -> Self {
        Self {
            ledger,
            jobs,
            credits_per_post,
        }
    }

    /// Holds the posting fee and token reward, then records the job as pending.
    pub async fn create_job(&self, request: JobRequest) -> Result<JobPosting> {
        if request.title.trim().is_empty() {
            return Err(LedgerError::Validation("job title must not be empty".to_string()).into());
        }
        if let Some(geo) = &request.geo {
            if !geo.is_valid() {
                return Err(LedgerError::Validation(format!(
                    "invalid job coordinates ({}, {})",
                    geo.lat, geo.lng
                ))
                .into());
            }
        }

        let credits_cost = request.credits_cost.unwrap_or(self.credits_per_post);
        let token_reward = request.token_reward;

        // Name the deficient currency before attempting the batch.
        let account = self.ledger.get_account(&request.posted_by).await?;
        for (currency, required) in [
            (Currency::Credits, credits_cost),
            (Currency::Tokens, token_reward),
        ] {
            let available = account.balance(currency);
            if available < required {
                warn!(
                    poster = %request.posted_by,
                    currency = %currency,
                    available,
                    required,
                    "Job posting rejected: insufficient balance"
                );
                return Err(LedgerError::insufficient(currency, available, required).into());
            }
        }

        let workflow = self.clone();
        tokio::spawn(async move { workflow.hold_and_insert(request, credits_cost).await }).await?
    }

    async fn hold_and_insert(&self, request: JobRequest, credits_cost: u64) -> Result<JobPosting> {
        let start = std::time::Instant::now();
        let poster = request.posted_by.clone();
        let token_reward = request.token_reward;

        let mut postings = Vec::with_capacity(2);
        if credits_cost > 0 {
            postings.push(Posting::debit(
                Currency::Credits,
                credits_cost,
                TransactionKind::PostingFee,
            ));
        }
        if token_reward > 0 {
            postings.push(Posting::debit(
                Currency::Tokens,
                token_reward,
                TransactionKind::Escrow,
            ));
        }
        let held = if postings.is_empty() {
            None
        } else {
            Some(self.ledger.commit(&poster, &postings, None).await?)
        };

        let job = JobPosting {
            id: EntityId::generate(),
            posted_by: poster.clone(),
            title: request.title,
            description: request.description,
            job_type: request.job_type,
            location: request.location,
            geo: request.geo,
            credits_cost,
            token_reward,
            approval_status: ApprovalStatus::Pending,
            status: JobStatus::Open,
            review: None,
            created_at: Utc::now(),
        };

        if let Err(e) = self.jobs.insert_job(job.clone()).await {
            if held.is_some() {
                self.return_funds(&poster, credits_cost, token_reward).await;
            }
            return Err(e.into());
        }

        info!(
            job_id = %job.id,
            poster = %poster,
            credits_cost,
            token_reward,
            txn_id = ?held.as_ref().map(|receipt| receipt.txn_id.to_string()),
            duration_ms = start.elapsed().as_millis() as u64,
            "🔒 Escrow held for job posting"
        );
        Ok(job)
    }

    /// Settles the held funds in place. No balance moves.
    pub async fn approve_job(
        &self,
        job_id: &EntityId,
        reviewer_id: &UserId,
        note: Option<String>,
    ) -> Result<JobPosting> {
        let job = self
            .review(job_id, reviewer_id, note, ApprovalStatus::Approved)
            .await?;
        info!(
            job_id = %job.id,
            reviewer = %reviewer_id,
            credits_cost = job.credits_cost,
            token_reward = job.token_reward,
            "✅ Job approved, escrow settled"
        );
        Ok(job)
    }

    /// Rejects the job and returns exactly the amounts stored on it.
    ///
    /// The status flip happens first so a concurrent second rejection sees
    /// `AlreadyProcessed`; a failed refund flips it back.
    pub async fn reject_job(
        &self,
        job_id: &EntityId,
        reviewer_id: &UserId,
        note: Option<String>,
    ) -> Result<JobPosting> {
        let workflow = self.clone();
        let job_id = job_id.clone();
        let reviewer_id = reviewer_id.clone();
        tokio::spawn(async move { workflow.reject_and_refund(&job_id, &reviewer_id, note).await })
            .await?
    }

    async fn reject_and_refund(
        &self,
        job_id: &EntityId,
        reviewer_id: &UserId,
        note: Option<String>,
    ) -> Result<JobPosting> {
        let job = self
            .review(job_id, reviewer_id, note, ApprovalStatus::Rejected)
            .await?;
        if let Err(e) = self.refund(&job).await {
            self.reopen(&job).await;
            return Err(e);
        }
        info!(
            job_id = %job.id,
            reviewer = %reviewer_id,
            poster = %job.posted_by,
            credits_refunded = job.credits_cost,
            tokens_refunded = job.token_reward,
            "🔓 Job rejected, escrow refunded"
        );
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &EntityId) -> Result<JobPosting> {
        self.jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::not_found("job", job_id))
    }

    /// Jobs awaiting review, oldest first.
    pub async fn pending_jobs(&self) -> Result<Vec<JobPosting>> {
        let mut jobs: Vec<JobPosting> = self
            .jobs
            .all_jobs()
            .await?
            .into_iter()
            .filter(|job| job.approval_status == ApprovalStatus::Pending)
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    pub async fn all_jobs(&self) -> Result<Vec<JobPosting>> {
        Ok(self.jobs.all_jobs().await?)
    }

    async fn review(
        &self,
        job_id: &EntityId,
        reviewer_id: &UserId,
        note: Option<String>,
        to: ApprovalStatus,
    ) -> Result<JobPosting> {
        let current = self.get_job(job_id).await?;
        if !current.approval_status.can_transition_to(&to) {
            return Err(already_processed(&current));
        }

        let review = Review {
            reviewer_id: reviewer_id.clone(),
            reviewed_at: Utc::now(),
            note,
        };
        match self
            .jobs
            .transition_job(job_id, ApprovalStatus::Pending, to, Some(review))
            .await?
        {
            Transition::Applied(job) => Ok(job),
            Transition::Missing => Err(AppError::not_found("job", job_id)),
            Transition::Stale(job) => Err(already_processed(&job)),
        }
    }

    async fn refund(&self, job: &JobPosting) -> Result<()> {
        let mut postings = Vec::with_capacity(2);
        if job.credits_cost > 0 {
            postings.push(Posting::credit(
                Currency::Credits,
                job.credits_cost,
                TransactionKind::Refund,
            ));
        }
        if job.token_reward > 0 {
            postings.push(Posting::credit(
                Currency::Tokens,
                job.token_reward,
                TransactionKind::Refund,
            ));
        }
        if !postings.is_empty() {
            self.ledger.commit(&job.posted_by, &postings, None).await?;
        }
        Ok(())
    }

    async fn reopen(&self, job: &JobPosting) {
        if let Err(e) = self
            .jobs
            .transition_job(&job.id, ApprovalStatus::Rejected, ApprovalStatus::Pending, None)
            .await
        {
            error!(job_id = %job.id, error = %e, "❌ Failed to reopen job after refund failure");
        }
    }

    async fn return_funds(&self, poster: &UserId, credits: u64, tokens: u64) {
        let mut postings = Vec::with_capacity(2);
        if credits > 0 {
            postings.push(Posting::credit(Currency::Credits, credits, TransactionKind::Refund));
        }
        if tokens > 0 {
            postings.push(Posting::credit(Currency::Tokens, tokens, TransactionKind::Refund));
        }
        if let Err(e) = self.ledger.commit(poster, &postings, None).await {
            error!(poster = %poster, credits, tokens, error = %e, "❌ Failed to return held funds");
        }
    }
}

fn already_processed(job: &JobPosting) -> AppError {
    AppError::AlreadyProcessed {
        entity: "job",
        id: job.id.clone(),
        status: job.approval_status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryAppStorage;
    use ecomap_economics::MemoryStorage;
    use rust_decimal::Decimal;

    async fn setup() -> (JobEscrowWorkflow, Arc<AccountLedger>, UserId) {
        let accounts = Arc::new(MemoryStorage::new());
        let ledger = Arc::new(AccountLedger::new(accounts.clone(), accounts));
        let workflow = JobEscrowWorkflow::new(
            ledger.clone(),
            Arc::new(MemoryAppStorage::new()),
            DEFAULT_CREDITS_PER_POST,
        );
        let poster = EntityId::from("barangay-7");
        ledger.open_account(&poster).await.unwrap();
        ledger
            .purchase_tokens(&poster, 20, Decimal::new(2000, 2))
            .await
            .unwrap();
        (workflow, ledger, poster)
    }

    #[tokio::test]
    async fn test_create_job_holds_both_currencies() {
        let (workflow, ledger, poster) = setup().await;
        let job = workflow
            .create_job(JobRequest::new(poster.clone(), "Clear the creek", 5))
            .await
            .unwrap();

        assert_eq!(job.approval_status, ApprovalStatus::Pending);
        assert_eq!(job.credits_cost, DEFAULT_CREDITS_PER_POST);
        let account = ledger.get_account(&poster).await.unwrap();
        assert_eq!(account.credits_balance, 5);
        assert_eq!(account.tokens_balance, 15);

        let escrow_lines: Vec<_> = ledger
            .history(&poster, Some(Currency::Tokens))
            .await
            .unwrap()
            .into_iter()
            .filter(|line| line.kind == TransactionKind::Escrow)
            .collect();
        assert_eq!(escrow_lines.len(), 1);
        assert_eq!(escrow_lines[0].delta, -5);
        assert!(ledger.audit(&poster).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_create_job_names_deficient_currency() {
        let (workflow, ledger, poster) = setup().await;
        let err = workflow
            .create_job(JobRequest::new(poster.clone(), "Haul debris", 50))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppError::Ledger(LedgerError::insufficient(Currency::Tokens, 20, 50))
        );

        let err = workflow
            .create_job(JobRequest::new(poster.clone(), "Haul debris", 1).with_credits_cost(16))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppError::Ledger(LedgerError::insufficient(Currency::Credits, 15, 16))
        );

        // Nothing was held.
        let account = ledger.get_account(&poster).await.unwrap();
        assert_eq!((account.credits_balance, account.tokens_balance), (15, 20));
        assert!(workflow.pending_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_approve_moves_nothing_and_is_terminal() {
        let (workflow, ledger, poster) = setup().await;
        let job = workflow
            .create_job(JobRequest::new(poster.clone(), "Sort recyclables", 5))
            .await
            .unwrap();
        let admin = EntityId::from("admin");

        let approved = workflow
            .approve_job(&job.id, &admin, Some("looks good".to_string()))
            .await
            .unwrap();
        assert_eq!(approved.approval_status, ApprovalStatus::Approved);
        let review = approved.review.unwrap();
        assert_eq!(review.reviewer_id, admin);
        assert_eq!(review.note.as_deref(), Some("looks good"));

        let account = ledger.get_account(&poster).await.unwrap();
        assert_eq!((account.credits_balance, account.tokens_balance), (5, 15));

        let err = workflow.reject_job(&job.id, &admin, None).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyProcessed { entity: "job", .. }));
        let account = ledger.get_account(&poster).await.unwrap();
        assert_eq!((account.credits_balance, account.tokens_balance), (5, 15));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (workflow, _, _) = setup().await;
        let err = workflow
            .approve_job(&EntityId::from("nope"), &EntityId::from("admin"), None)
            .await
            .unwrap_err();
        assert_eq!(err, AppError::not_found("job", &EntityId::from("nope")));
    }

    #[tokio::test]
    async fn test_free_posting_holds_nothing() {
        let (workflow, ledger, poster) = setup().await;
        let before = ledger.history(&poster, None).await.unwrap().len();
        let job = workflow
            .create_job(JobRequest::new(poster.clone(), "Volunteer sweep", 0).with_credits_cost(0))
            .await
            .unwrap();
        workflow
            .reject_job(&job.id, &EntityId::from("admin"), None)
            .await
            .unwrap();
        assert_eq!(ledger.history(&poster, None).await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn test_pending_jobs_oldest_first() {
        let (workflow, _, poster) = setup().await;
        let first = workflow
            .create_job(JobRequest::new(poster.clone(), "First", 1))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = workflow
            .create_job(JobRequest::new(poster.clone(), "Second", 1).with_credits_cost(1))
            .await
            .unwrap();

        let pending = workflow.pending_jobs().await.unwrap();
        assert_eq!(
            pending.iter().map(|j| j.id.clone()).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );
    }
}
