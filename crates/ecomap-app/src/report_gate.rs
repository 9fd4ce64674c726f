//! Report submission gate and report status transitions.
//!
//! A report is refused while the same user reported within the cooldown window,
//! or while any report from the window lies within the geofence radius.

use crate::error::{AppError, CooldownReason, Result};
use crate::geo::GeoPoint;
use crate::lifecycle::{LifecycleState, ReportStatus};
use crate::storage::{ReportStore, Transition};
use crate::types::{Cleanup, Report, ReportRequest, Severity, WasteType};
use chrono::{DateTime, Duration, Utc};
use ecomap_economics::{AccountLedger, EntityId, LedgerError, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub const DEFAULT_COOLDOWN_HOURS: u32 = 4;
pub const DEFAULT_RADIUS_METERS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateParams {
    pub cooldown_hours: u32,
    pub radius_meters: f64,
}

impl Default for GateParams {
    fn default() -> Self {
        Self {
            cooldown_hours: DEFAULT_COOLDOWN_HOURS,
            radius_meters: DEFAULT_RADIUS_METERS,
        }
    }
}

impl GateParams {
    pub fn window(&self) -> Duration {
        Duration::hours(i64::from(self.cooldown_hours))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSubmission {
    pub report: Report,
    pub points_awarded: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanupReceipt {
    pub report: Report,
    pub points_awarded: u64,
}

/// Filters for [`ReportGate::find_reports`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportQuery {
    pub user_id: Option<UserId>,
    pub waste_type: Option<WasteType>,
    pub severity: Option<Severity>,
    pub status: Option<ReportStatus>,
    pub limit: Option<usize>,
}

impl ReportQuery {
    pub fn matches(&self, report: &Report) -> bool {
        self.user_id.as_ref().map_or(true, |id| &report.user_id == id)
            && self.waste_type.map_or(true, |w| report.waste_type == w)
            && self.severity.map_or(true, |s| report.severity == s)
            && self.status.map_or(true, |s| report.status == s)
    }
}

#[derive(Clone)]
pub struct ReportGate {
    ledger: Arc<AccountLedger>,
    reports: Arc<dyn ReportStore>,
    params: GateParams,
    // Held across the gate check and insert only.
    submit_lock: Arc<Mutex<()>>,
}

impl ReportGate {
    pub fn new(ledger: Arc<AccountLedger>, reports: Arc<dyn ReportStore>, params: GateParams) -> Self {
        Self {
            ledger,
            reports,
            params,
            submit_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn params(&self) -> &GateParams {
        &self.params
    }

    /// Checks both cooldown rules. Has no side effects.
    pub async fn check_cooldown(
        &self,
        user_id: &UserId,
        location: &GeoPoint,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !location.is_valid() {
            return Err(LedgerError::Validation(format!(
                "invalid coordinates ({}, {})",
                location.lat, location.lng
            ))
            .into());
        }

        let window = self.params.window();
        let recent = self.reports.reports_since(now - window).await?;

        if let Some(latest) = recent
            .iter()
            .filter(|report| &report.user_id == user_id)
            .map(|report| report.created_at)
            .max()
        {
            let remaining = (latest + window - now).num_seconds().max(0);
            let reason = CooldownReason::PerUser {
                cooldown_hours: self.params.cooldown_hours,
                minutes_remaining: (remaining + 59) / 60,
            };
            warn!(user = %user_id, %reason, "🚫 Report blocked by per-user cooldown");
            return Err(AppError::CooldownActive(reason));
        }

        let nearest = recent
            .iter()
            .map(|report| report.location.distance_meters(location))
            .filter(|distance| *distance <= self.params.radius_meters)
            .min_by(|a, b| a.total_cmp(b));
        if let Some(distance_meters) = nearest {
            let reason = CooldownReason::Area {
                radius_meters: self.params.radius_meters,
                cooldown_hours: self.params.cooldown_hours,
                distance_meters,
            };
            warn!(
                user = %user_id,
                lat = location.lat,
                lng = location.lng,
                %reason,
                "🚫 Report blocked by area cooldown"
            );
            return Err(AppError::CooldownActive(reason));
        }

        debug!(user = %user_id, scanned = recent.len(), "Cooldown check passed");
        Ok(())
    }

    /// Gate check and report creation, then the submission reward.
    ///
    /// Only the check and the insert hold the gate lock; the reward runs after
    /// it is released so other reporters are not queued behind a ledger write.
    pub async fn submit_report(
        &self,
        request: ReportRequest,
        now: DateTime<Utc>,
    ) -> Result<ReportSubmission> {
        let guard = self.submit_lock.clone().lock_owned().await;
        let gate = self.clone();
        tokio::spawn(async move {
            let report = {
                let _guard = guard;
                gate.admit(request, now).await?
            };
            gate.reward_submission(report).await
        })
        .await?
    }

    async fn admit(&self, request: ReportRequest, now: DateTime<Utc>) -> Result<Report> {
        // Unknown reporters are refused before anything is written.
        self.ledger.get_account(&request.user_id).await?;
        self.check_cooldown(&request.user_id, &request.location, now)
            .await?;

        let report = Report {
            id: EntityId::generate(),
            user_id: request.user_id,
            location: request.location,
            trash_count: request.trash_count.unwrap_or(1),
            waste_type: request.waste_type,
            severity: request.severity,
            description: request.description,
            status: ReportStatus::Pending,
            cleanup: None,
            created_at: now,
        };
        self.reports.insert_report(report.clone()).await?;
        Ok(report)
    }

    async fn reward_submission(&self, report: Report) -> Result<ReportSubmission> {
        let points_awarded = match self
            .ledger
            .reward_report(&report.user_id, Some(report.trash_count))
            .await
        {
            Ok(points) => points,
            Err(e) => {
                if let Err(remove_err) = self.reports.remove_report(&report.id).await {
                    error!(
                        report_id = %report.id,
                        error = %remove_err,
                        "❌ Failed to remove unrewarded report"
                    );
                }
                return Err(e.into());
            }
        };

        info!(
            report_id = %report.id,
            user = %report.user_id,
            lat = report.location.lat,
            lng = report.location.lng,
            trash_count = report.trash_count,
            points_awarded,
            "📍 Report submitted"
        );
        Ok(ReportSubmission {
            report,
            points_awarded,
        })
    }

    /// Marks the report cleaned and pays the cleaner the flat cleanup reward.
    pub async fn mark_report_cleaned(
        &self,
        report_id: &EntityId,
        cleaner_id: &UserId,
        cleanup_image_url: impl Into<String>,
    ) -> Result<CleanupReceipt> {
        let gate = self.clone();
        let report_id = report_id.clone();
        let cleanup = Cleanup {
            cleaned_by: cleaner_id.clone(),
            cleanup_image_url: cleanup_image_url.into(),
            cleaned_at: Utc::now(),
        };
        tokio::spawn(async move { gate.clean_and_reward(&report_id, cleanup).await }).await?
    }

    async fn clean_and_reward(&self, report_id: &EntityId, cleanup: Cleanup) -> Result<CleanupReceipt> {
        self.ledger.get_account(&cleanup.cleaned_by).await?;
        let cleaner = cleanup.cleaned_by.clone();

        let current = self.get_report(report_id).await?;
        let report = self
            .transition(&current, ReportStatus::Cleaned, Some(cleanup))
            .await?;

        let points_awarded = match self.ledger.reward_cleanup(&cleaner).await {
            Ok(points) => points,
            Err(e) => {
                // Put the report back the way it was so the cleanup can be retried.
                if let Err(revert_err) = self
                    .reports
                    .transition_report(report_id, ReportStatus::Cleaned, current.status, None)
                    .await
                {
                    error!(
                        report_id = %report_id,
                        error = %revert_err,
                        "❌ Failed to revert report after reward failure"
                    );
                }
                return Err(e.into());
            }
        };

        info!(
            report_id = %report.id,
            cleaner = %cleaner,
            points_awarded,
            "🧹 Report cleaned"
        );
        Ok(CleanupReceipt {
            report,
            points_awarded,
        })
    }

    /// Moderation outcome: `Verified` or `Rejected`.
    pub async fn review_report(&self, report_id: &EntityId, outcome: ReportStatus) -> Result<Report> {
        if !matches!(outcome, ReportStatus::Verified | ReportStatus::Rejected) {
            return Err(AppError::InvalidTransition(format!(
                "a review can only verify or reject, not mark {outcome}"
            )));
        }
        let current = self.get_report(report_id).await?;
        let report = self.transition(&current, outcome, None).await?;
        info!(report_id = %report.id, status = %report.status, "🔄 Report reviewed");
        Ok(report)
    }

    pub async fn get_report(&self, report_id: &EntityId) -> Result<Report> {
        self.reports
            .get_report(report_id)
            .await?
            .ok_or_else(|| AppError::not_found("report", report_id))
    }

    /// All reports, newest first.
    pub async fn all_reports(&self) -> Result<Vec<Report>> {
        Ok(self.reports.all_reports().await?)
    }

    /// Reports matching every set filter, newest first.
    pub async fn find_reports(&self, query: &ReportQuery) -> Result<Vec<Report>> {
        let mut reports = self.reports.all_reports().await?;
        reports.retain(|report| query.matches(report));
        if let Some(limit) = query.limit {
            reports.truncate(limit);
        }
        Ok(reports)
    }

    /// One user's reports, newest first.
    pub async fn reports_for(&self, user_id: &UserId, limit: Option<usize>) -> Result<Vec<Report>> {
        self.find_reports(&ReportQuery {
            user_id: Some(user_id.clone()),
            limit,
            ..ReportQuery::default()
        })
        .await
    }

    async fn transition(
        &self,
        current: &Report,
        to: ReportStatus,
        cleanup: Option<Cleanup>,
    ) -> Result<Report> {
        check_transition(current, to)?;
        match self
            .reports
            .transition_report(&current.id, current.status, to, cleanup)
            .await?
        {
            Transition::Applied(report) => Ok(report),
            Transition::Missing => Err(AppError::not_found("report", &current.id)),
            Transition::Stale(report) => {
                check_transition(&report, to)?;
                Err(AppError::InvalidTransition(format!(
                    "report {} changed concurrently (now {})",
                    report.id, report.status
                )))
            }
        }
    }
}

fn check_transition(report: &Report, to: ReportStatus) -> Result<()> {
    if report.status.can_transition_to(&to) {
        return Ok(());
    }
    if report.status.is_terminal() || report.status == to {
        return Err(AppError::AlreadyProcessed {
            entity: "report",
            id: report.id.clone(),
            status: report.status.to_string(),
        });
    }
    Err(AppError::InvalidTransition(format!(
        "report {} cannot move from {} to {}",
        report.id, report.status, to
    )))
}
