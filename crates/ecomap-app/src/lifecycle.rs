use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed state machine over a record's status field.
pub trait LifecycleState: Send + Sync + Clone + Copy + fmt::Debug + fmt::Display {
    /// Check if this is a terminal state
    fn is_terminal(&self) -> bool;

    /// Check if transition to another state is valid
    fn can_transition_to(&self, next: &Self) -> bool;
}

/// Admin review of a job posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl LifecycleState for ApprovalStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use ApprovalStatus::*;
        match (self, next) {
            (Pending, Approved) | (Pending, Rejected) => true,
            (Pending, Pending) => false,
            (Approved, _) | (Rejected, _) => false,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        })
    }
}

/// Work lifecycle of a posting. Nothing in the core moves it past `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Assigned,
    Completed,
    Cancelled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Verified,
    Rejected,
    Cleaned,
}

impl LifecycleState for ReportStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Cleaned)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use ReportStatus::*;
        match (self, next) {
            (Pending, Verified) | (Pending, Rejected) | (Pending, Cleaned) => true,
            (Verified, Rejected) | (Verified, Cleaned) => true,

            // A rejected report can no longer be reviewed or cleaned.
            (Rejected, _) => false,
            (Cleaned, _) => false,

            _ => false,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Cleaned => "cleaned",
        })
    }
}

/// Fulfilment state of a redemption. Only `Pending` is ever written here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    Pending,
    Claimed,
    Expired,
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Expired => "expired",
        })
    }
}
