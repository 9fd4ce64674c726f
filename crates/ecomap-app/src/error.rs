use ecomap_economics::{EntityId, LedgerError, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which cooldown rule blocked a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum CooldownReason {
    PerUser {
        cooldown_hours: u32,
        /// Minutes until this user may report again.
        minutes_remaining: i64,
    },
    Area {
        radius_meters: f64,
        cooldown_hours: u32,
        distance_meters: f64,
    },
}

impl CooldownReason {
    pub fn rule(&self) -> &'static str {
        match self {
            CooldownReason::PerUser { .. } => "per-user",
            CooldownReason::Area { .. } => "area",
        }
    }
}

impl fmt::Display for CooldownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CooldownReason::PerUser {
                cooldown_hours,
                minutes_remaining,
            } => write!(
                f,
                "You can only submit a report once every {} hour(s). Try again in {}h {:02}m.",
                cooldown_hours,
                minutes_remaining / 60,
                minutes_remaining % 60
            ),
            CooldownReason::Area {
                radius_meters,
                cooldown_hours,
                distance_meters,
            } => write!(
                f,
                "A report already exists {:.1}m away, within {}m of this location in the last {} hour(s).",
                distance_meters, radius_meters, cooldown_hours
            ),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("Item out of stock: {0}")]
    OutOfStock(EntityId),

    #[error("Cooldown active ({rule}): {0}", rule = .0.rule())]
    CooldownActive(CooldownReason),

    #[error("{entity} {id} already processed (status: {status})")]
    AlreadyProcessed {
        entity: &'static str,
        id: EntityId,
        status: String,
    },

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: &EntityId) -> Self {
        Self::NotFound {
            entity,
            id: id.clone(),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        Self::Ledger(LedgerError::from(e))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("worker task failed: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
