//! Error taxonomy
//!
//! Validation failures are terminal and carry enough data for the caller to
//! render a precise message. Infrastructure failures surface as
//! [`StoreError`].

use thiserror::Error;

use crate::amount::{Amount, AmountOutOfRange};
use crate::models::ClaimStatus;

/// Failures of the backing store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record not found: {0}")]
    NotFound(String),

    /// Commit-time re-validation failed; another writer changed the rows
    /// this operation depended on.
    #[error("conflict: {0}")]
    Conflict(#[from] Conflict),

    #[error(transparent)]
    OutOfRange(#[from] AmountOutOfRange),
}

impl StoreError {
    pub fn unavailable(e: impl std::fmt::Display) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Conflict {
    #[error("user already has an active session")]
    ActiveSessionExists,

    #[error("session {0} is no longer active")]
    SessionNotActive(i64),

    #[error("claimable balance {have} is below {need}")]
    InsufficientBalance { need: Amount, have: Amount },

    #[error("claim {0} is still open")]
    OpenClaimExists(String),

    #[error("claim cannot move from {from} to {to}")]
    StaleStatus { from: ClaimStatus, to: ClaimStatus },
}

/// Session start / rollover failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a mining session is already active")]
    AlreadyActive,

    #[error("not eligible to mine: {0}")]
    NotEligible(String),

    #[error("no active mining session")]
    NoActiveSession,

    #[error("invalid multiplier: {0}")]
    InvalidMultiplier(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a claim submission was refused. Order of the checks is fixed, so the
/// first failing check always produces the same reason.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectionReason {
    #[error("claim cooldown active, {remaining_secs}s remaining")]
    CooldownActive { remaining_secs: i64 },

    #[error("claim amount must be greater than zero")]
    InvalidAmount,

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("daily claim limit of {limit} reached")]
    DailyLimitExceeded { limit: u32, count: u32 },

    #[error("claim {tracking_id} is still pending; wait for it to resolve")]
    PendingClaimExists { tracking_id: String },

    #[error("invalid wallet address: {0}")]
    InvalidWallet(String),

    #[error("claim flagged for manual review (risk score {score:.2})")]
    HighRiskRejected { score: f64 },
}

impl RejectionReason {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::CooldownActive { .. } => "cooldown_active",
            RejectionReason::InvalidAmount => "invalid_amount",
            RejectionReason::InsufficientBalance { .. } => "insufficient_balance",
            RejectionReason::DailyLimitExceeded { .. } => "daily_limit_exceeded",
            RejectionReason::PendingClaimExists { .. } => "pending_claim_exists",
            RejectionReason::InvalidWallet(_) => "invalid_wallet",
            RejectionReason::HighRiskRejected { .. } => "high_risk_rejected",
        }
    }
}

/// Claim submission / resolution failures
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("claim rejected: {0}")]
    Rejected(#[from] RejectionReason),

    #[error("claim not found: {0}")]
    NotFound(String),

    #[error("claim cannot move from {from} to {to}")]
    InvalidTransition { from: ClaimStatus, to: ClaimStatus },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ClaimError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ClaimError::NotFound(what),
            StoreError::Conflict(Conflict::StaleStatus { from, to }) => {
                ClaimError::InvalidTransition { from, to }
            }
            StoreError::Conflict(Conflict::InsufficientBalance { need, have }) => {
                ClaimError::Rejected(RejectionReason::InsufficientBalance {
                    requested: need,
                    available: have,
                })
            }
            StoreError::Conflict(Conflict::OpenClaimExists(tracking_id)) => {
                ClaimError::Rejected(RejectionReason::PendingClaimExists { tracking_id })
            }
            other => ClaimError::Store(other),
        }
    }
}

impl ClaimError {
    pub fn rejection(&self) -> Option<&RejectionReason> {
        match self {
            ClaimError::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}
