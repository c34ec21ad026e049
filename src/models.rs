//! Records shared by the engine, the ledger and the stores

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;

/// Telegram user id
pub type UserId = i64;

// ============================================================================
// MINING SESSIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
    RolledOver,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
            SessionStatus::RolledOver => "rolled_over",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "expired" => Ok(SessionStatus::Expired),
            "rolled_over" => Ok(SessionStatus::RolledOver),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// One bounded earning window.
///
/// Accrual state lives on the session: `carried` is what accrued before
/// `accrual_anchor` and has not been swept into the claimable balance yet;
/// from the anchor onwards the session earns at `daily_rate × multiplier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningSession {
    pub id: i64,
    pub user_id: UserId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SessionStatus,
    pub daily_rate: Amount,
    pub multiplier_bps: u32,
    pub accrual_anchor: DateTime<Utc>,
    pub carried: Amount,
}

impl MiningSession {
    /// Accumulated, unswept amount as of `now`. Accrual stops at `end_time`.
    pub fn accumulated_at(&self, now: DateTime<Utc>) -> Amount {
        let until = now.min(self.end_time);
        let elapsed_ms = (until - self.accrual_anchor).num_milliseconds();
        self.carried
            .saturating_add(Amount::accrued(self.daily_rate, self.multiplier_bps, elapsed_ms))
    }

    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.end_time - now).num_seconds().max(0)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

/// Session about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub user_id: UserId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub daily_rate: Amount,
    pub multiplier_bps: u32,
}

// ============================================================================
// BALANCES
// ============================================================================

/// Stored part of a user's balance. The accumulating bucket is derived from
/// the active session and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceAccount {
    pub user_id: UserId,
    pub claimable: Amount,
    pub claimed: Amount,
    /// Last accepted manual claim, used by the cooldown. Bulk claims leave it
    /// untouched.
    pub last_manual_claim_at: Option<DateTime<Utc>>,
}

impl BalanceAccount {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            claimable: Amount::ZERO,
            claimed: Amount::ZERO,
            last_manual_claim_at: None,
        }
    }
}

/// All three buckets as seen at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceView {
    pub user_id: UserId,
    pub accumulating: Amount,
    pub claimable: Amount,
    pub claimed: Amount,
    pub as_of: DateTime<Utc>,
}

// ============================================================================
// REPUTATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

/// Trust profile, owned by an external adjustment process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReputation {
    pub user_id: UserId,
    pub score: i32,
    pub instant_limit_usd: f64,
    pub express_limit_usd: f64,
    pub risk_level: RiskLevel,
}

// ============================================================================
// CLAIMS
// ============================================================================

/// Processing tier, ordered from fastest to most reviewed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingTier {
    Instant,
    Express,
    Standard,
}

impl ProcessingTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingTier::Instant => "INSTANT",
            ProcessingTier::Express => "EXPRESS",
            ProcessingTier::Standard => "STANDARD",
        }
    }
}

impl fmt::Display for ProcessingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSTANT" => Ok(ProcessingTier::Instant),
            "EXPRESS" => Ok(ProcessingTier::Express),
            "STANDARD" => Ok(ProcessingTier::Standard),
            other => Err(format!("unknown processing tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ClaimStatus {
    pub const OPEN: [ClaimStatus; 2] = [ClaimStatus::Pending, ClaimStatus::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "PENDING",
            ClaimStatus::Processing => "PROCESSING",
            ClaimStatus::Completed => "COMPLETED",
            ClaimStatus::Failed => "FAILED",
            ClaimStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ClaimStatus::Pending | ClaimStatus::Processing)
    }

    /// `Pending → Processing → {Completed | Failed}`, plus cancellation of
    /// any open claim.
    pub fn can_transition_to(&self, next: ClaimStatus) -> bool {
        use ClaimStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
        )
    }

    /// Terminal statuses that hand the debited amount back to `claimable`
    pub fn refunds(&self) -> bool {
        matches!(self, ClaimStatus::Failed | ClaimStatus::Cancelled)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ClaimStatus::Pending),
            "PROCESSING" => Ok(ClaimStatus::Processing),
            "COMPLETED" => Ok(ClaimStatus::Completed),
            "FAILED" => Ok(ClaimStatus::Failed),
            "CANCELLED" => Ok(ClaimStatus::Cancelled),
            other => Err(format!("unknown claim status: {}", other)),
        }
    }
}

/// What the caller asked to claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimKind {
    /// Partial claim of a given amount; subject to the cooldown.
    Manual { amount: Amount },
    /// Claim everything claimable plus everything accumulated so far.
    Bulk,
}

impl ClaimKind {
    pub fn mode(&self) -> ClaimMode {
        match self {
            ClaimKind::Manual { .. } => ClaimMode::Manual,
            ClaimKind::Bulk => ClaimMode::Bulk,
        }
    }
}

/// Stored discriminant of [`ClaimKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimMode {
    Manual,
    Bulk,
}

impl ClaimMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimMode::Manual => "manual",
            ClaimMode::Bulk => "bulk",
        }
    }
}

impl FromStr for ClaimMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ClaimMode::Manual),
            "bulk" => Ok(ClaimMode::Bulk),
            other => Err(format!("unknown claim mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    HighRiskReview,
    ProcessImmediately,
    AutoApproveAfterDelay,
    ManualReviewRequired,
}

impl RecommendedAction {
    pub fn for_claim(tier: ProcessingTier, risk_score: f64) -> Self {
        if risk_score > 0.7 {
            return RecommendedAction::HighRiskReview;
        }
        match tier {
            ProcessingTier::Instant => RecommendedAction::ProcessImmediately,
            ProcessingTier::Express => RecommendedAction::AutoApproveAfterDelay,
            ProcessingTier::Standard => RecommendedAction::ManualReviewRequired,
        }
    }
}

/// One withdrawal attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub id: i64,
    pub user_id: UserId,
    pub mode: ClaimMode,
    pub amount: Amount,
    pub usd_value: f64,
    pub processing_tier: ProcessingTier,
    pub status: ClaimStatus,
    pub tracking_id: String,
    pub submitted_at: DateTime<Utc>,
    pub processing_deadline: DateTime<Utc>,
    pub risk_score: f64,
    pub user_reputation_score: i32,
    pub wallet_address: String,
    pub network: String,
    pub requires_verification: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

/// Claim row about to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewClaim {
    pub user_id: UserId,
    pub mode: ClaimMode,
    pub amount: Amount,
    pub usd_value: f64,
    pub processing_tier: ProcessingTier,
    pub tracking_id: String,
    pub submitted_at: DateTime<Utc>,
    pub processing_deadline: DateTime<Utc>,
    pub risk_score: f64,
    pub user_reputation_score: i32,
    pub wallet_address: String,
    pub network: String,
    pub requires_verification: bool,
}

/// Session whose accrual up to `at` is folded into `claimable` inside the
/// claim transaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sweep {
    pub session_id: i64,
    pub at: DateTime<Utc>,
}

/// Everything `commit_claim` needs to apply atomically
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimCommit {
    pub claim: NewClaim,
    pub sweep: Option<Sweep>,
    pub record_manual_claim: bool,
}
