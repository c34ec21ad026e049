//! Claim ledger
//!
//! Submission runs the checks below in a fixed order and stops at the first
//! failure, so the same request always yields the same rejection:
//!
//! 0. cooldown (manual claims only), non-zero amount
//! 1. balance
//! 2. daily claim count
//! 3. open claim
//! 4. wallet format
//! 5. risk
//!
//! The accepted claim is then written and the balance debited in one store
//! transaction. Instant claims are settled before `submit` returns.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::amount::Amount;
use crate::clock::Clock;
use crate::config::{Config, ConfigHandle};
use crate::cooldown::CooldownGuard;
use crate::error::{ClaimError, RejectionReason};
use crate::locks::UserLocks;
use crate::models::{
    ClaimCommit, ClaimKind, ClaimRequest, ClaimStatus, NewClaim, ProcessingTier,
    RecommendedAction, Sweep, UserId, UserReputation,
};
use crate::pricing::PriceSource;
use crate::reputation::ReputationPolicy;
use crate::risk;
use crate::store::RewardStore;
use crate::tier::TierClassifier;
use crate::wallet;

// ============================================================================
// SETTLEMENT
// ============================================================================

#[derive(Debug, Clone, Error)]
#[error("settlement failed: {0}")]
pub struct SettlementError(pub String);

/// External payout collaborator, invoked once a claim is approved.
///
/// A claim whose outcome was not recorded is settled again with the same
/// tracking id, so implementations must treat it as an idempotency key.
#[async_trait]
pub trait Settlement: Send + Sync {
    /// Returns an opaque reference for the payout.
    async fn settle(&self, claim: &ClaimRequest) -> Result<String, SettlementError>;
}

/// Records the payout in the log and succeeds
pub struct LoggingSettlement;

#[async_trait]
impl Settlement for LoggingSettlement {
    async fn settle(&self, claim: &ClaimRequest) -> Result<String, SettlementError> {
        info!(
            "Settling {} ({} units to {} on {})",
            claim.tracking_id, claim.amount, claim.wallet_address, claim.network
        );
        Ok(claim.tracking_id.clone())
    }
}

// ============================================================================
// REQUESTS & VIEWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSubmission {
    pub user_id: UserId,
    pub kind: ClaimKind,
    pub wallet_address: String,
    pub network: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimView {
    #[serde(flatten)]
    pub claim: ClaimRequest,
    pub recommended_action: RecommendedAction,
}

impl From<ClaimRequest> for ClaimView {
    fn from(claim: ClaimRequest) -> Self {
        let recommended_action =
            RecommendedAction::for_claim(claim.processing_tier, claim.risk_score);
        Self {
            claim,
            recommended_action,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimReceipt {
    #[serde(flatten)]
    pub view: ClaimView,
    pub warnings: Vec<String>,
}

/// Start of the claim day containing `now`, for a day boundary
/// `offset_secs` east of UTC.
pub fn day_start(now: DateTime<Utc>, offset_secs: i32) -> DateTime<Utc> {
    let offset = Duration::seconds(i64::from(offset_secs));
    let local_midnight = (now + offset).date_naive().and_time(NaiveTime::MIN).and_utc();
    local_midnight - offset
}

fn tracking_id(prefix: &str) -> String {
    format!(
        "{}-{}",
        prefix,
        Uuid::new_v4().simple().to_string().to_uppercase()
    )
}

// ============================================================================
// LEDGER
// ============================================================================

pub struct ClaimLedger {
    store: Arc<dyn RewardStore>,
    config: ConfigHandle,
    clock: Arc<dyn Clock>,
    locks: Arc<UserLocks>,
    prices: Arc<dyn PriceSource>,
    settlement: Arc<dyn Settlement>,
}

impl ClaimLedger {
    pub fn new(
        store: Arc<dyn RewardStore>,
        config: ConfigHandle,
        clock: Arc<dyn Clock>,
        locks: Arc<UserLocks>,
        prices: Arc<dyn PriceSource>,
        settlement: Arc<dyn Settlement>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            locks,
            prices,
            settlement,
        }
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    pub async fn submit(&self, submission: ClaimSubmission) -> Result<ClaimReceipt, ClaimError> {
        let user_id = submission.user_id;
        let _guard = self.locks.lock(user_id).await;

        let result = self.submit_locked(submission).await;
        if let Err(ClaimError::Rejected(reason)) = &result {
            warn!(
                "Claim rejected for user {}: {} ({})",
                user_id,
                reason.code(),
                reason
            );
        }
        result
    }

    async fn submit_locked(&self, submission: ClaimSubmission) -> Result<ClaimReceipt, ClaimError> {
        // One config snapshot for the whole request
        let config: Config = self.config.snapshot();
        let now = self.clock.now();
        let user_id = submission.user_id;

        let account = self.store.balance(user_id).await?;

        // 0. Cooldown, then amount
        CooldownGuard::new(config.claims.cooldown_secs).check(
            &submission.kind,
            account.last_manual_claim_at,
            now,
        )?;

        let session = self.store.active_session(user_id).await?;
        let (amount, available, sweep) = match submission.kind {
            ClaimKind::Manual { amount } => (amount, account.claimable, None),
            ClaimKind::Bulk => {
                let accumulated = session
                    .as_ref()
                    .map(|s| s.accumulated_at(now))
                    .unwrap_or(Amount::ZERO);
                let total = account.claimable.saturating_add(accumulated);
                let sweep = session
                    .as_ref()
                    .filter(|_| !accumulated.is_zero())
                    .map(|s| Sweep {
                        session_id: s.id,
                        at: now,
                    });
                (total, total, sweep)
            }
        };
        if amount.is_zero() {
            return Err(RejectionReason::InvalidAmount.into());
        }

        // 1. Balance
        if available < amount {
            return Err(RejectionReason::InsufficientBalance {
                requested: amount,
                available,
            }
            .into());
        }

        // 2. Daily count
        let policy = ReputationPolicy::new(config.reputation.clone());
        let lookup = policy.load(self.store.as_ref(), user_id).await;
        let limit = policy.daily_limit(&lookup, &config.claims);
        let since = day_start(now, config.claims.day_boundary_offset_secs);
        let today = self
            .store
            .claims_since(user_id, since)
            .await?
            .iter()
            .filter(|c| c.status != ClaimStatus::Cancelled)
            .count() as u32;
        if today >= limit {
            return Err(RejectionReason::DailyLimitExceeded {
                limit,
                count: today,
            }
            .into());
        }

        // 3. Open claim
        if let Some(open) = self.store.open_claim(user_id).await? {
            return Err(RejectionReason::PendingClaimExists {
                tracking_id: open.tracking_id,
            }
            .into());
        }

        // 4. Wallet
        wallet::validate(&submission.wallet_address, &submission.network)?;

        // 5. Risk
        let usd_value = self.prices.usd_value(amount);
        let trusted = (!lookup.degraded).then_some(&lookup.reputation);
        let risk_score = risk::assess(self.store.as_ref(), user_id, usd_value, trusted, now).await;
        if risk_score > config.claims.high_risk_threshold {
            return Err(RejectionReason::HighRiskRejected { score: risk_score }.into());
        }
        let requires_verification = risk_score > config.claims.verification_risk_threshold;
        let mut warnings = Vec::new();
        if requires_verification {
            warnings.push("This claim will require additional verification".to_string());
        }

        let decision = TierClassifier::new(&config.tiers, &config.reputation).classify(
            usd_value,
            trusted,
            now,
        );

        let claim = NewClaim {
            user_id,
            mode: submission.kind.mode(),
            amount,
            usd_value,
            processing_tier: decision.tier,
            tracking_id: tracking_id(&config.claims.tracking_prefix),
            submitted_at: now,
            processing_deadline: decision.deadline,
            risk_score,
            user_reputation_score: lookup.reputation.score,
            wallet_address: submission.wallet_address.trim().to_string(),
            network: submission.network.clone(),
            requires_verification,
        };
        let stored = self
            .store
            .commit_claim(ClaimCommit {
                claim,
                sweep,
                record_manual_claim: matches!(submission.kind, ClaimKind::Manual { .. }),
            })
            .await?;

        info!(
            "Accepted claim {} for user {}: {} units (${:.2}), tier {}, risk {:.2}",
            stored.tracking_id,
            user_id,
            stored.amount,
            stored.usd_value,
            stored.processing_tier,
            stored.risk_score
        );

        let claim = if stored.processing_tier == ProcessingTier::Instant {
            match self.settle_locked(stored.clone()).await {
                Ok(settled) => settled,
                Err(e) => {
                    // Committed but unresolved; the reconciler resumes it
                    error!(
                        "Instant claim {} left open after settlement error: {}",
                        stored.tracking_id, e
                    );
                    warnings.push("Payout is delayed and will be retried".to_string());
                    match self.store.claim_by_tracking_id(&stored.tracking_id).await {
                        Ok(Some(current)) => current,
                        _ => stored,
                    }
                }
            }
        } else {
            stored
        };

        Ok(ClaimReceipt {
            view: claim.into(),
            warnings,
        })
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// Pending → Processing → Completed (or Failed if the payout fails)
    async fn settle_locked(&self, claim: ClaimRequest) -> Result<ClaimRequest, ClaimError> {
        let claim = if claim.status == ClaimStatus::Pending {
            self.store
                .transition_claim(&claim.tracking_id, ClaimStatus::Processing, self.clock.now(), None)
                .await?
        } else {
            claim
        };

        match self.settlement.settle(&claim).await {
            Ok(reference) => {
                let done = self
                    .store
                    .transition_claim(&claim.tracking_id, ClaimStatus::Completed, self.clock.now(), None)
                    .await?;
                info!("Claim {} completed (ref {})", done.tracking_id, reference);
                Ok(done)
            }
            Err(e) => {
                error!("Claim {} failed to settle: {}", claim.tracking_id, e);
                let failed = self
                    .store
                    .transition_claim(
                        &claim.tracking_id,
                        ClaimStatus::Failed,
                        self.clock.now(),
                        Some(e.to_string()),
                    )
                    .await?;
                Ok(failed)
            }
        }
    }

    async fn load(&self, tracking_id: &str) -> Result<ClaimRequest, ClaimError> {
        self.store
            .claim_by_tracking_id(tracking_id)
            .await?
            .ok_or_else(|| ClaimError::NotFound(tracking_id.to_string()))
    }

    /// Approve an open claim and hand it to settlement.
    pub async fn approve(&self, tracking_id: &str) -> Result<ClaimView, ClaimError> {
        let claim = self.load(tracking_id).await?;
        let _guard = self.locks.lock(claim.user_id).await;
        // Re-read under the lock
        let claim = self.load(tracking_id).await?;
        if !claim.status.is_open() {
            return Err(ClaimError::InvalidTransition {
                from: claim.status,
                to: ClaimStatus::Processing,
            });
        }
        info!("Approving claim {}", tracking_id);
        Ok(self.settle_locked(claim).await?.into())
    }

    /// Fail an open claim and refund its amount.
    pub async fn reject(&self, tracking_id: &str, reason: &str) -> Result<ClaimView, ClaimError> {
        let claim = self.load(tracking_id).await?;
        let _guard = self.locks.lock(claim.user_id).await;
        let failed = self
            .store
            .transition_claim(
                tracking_id,
                ClaimStatus::Failed,
                self.clock.now(),
                Some(reason.to_string()),
            )
            .await?;
        info!("Rejected claim {}: {}", tracking_id, reason);
        Ok(failed.into())
    }

    /// Cancel an open claim and refund its amount.
    pub async fn cancel(&self, tracking_id: &str) -> Result<ClaimView, ClaimError> {
        let claim = self.load(tracking_id).await?;
        let _guard = self.locks.lock(claim.user_id).await;
        let cancelled = self
            .store
            .transition_claim(tracking_id, ClaimStatus::Cancelled, self.clock.now(), None)
            .await?;
        info!("Cancelled claim {}", tracking_id);
        Ok(cancelled.into())
    }

    /// Replace a user's reputation record on behalf of the adjustment
    /// process. The next claim picks it up.
    pub async fn set_reputation(
        &self,
        reputation: UserReputation,
    ) -> Result<UserReputation, ClaimError> {
        let _guard = self.locks.lock(reputation.user_id).await;
        self.store.upsert_reputation(&reputation).await?;
        info!(
            "Reputation for user {} set to {} ({})",
            reputation.user_id,
            reputation.score,
            reputation.risk_level.as_str()
        );
        Ok(reputation)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn status(&self, tracking_id: &str) -> Result<ClaimView, ClaimError> {
        Ok(self.load(tracking_id).await?.into())
    }

    pub async fn history(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ClaimView>, ClaimError> {
        let claims = self.store.claims_for_user(user_id, limit, offset).await?;
        Ok(claims.into_iter().map(ClaimView::from).collect())
    }

    /// Open claims past their processing deadline. Reported, never changed.
    pub async fn overdue_claims(&self, now: DateTime<Utc>) -> Result<Vec<ClaimRequest>, ClaimError> {
        let open = self.store.open_claims().await?;
        Ok(open
            .into_iter()
            .filter(|c| c.processing_deadline < now)
            .collect())
    }

    /// Settle Instant claims left open by an interrupted submission.
    pub async fn resume_instant(&self) -> Result<Vec<ClaimView>, ClaimError> {
        let stranded: Vec<_> = self
            .store
            .open_claims()
            .await?
            .into_iter()
            .filter(|c| c.processing_tier == ProcessingTier::Instant)
            .collect();

        let mut resumed = Vec::with_capacity(stranded.len());
        for claim in stranded {
            match self.approve(&claim.tracking_id).await {
                Ok(view) => {
                    info!("Resumed instant claim {} ({})", claim.tracking_id, view.claim.status);
                    resumed.push(view);
                }
                Err(ClaimError::InvalidTransition { .. }) => {}
                Err(e) => warn!("Resuming instant claim {} failed: {}", claim.tracking_id, e),
            }
        }
        Ok(resumed)
    }

    /// Approve Express claims that have waited out the auto-approve delay
    /// and were not flagged for verification.
    pub async fn auto_approve_due(&self, now: DateTime<Utc>) -> Result<Vec<ClaimView>, ClaimError> {
        let delay = Duration::hours(self.config.snapshot().claims.express_auto_approve_hours);
        let due: Vec<_> = self
            .store
            .open_claims()
            .await?
            .into_iter()
            .filter(|c| {
                c.status == ClaimStatus::Pending
                    && c.processing_tier == ProcessingTier::Express
                    && !c.requires_verification
                    && c.submitted_at + delay <= now
            })
            .collect();

        let mut approved = Vec::with_capacity(due.len());
        for claim in due {
            match self.approve(&claim.tracking_id).await {
                Ok(view) => approved.push(view),
                // Resolved by someone else in the meantime
                Err(ClaimError::InvalidTransition { .. }) => {}
                Err(e) => warn!("Auto-approval of {} failed: {}", claim.tracking_id, e),
            }
        }
        Ok(approved)
    }
}
