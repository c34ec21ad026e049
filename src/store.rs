//! Transactional record store
//!
//! Every method that touches more than one row runs in a single transaction
//! and re-validates the state it depends on before committing. Callers hold
//! the per-user lock around read-validate-commit sequences, but the store
//! checks are what make the invariants hold across processes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::amount::Amount;
use crate::error::StoreError;
use crate::models::{
    BalanceAccount, ClaimCommit, ClaimRequest, ClaimStatus, MiningSession, NewSession,
    UserId, UserReputation,
};

/// Usage counters consulted by session eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub total_sessions: u32,
    pub first_started_at: Option<DateTime<Utc>>,
}

/// Result of closing a session
#[derive(Debug, Clone, PartialEq)]
pub struct RolloverOutcome {
    pub closed: MiningSession,
    pub settled: Amount,
    pub successor: Option<MiningSession>,
}

#[async_trait]
pub trait RewardStore: Send + Sync {
    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    async fn active_session(&self, user_id: UserId) -> Result<Option<MiningSession>, StoreError>;

    /// Insert a new active session. Fails with `Conflict::ActiveSessionExists`
    /// if the user already has one.
    async fn open_session(&self, session: NewSession) -> Result<MiningSession, StoreError>;

    /// Close `session_id`, credit what it accrued up to `at` to the user's
    /// claimable balance and open `successor` if given. Without a successor
    /// the old session ends up `Expired`, otherwise `RolledOver`.
    async fn rollover_session(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
        successor: Option<NewSession>,
    ) -> Result<RolloverOutcome, StoreError>;

    /// Move everything accrued up to `at` into claimable and reset the
    /// session's accrual baseline to `at`. Returns the swept amount.
    async fn sweep_accumulated(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(MiningSession, Amount), StoreError>;

    /// Carry what accrued up to `at` forward and accrue at `multiplier_bps`
    /// from then on.
    async fn update_session_rate(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
        multiplier_bps: u32,
    ) -> Result<MiningSession, StoreError>;

    /// Active sessions whose end time is at or before `now`
    async fn expired_sessions(&self, now: DateTime<Utc>) -> Result<Vec<MiningSession>, StoreError>;

    async fn active_sessions(&self) -> Result<Vec<MiningSession>, StoreError>;

    async fn session_history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<MiningSession>, StoreError>;

    async fn session_stats(&self, user_id: UserId) -> Result<SessionStats, StoreError>;

    // ------------------------------------------------------------------------
    // Balances & reputation
    // ------------------------------------------------------------------------

    /// Stored balance; users without a row get an empty account.
    async fn balance(&self, user_id: UserId) -> Result<BalanceAccount, StoreError>;

    async fn reputation(&self, user_id: UserId) -> Result<Option<UserReputation>, StoreError>;

    /// Insert `reputation` unless the user already has a record, and return
    /// whichever record is stored afterwards. Never overwrites.
    async fn insert_reputation_if_absent(
        &self,
        reputation: &UserReputation,
    ) -> Result<UserReputation, StoreError>;

    async fn upsert_reputation(&self, reputation: &UserReputation) -> Result<(), StoreError>;

    // ------------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------------

    /// Apply the optional sweep, debit `claimable`, and insert the claim as
    /// `Pending`, all or nothing. Re-checks the open-claim invariant and the
    /// balance inside the transaction.
    async fn commit_claim(&self, commit: ClaimCommit) -> Result<ClaimRequest, StoreError>;

    /// Move a claim to `to`. Refunds `claimable` on `Failed`/`Cancelled` and
    /// credits `claimed` on `Completed`. Fails with `Conflict::StaleStatus`
    /// when the current status does not allow the move.
    async fn transition_claim(
        &self,
        tracking_id: &str,
        to: ClaimStatus,
        at: DateTime<Utc>,
        failure_reason: Option<String>,
    ) -> Result<ClaimRequest, StoreError>;

    async fn claim_by_tracking_id(
        &self,
        tracking_id: &str,
    ) -> Result<Option<ClaimRequest>, StoreError>;

    /// Newest first
    async fn claims_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ClaimRequest>, StoreError>;

    /// Claims submitted at or after `since`, oldest first
    async fn claims_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClaimRequest>, StoreError>;

    async fn open_claim(&self, user_id: UserId) -> Result<Option<ClaimRequest>, StoreError>;

    /// Every `Pending`/`Processing` claim, oldest first
    async fn open_claims(&self) -> Result<Vec<ClaimRequest>, StoreError>;
}
