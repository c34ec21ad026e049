//! Mining session engine
//!
//! Owns the per-user session lifecycle and the accrual view of it:
//!
//! - `start_session`: open a session after the eligibility check
//! - `observe`: pure read of accumulated/remaining at a given instant
//! - `rollover`: settle an expired session into claimable and restart it
//! - `set_multiplier`: prospective rate change
//! - `sweep`: move accumulated into claimable (auto-claim policy)
//!
//! Every mutation runs under the user's lock and a single store
//! transaction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::amount::{Amount, BPS_ONE, MICROS_PER_UNIT};
use crate::clock::Clock;
use crate::config::ConfigHandle;
use crate::error::{Conflict, SessionError, StoreError};
use crate::locks::UserLocks;
use crate::models::{BalanceView, MiningSession, NewSession, UserId};
use crate::store::{RewardStore, RolloverOutcome};

/// Highest accepted multiplier (100x)
pub const MAX_MULTIPLIER_BPS: u32 = 100 * BPS_ONE;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// POLICIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionLength {
    #[default]
    Standard,
    /// Longer session for users holding the extended entitlement
    Extended,
}

/// Whether a user may open (or roll into) a new session
#[async_trait]
pub trait Eligibility: Send + Sync {
    /// `Err(SessionError::NotEligible(..))` when the user may not mine.
    async fn check(
        &self,
        store: &dyn RewardStore,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError>;
}

pub struct AlwaysEligible;

#[async_trait]
impl Eligibility for AlwaysEligible {
    async fn check(
        &self,
        _store: &dyn RewardStore,
        _user_id: UserId,
        _now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Free-mining quota: at most `max_sessions` sessions, all within `period`
/// of the user's first session.
#[derive(Debug, Clone)]
pub struct SessionQuota {
    pub period: Duration,
    pub max_sessions: u32,
}

#[async_trait]
impl Eligibility for SessionQuota {
    async fn check(
        &self,
        store: &dyn RewardStore,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let stats = store.session_stats(user_id).await?;
        if let Some(first) = stats.first_started_at {
            if now >= first + self.period {
                return Err(SessionError::NotEligible(
                    "free mining period has ended".to_string(),
                ));
            }
        }
        if stats.total_sessions >= self.max_sessions {
            return Err(SessionError::NotEligible(format!(
                "all {} mining sessions have been used",
                self.max_sessions
            )));
        }
        Ok(())
    }
}

/// Sweep accumulated currency into claimable once it reaches `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoClaimPolicy {
    pub threshold: Option<Amount>,
}

impl AutoClaimPolicy {
    pub fn should_sweep(&self, accumulated: Amount) -> bool {
        match self.threshold {
            Some(threshold) => !accumulated.is_zero() && accumulated >= threshold,
            None => false,
        }
    }
}

// ============================================================================
// EVENTS & VIEWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MiningEvent {
    SessionStarted {
        user_id: UserId,
        session_id: i64,
        end_time: DateTime<Utc>,
    },
    SessionRolledOver {
        user_id: UserId,
        closed_session_id: i64,
        settled: Amount,
        successor_id: Option<i64>,
    },
    /// Accumulated amount passed a whole unit for the first time in the
    /// current accrual period. Notification only.
    MilestoneCrossed { user_id: UserId, value: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionObservation {
    pub session: MiningSession,
    pub accumulated: Amount,
    pub remaining_secs: i64,
    /// Units per day at the current multiplier
    pub daily_rate: Amount,
    pub as_of: DateTime<Utc>,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct MiningEngine {
    store: Arc<dyn RewardStore>,
    config: ConfigHandle,
    clock: Arc<dyn Clock>,
    locks: Arc<UserLocks>,
    eligibility: Arc<dyn Eligibility>,
    events: broadcast::Sender<MiningEvent>,
    /// session id -> (accrual anchor, last whole unit announced)
    milestones: Mutex<HashMap<i64, (DateTime<Utc>, u64)>>,
}

fn map_store_err(e: StoreError) -> SessionError {
    match e {
        StoreError::Conflict(Conflict::ActiveSessionExists) => SessionError::AlreadyActive,
        StoreError::Conflict(Conflict::SessionNotActive(_)) => SessionError::NoActiveSession,
        other => SessionError::Store(other),
    }
}

impl MiningEngine {
    pub fn new(
        store: Arc<dyn RewardStore>,
        config: ConfigHandle,
        clock: Arc<dyn Clock>,
        locks: Arc<UserLocks>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            config,
            clock,
            locks,
            eligibility: Arc::new(AlwaysEligible),
            events,
            milestones: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_eligibility(mut self, eligibility: Arc<dyn Eligibility>) -> Self {
        self.eligibility = eligibility;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MiningEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: MiningEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn auto_claim_policy(&self) -> AutoClaimPolicy {
        AutoClaimPolicy {
            threshold: self.config.snapshot().mining.auto_claim_threshold,
        }
    }

    fn session_duration(&self, length: SessionLength) -> Duration {
        let mining = self.config.snapshot().mining;
        match length {
            SessionLength::Standard => Duration::hours(mining.session_hours),
            SessionLength::Extended => Duration::hours(mining.extended_session_hours),
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub async fn start_session(
        &self,
        user_id: UserId,
        length: SessionLength,
    ) -> Result<MiningSession, SessionError> {
        let _guard = self.locks.lock(user_id).await;
        let now = self.clock.now();

        if self.store.active_session(user_id).await?.is_some() {
            return Err(SessionError::AlreadyActive);
        }
        self.eligibility
            .check(self.store.as_ref(), user_id, now)
            .await?;

        let session = NewSession {
            user_id,
            start_time: now,
            end_time: now + self.session_duration(length),
            daily_rate: self.config.snapshot().mining.daily_rate,
            multiplier_bps: BPS_ONE,
        };
        let session = self.store.open_session(session).await.map_err(map_store_err)?;

        info!(
            "Started mining session {} for user {} (ends {})",
            session.id, user_id, session.end_time
        );
        self.emit(MiningEvent::SessionStarted {
            user_id,
            session_id: session.id,
            end_time: session.end_time,
        });
        Ok(session)
    }

    /// Accrual view at `now`. Same `now`, same answer.
    pub async fn observe(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionObservation>, SessionError> {
        let Some(session) = self.store.active_session(user_id).await? else {
            return Ok(None);
        };
        let observation = Self::observation(session, now);
        self.note_milestone(&observation);
        Ok(Some(observation))
    }

    fn observation(session: MiningSession, now: DateTime<Utc>) -> SessionObservation {
        let accumulated = session.accumulated_at(now);
        let remaining_secs = session.remaining_secs(now);
        let daily_rate = Amount::accrued(
            session.daily_rate,
            session.multiplier_bps,
            Duration::days(1).num_milliseconds(),
        );
        SessionObservation {
            session,
            accumulated,
            remaining_secs,
            daily_rate,
            as_of: now,
        }
    }

    fn note_milestone(&self, observation: &SessionObservation) {
        let session = &observation.session;
        let units = observation.accumulated.micros() / MICROS_PER_UNIT;
        let crossed = {
            let mut milestones = self.milestones.lock();
            let entry = milestones
                .entry(session.id)
                .or_insert((session.accrual_anchor, 0));
            if entry.0 != session.accrual_anchor {
                *entry = (session.accrual_anchor, 0);
            }
            if units > entry.1 {
                entry.1 = units;
                true
            } else {
                false
            }
        };
        if crossed {
            debug!("User {} crossed {} accumulated units", session.user_id, units);
            self.emit(MiningEvent::MilestoneCrossed {
                user_id: session.user_id,
                value: units,
            });
        }
    }

    /// Settle and restart the user's session if it has expired at `now`.
    /// Returns `None` while the session is still running.
    pub async fn rollover(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<RolloverOutcome>, SessionError> {
        let _guard = self.locks.lock(user_id).await;
        let session = self
            .store
            .active_session(user_id)
            .await?
            .ok_or(SessionError::NoActiveSession)?;
        if !session.is_expired_at(now) {
            return Ok(None);
        }
        self.rollover_locked(session, now).await.map(Some)
    }

    async fn rollover_locked(
        &self,
        session: MiningSession,
        now: DateTime<Utc>,
    ) -> Result<RolloverOutcome, SessionError> {
        let user_id = session.user_id;
        let successor = match self
            .eligibility
            .check(self.store.as_ref(), user_id, now)
            .await
        {
            Ok(()) => Some(NewSession {
                user_id,
                start_time: now,
                end_time: now + (session.end_time - session.start_time),
                daily_rate: self.config.snapshot().mining.daily_rate,
                multiplier_bps: session.multiplier_bps,
            }),
            Err(SessionError::NotEligible(reason)) => {
                info!(
                    "User {} not eligible for a new session ({}), settling only",
                    user_id, reason
                );
                None
            }
            Err(e) => return Err(e),
        };

        let outcome = self
            .store
            .rollover_session(session.id, now, successor)
            .await
            .map_err(map_store_err)?;
        self.milestones.lock().remove(&session.id);

        info!(
            "Rolled over session {} for user {}: settled {} (successor: {:?})",
            session.id,
            user_id,
            outcome.settled,
            outcome.successor.as_ref().map(|s| s.id)
        );
        self.emit(MiningEvent::SessionRolledOver {
            user_id,
            closed_session_id: session.id,
            settled: outcome.settled,
            successor_id: outcome.successor.as_ref().map(|s| s.id),
        });
        Ok(outcome)
    }

    /// Change the rate multiplier from `now` on. Already accrued currency
    /// keeps the old rate.
    pub async fn set_multiplier(
        &self,
        user_id: UserId,
        multiplier_bps: u32,
    ) -> Result<MiningSession, SessionError> {
        if multiplier_bps == 0 || multiplier_bps > MAX_MULTIPLIER_BPS {
            return Err(SessionError::InvalidMultiplier(multiplier_bps));
        }
        let _guard = self.locks.lock(user_id).await;
        let now = self.clock.now();
        let session = self
            .store
            .active_session(user_id)
            .await?
            .ok_or(SessionError::NoActiveSession)?;
        let updated = self
            .store
            .update_session_rate(session.id, now, multiplier_bps)
            .await
            .map_err(map_store_err)?;
        info!(
            "Multiplier for user {} set to {} bps (carried {})",
            user_id, multiplier_bps, updated.carried
        );
        Ok(updated)
    }

    /// Move everything accumulated so far into claimable.
    pub async fn sweep(&self, user_id: UserId) -> Result<Amount, SessionError> {
        let _guard = self.locks.lock(user_id).await;
        let now = self.clock.now();
        let session = self
            .store
            .active_session(user_id)
            .await?
            .ok_or(SessionError::NoActiveSession)?;
        let (_, swept) = self
            .store
            .sweep_accumulated(session.id, now)
            .await
            .map_err(map_store_err)?;
        info!("Swept {} into claimable for user {}", swept, user_id);
        Ok(swept)
    }

    pub async fn history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<MiningSession>, SessionError> {
        Ok(self.store.session_history(user_id, limit).await?)
    }

    /// All three balance buckets at `now`
    pub async fn balance(&self, user_id: UserId, now: DateTime<Utc>) -> Result<BalanceView, SessionError> {
        let account = self.store.balance(user_id).await?;
        let accumulating = self
            .store
            .active_session(user_id)
            .await?
            .map(|s| s.accumulated_at(now))
            .unwrap_or(Amount::ZERO);
        Ok(BalanceView {
            user_id,
            accumulating,
            claimable: account.claimable,
            claimed: account.claimed,
            as_of: now,
        })
    }

    // ------------------------------------------------------------------------
    // Reconciliation passes
    // ------------------------------------------------------------------------

    /// Roll over every session that has expired by `now`.
    pub async fn rollover_expired(&self, now: DateTime<Utc>) -> Result<Vec<RolloverOutcome>, SessionError> {
        let expired = self.store.expired_sessions(now).await?;
        let mut outcomes = Vec::with_capacity(expired.len());
        for session in expired {
            let user_id = session.user_id;
            match self.rollover(user_id, now).await {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) | Err(SessionError::NoActiveSession) => {}
                Err(e) => warn!("Rollover failed for user {}: {}", user_id, e),
            }
        }
        Ok(outcomes)
    }

    /// Forget milestone progress for sessions that are no longer active,
    /// including ones closed by another instance. Returns how many were
    /// dropped.
    pub async fn prune_milestones(&self) -> Result<usize, SessionError> {
        let active: HashSet<i64> = self
            .store
            .active_sessions()
            .await?
            .iter()
            .map(|s| s.id)
            .collect();
        let mut milestones = self.milestones.lock();
        let before = milestones.len();
        milestones.retain(|id, _| active.contains(id));
        Ok(before - milestones.len())
    }

    /// Apply the auto-claim policy to every running session.
    pub async fn apply_auto_claim(&self, now: DateTime<Utc>) -> Result<Vec<(UserId, Amount)>, SessionError> {
        let policy = self.auto_claim_policy();
        if policy.threshold.is_none() {
            return Ok(Vec::new());
        }

        let mut swept = Vec::new();
        for session in self.store.active_sessions().await? {
            if !policy.should_sweep(session.accumulated_at(now)) {
                continue;
            }
            let user_id = session.user_id;
            let _guard = self.locks.lock(user_id).await;
            match self.store.sweep_accumulated(session.id, now).await {
                Ok((_, amount)) => {
                    info!("Auto-claimed {} for user {}", amount, user_id);
                    swept.push((user_id, amount));
                }
                // Rolled over or swept by someone else meanwhile
                Err(StoreError::Conflict(_)) => {}
                Err(e) => warn!("Auto-claim failed for user {}: {}", user_id, e),
            }
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::storage::SqliteStore;
    use chrono::TimeZone;

    struct Harness {
        engine: MiningEngine,
        clock: Arc<ManualClock>,
        store: Arc<SqliteStore>,
        config: ConfigHandle,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    fn harness() -> Harness {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0()));
        let config = ConfigHandle::new(Config::default());
        let engine = MiningEngine::new(
            store.clone(),
            config.clone(),
            clock.clone(),
            Arc::new(UserLocks::new()),
        );
        Harness {
            engine,
            clock,
            store,
            config,
        }
    }

    #[tokio::test]
    async fn test_one_hour_accrual() {
        let h = harness();
        h.engine.start_session(1, SessionLength::Standard).await.unwrap();

        let obs = h
            .engine
            .observe(1, t0() + Duration::seconds(3600))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(obs.accumulated, Amount::from_micros(2_083_333));
        assert_eq!(obs.remaining_secs, 23 * 3600);
        assert_eq!(obs.daily_rate, Amount::from_units(50));
    }

    #[tokio::test]
    async fn test_observe_is_idempotent_and_monotone() {
        let h = harness();
        h.engine.start_session(1, SessionLength::Standard).await.unwrap();

        let at = t0() + Duration::minutes(90);
        let a = h.engine.observe(1, at).await.unwrap().unwrap();
        let b = h.engine.observe(1, at).await.unwrap().unwrap();
        assert_eq!(a.accumulated, b.accumulated);

        let mut previous = Amount::ZERO;
        for minutes in (0..=26 * 60).step_by(37) {
            let obs = h
                .engine
                .observe(1, t0() + Duration::minutes(minutes))
                .await
                .unwrap()
                .unwrap();
            assert!(obs.accumulated >= previous);
            previous = obs.accumulated;
        }
        // Capped at the end of the session
        assert_eq!(previous, Amount::from_units(50));
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let h = harness();
        h.engine.start_session(1, SessionLength::Standard).await.unwrap();
        let err = h
            .engine
            .start_session(1, SessionLength::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyActive));
    }

    #[tokio::test]
    async fn test_extended_session_length() {
        let h = harness();
        let session = h.engine.start_session(1, SessionLength::Extended).await.unwrap();
        assert_eq!(session.end_time - session.start_time, Duration::hours(48));
    }

    #[tokio::test]
    async fn test_rollover_settles_and_restarts() {
        let h = harness();
        let mut events = h.engine.subscribe();
        let first = h.engine.start_session(1, SessionLength::Standard).await.unwrap();

        // Not expired yet
        let early = h.engine.rollover(1, t0() + Duration::hours(23)).await.unwrap();
        assert!(early.is_none());

        let later = t0() + Duration::hours(25);
        let outcome = h.engine.rollover(1, later).await.unwrap().unwrap();
        assert_eq!(outcome.settled, Amount::from_units(50));
        let successor = outcome.successor.unwrap();
        assert_eq!(successor.start_time, later);
        assert_eq!(successor.end_time, later + Duration::hours(24));

        let balance = h.engine.balance(1, later).await.unwrap();
        assert_eq!(balance.claimable, Amount::from_units(50));
        assert_eq!(balance.accumulating, Amount::ZERO);

        assert!(matches!(events.recv().await.unwrap(), MiningEvent::SessionStarted { .. }));
        match events.recv().await.unwrap() {
            MiningEvent::SessionRolledOver {
                closed_session_id,
                successor_id,
                ..
            } => {
                assert_eq!(closed_session_id, first.id);
                assert_eq!(successor_id, Some(successor.id));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rollover_without_eligibility_settles_only() {
        let h = harness();
        let engine = h.engine.with_eligibility(Arc::new(SessionQuota {
            period: Duration::days(100),
            max_sessions: 1,
        }));
        engine.start_session(1, SessionLength::Standard).await.unwrap();

        let later = t0() + Duration::hours(24);
        let outcome = engine.rollover(1, later).await.unwrap().unwrap();
        assert!(outcome.successor.is_none());
        assert_eq!(outcome.settled, Amount::from_units(50));
        assert!(h.store.active_session(1).await.unwrap().is_none());

        let err = engine.start_session(1, SessionLength::Standard).await.unwrap_err();
        assert!(matches!(err, SessionError::NotEligible(_)));
    }

    #[tokio::test]
    async fn test_quota_period_ends() {
        let h = harness();
        let engine = h.engine.with_eligibility(Arc::new(SessionQuota {
            period: Duration::days(2),
            max_sessions: 100,
        }));
        engine.start_session(1, SessionLength::Standard).await.unwrap();
        engine.rollover(1, t0() + Duration::hours(24)).await.unwrap();
        // Third day is past the period
        let outcome = engine
            .rollover(1, t0() + Duration::hours(48))
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.successor.is_none());
    }

    #[tokio::test]
    async fn test_multiplier_is_prospective() {
        let h = harness();
        h.engine.start_session(1, SessionLength::Standard).await.unwrap();

        h.clock.set(t0() + Duration::hours(12));
        h.engine.set_multiplier(1, 2 * BPS_ONE).await.unwrap();

        let obs = h
            .engine
            .observe(1, t0() + Duration::hours(24))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(obs.accumulated, Amount::from_units(75));
        assert_eq!(obs.daily_rate, Amount::from_units(100));

        let err = h.engine.set_multiplier(1, 0).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidMultiplier(0)));
        let err = h.engine.set_multiplier(2, BPS_ONE).await.unwrap_err();
        assert!(matches!(err, SessionError::NoActiveSession));
    }

    #[tokio::test]
    async fn test_milestones_are_announced_once() {
        let h = harness();
        let mut events = h.engine.subscribe();
        h.engine.start_session(1, SessionLength::Standard).await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), MiningEvent::SessionStarted { .. }));

        // ~1.04 units after 30 minutes
        h.engine.observe(1, t0() + Duration::minutes(30)).await.unwrap();
        h.engine.observe(1, t0() + Duration::minutes(31)).await.unwrap();
        // ~2.08 units after an hour
        h.engine.observe(1, t0() + Duration::minutes(60)).await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            MiningEvent::MilestoneCrossed { user_id: 1, value: 1 }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            MiningEvent::MilestoneCrossed { user_id: 1, value: 2 }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_milestones_pruned_for_sessions_closed_elsewhere() {
        let h = harness();
        let session = h.engine.start_session(1, SessionLength::Standard).await.unwrap();
        h.engine.start_session(2, SessionLength::Standard).await.unwrap();
        h.engine.observe(1, t0() + Duration::hours(1)).await.unwrap();
        h.engine.observe(2, t0() + Duration::hours(1)).await.unwrap();

        // Closed directly in the store, as another instance would
        h.store
            .rollover_session(session.id, t0() + Duration::hours(24), None)
            .await
            .unwrap();

        assert_eq!(h.engine.prune_milestones().await.unwrap(), 1);
        assert_eq!(h.engine.prune_milestones().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_moves_accumulated_into_claimable() {
        let h = harness();
        h.engine.start_session(1, SessionLength::Standard).await.unwrap();
        h.clock.set(t0() + Duration::hours(12));

        let swept = h.engine.sweep(1).await.unwrap();
        assert_eq!(swept, Amount::from_units(25));
        let balance = h.engine.balance(1, t0() + Duration::hours(12)).await.unwrap();
        assert_eq!(balance.claimable, Amount::from_units(25));
        assert_eq!(balance.accumulating, Amount::ZERO);

        let err = h.engine.sweep(2).await.unwrap_err();
        assert!(matches!(err, SessionError::NoActiveSession));
    }

    #[tokio::test]
    async fn test_auto_claim_policy_sweeps_at_threshold() {
        let h = harness();
        let mut config = Config::default();
        config.mining.auto_claim_threshold = Some(Amount::from_units(10));
        h.config.replace(config);
        h.engine.start_session(1, SessionLength::Standard).await.unwrap();

        // 4h = 8.33 units, below threshold
        let swept = h.engine.apply_auto_claim(t0() + Duration::hours(4)).await.unwrap();
        assert!(swept.is_empty());

        // 6h = 12.5 units
        h.clock.set(t0() + Duration::hours(6));
        let swept = h.engine.apply_auto_claim(t0() + Duration::hours(6)).await.unwrap();
        assert_eq!(swept, vec![(1, Amount::from_micros(12_500_000))]);

        let balance = h.engine.balance(1, t0() + Duration::hours(6)).await.unwrap();
        assert_eq!(balance.claimable, Amount::from_micros(12_500_000));
        assert_eq!(balance.accumulating, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_rollover_expired_handles_many_users() {
        let h = harness();
        for user in 1..=3 {
            h.engine.start_session(user, SessionLength::Standard).await.unwrap();
        }
        let outcomes = h
            .engine
            .rollover_expired(t0() + Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(h.store.active_sessions().await.unwrap().len(), 3);
        assert_eq!(h.engine.history(1, 10).await.unwrap().len(), 2);
    }
}
