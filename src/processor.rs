//! Background reconciliation
//!
//! One pass per tick:
//! 1. roll over expired sessions
//! 2. apply the auto-claim policy
//! 3. settle Instant claims left open by an interrupted submission
//! 4. auto-approve due Express claims
//! 5. report overdue claims
//! 6. drop in-memory state for sessions that are gone
//!
//! Each step is independent; a failure is logged and the next step still runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::ConfigHandle;
use crate::ledger::ClaimLedger;
use crate::locks::UserLocks;
use crate::session::MiningEngine;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub rolled_over: usize,
    pub auto_claimed: usize,
    pub instant_resumed: usize,
    pub auto_approved: usize,
    pub overdue: Vec<String>,
}

pub struct Reconciler {
    engine: Arc<MiningEngine>,
    ledger: Arc<ClaimLedger>,
    locks: Arc<UserLocks>,
    config: ConfigHandle,
}

impl Reconciler {
    pub fn new(
        engine: Arc<MiningEngine>,
        ledger: Arc<ClaimLedger>,
        locks: Arc<UserLocks>,
        config: ConfigHandle,
    ) -> Self {
        Self {
            engine,
            ledger,
            locks,
            config,
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        match self.engine.rollover_expired(now).await {
            Ok(outcomes) => report.rolled_over = outcomes.len(),
            Err(e) => error!("Session rollover pass failed: {}", e),
        }

        match self.engine.apply_auto_claim(now).await {
            Ok(swept) => report.auto_claimed = swept.len(),
            Err(e) => error!("Auto-claim pass failed: {}", e),
        }

        match self.ledger.resume_instant().await {
            Ok(resumed) => report.instant_resumed = resumed.len(),
            Err(e) => error!("Instant claim recovery pass failed: {}", e),
        }

        match self.ledger.auto_approve_due(now).await {
            Ok(approved) => report.auto_approved = approved.len(),
            Err(e) => error!("Express auto-approval pass failed: {}", e),
        }

        match self.ledger.overdue_claims(now).await {
            Ok(overdue) => {
                for claim in &overdue {
                    warn!(
                        "Claim {} ({} tier, user {}) is past its deadline {}",
                        claim.tracking_id,
                        claim.processing_tier,
                        claim.user_id,
                        claim.processing_deadline
                    );
                }
                report.overdue = overdue.into_iter().map(|c| c.tracking_id).collect();
            }
            Err(e) => error!("Overdue claim scan failed: {}", e),
        }

        match self.engine.prune_milestones().await {
            Ok(dropped) if dropped > 0 => debug!("Dropped milestones for {} closed sessions", dropped),
            Ok(_) => {}
            Err(e) => error!("Milestone pruning failed: {}", e),
        }
        self.locks.prune();
        report
    }

    /// Tick forever at the configured interval.
    pub async fn run_loop(self: Arc<Self>) {
        let period = Duration::from_secs(self.config.snapshot().mining.reconcile_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        info!("Reconciler started (every {} seconds)", period.as_secs());

        loop {
            ticker.tick().await;
            let report = self.run_once(self.engine.now()).await;
            if report.rolled_over + report.auto_claimed + report.instant_resumed + report.auto_approved
                > 0
            {
                info!(
                    "Reconcile: {} rolled over, {} auto-claimed, {} instant resumed, {} auto-approved, {} overdue",
                    report.rolled_over,
                    report.auto_claimed,
                    report.instant_resumed,
                    report.auto_approved,
                    report.overdue.len()
                );
            } else {
                debug!("Reconcile: nothing to do ({} overdue)", report.overdue.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::clock::{Clock, ManualClock};
    use crate::config::Config;
    use crate::ledger::{ClaimSubmission, LoggingSettlement};
    use crate::models::{ClaimKind, ClaimStatus};
    use crate::pricing::FixedRate;
    use crate::session::SessionLength;
    use crate::storage::SqliteStore;
    use crate::store::RewardStore;
    use chrono::{Duration as ChronoDuration, TimeZone};

    const WALLET: &str = "UQBvW8Z5huBkMJYdnfAEM5JqTNkuWX3diqYENkWsIL0XggGG";

    #[tokio::test]
    async fn test_single_pass_covers_every_step() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0));
        let locks = Arc::new(UserLocks::new());
        let mut config = Config::default();
        config.mining.daily_rate = Amount::from_units(2400);
        let config = ConfigHandle::new(config);

        let engine = Arc::new(MiningEngine::new(
            store.clone(),
            config.clone(),
            clock.clone(),
            locks.clone(),
        ));
        let ledger = Arc::new(ClaimLedger::new(
            store.clone(),
            config.clone(),
            clock.clone(),
            locks.clone(),
            Arc::new(FixedRate(0.1)),
            Arc::new(LoggingSettlement),
        ));
        let reconciler = Reconciler::new(engine.clone(), ledger.clone(), locks, config);

        engine.start_session(1, SessionLength::Standard).await.unwrap();
        clock.set(t0 + ChronoDuration::hours(24));
        let report = reconciler.run_once(clock.now()).await;
        assert_eq!(report.rolled_over, 1);
        assert_eq!(report.instant_resumed, 0);
        assert_eq!(store.balance(1).await.unwrap().claimable, Amount::from_units(2400));

        // $100 lands in Express
        let receipt = ledger
            .submit(ClaimSubmission {
                user_id: 1,
                kind: ClaimKind::Manual {
                    amount: Amount::from_units(1000),
                },
                wallet_address: WALLET.to_string(),
                network: "TON".to_string(),
            })
            .await
            .unwrap();
        let tracking_id = receipt.view.claim.tracking_id.clone();

        let report = reconciler.run_once(clock.now() + ChronoDuration::hours(1)).await;
        assert_eq!(report.auto_approved, 0);
        assert!(report.overdue.is_empty());

        let report = reconciler.run_once(clock.now() + ChronoDuration::hours(6)).await;
        assert_eq!(report.auto_approved, 1);
        let claim = store.claim_by_tracking_id(&tracking_id).await.unwrap().unwrap();
        assert_eq!(claim.status, ClaimStatus::Completed);
    }
}
