//! PostgreSQL storage for mining rewards
//!
//! Selected when DATABASE_URL is set. Every per-user mutation first locks the
//! user's balance row (`SELECT ... FOR UPDATE`), which serializes commits for
//! one user across server instances without touching other users.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::{NoTls, Row, Transaction};
use tracing::info;

use crate::amount::Amount;
use crate::error::{Conflict, StoreError};
use crate::models::{
    BalanceAccount, ClaimCommit, ClaimRequest, ClaimStatus, MiningSession, NewSession,
    SessionStatus, Sweep, UserId, UserReputation,
};
use crate::store::{RewardStore, RolloverOutcome, SessionStats};

/// Database pool configuration
const DB_POOL_MAX_SIZE: usize = 20;
const DB_QUERY_TIMEOUT_SECS: u64 = 30;

const SESSION_COLUMNS: &str =
    "id, user_id, start_time, end_time, status, daily_rate, multiplier_bps, accrual_anchor, carried";

const CLAIM_COLUMNS: &str = "id, user_id, mode, amount, usd_value, processing_tier, status, \
     tracking_id, submitted_at, processing_deadline, risk_score, user_reputation_score, \
     wallet_address, network, requires_verification, resolved_at, failure_reason";

// ============================================================================
// PG STORAGE
// ============================================================================

#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Create storage from DATABASE_URL
    pub async fn new(database_url: &str) -> Result<Self> {
        use deadpool_postgres::{ManagerConfig, PoolConfig, RecyclingMethod};
        use std::time::Duration;

        let mut config = Config::new();
        config.url = Some(database_url.to_string());

        config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        config.pool = Some(PoolConfig {
            max_size: DB_POOL_MAX_SIZE,
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(Duration::from_secs(DB_QUERY_TIMEOUT_SECS)),
                create: Some(Duration::from_secs(10)),
                recycle: Some(Duration::from_secs(30)),
            },
            ..Default::default()
        });

        let pool = config.create_pool(Some(Runtime::Tokio1), NoTls)?;

        // Test connection
        let client = pool.get().await?;
        client
            .execute(
                &format!("SET statement_timeout = '{}s'", DB_QUERY_TIMEOUT_SECS),
                &[],
            )
            .await?;

        info!(
            "Connected to PostgreSQL (pool_size: {}, query_timeout: {}s)",
            DB_POOL_MAX_SIZE, DB_QUERY_TIMEOUT_SECS
        );

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create storage from DATABASE_URL environment variable
    pub async fn from_env() -> Result<Self> {
        let url =
            std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?;
        Self::new(&url).await
    }

    /// Run embedded migrations
    async fn run_migrations(&self) -> Result<()> {
        let client = self.pool.get().await?;

        let exists: bool = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = 'schema_migrations')",
                &[],
            )
            .await?
            .try_get(0)?;

        let applied: bool = if exists {
            client
                .query_one(
                    "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = 1)",
                    &[],
                )
                .await?
                .try_get(0)?
        } else {
            false
        };

        if !applied {
            let migration_sql = include_str!("../migrations/001_schema.sql");
            client.batch_execute(migration_sql).await?;
            info!("Applied migration 001_schema");
        }

        Ok(())
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parsed<T: std::str::FromStr<Err = String>>(row: &Row, idx: usize) -> Result<T, StoreError> {
    let raw: String = row.try_get(idx)?;
    raw.parse().map_err(StoreError::Unavailable)
}

fn bps_from_db(raw: i32) -> Result<u32, StoreError> {
    u32::try_from(raw).map_err(StoreError::unavailable)
}

fn bps_to_db(bps: u32) -> Result<i32, StoreError> {
    i32::try_from(bps).map_err(StoreError::unavailable)
}

fn session_from_row(row: &Row) -> Result<MiningSession, StoreError> {
    Ok(MiningSession {
        id: row.try_get(0)?,
        user_id: row.try_get(1)?,
        start_time: row.try_get(2)?,
        end_time: row.try_get(3)?,
        status: parsed::<SessionStatus>(row, 4)?,
        daily_rate: Amount::from_db(row.try_get(5)?),
        multiplier_bps: bps_from_db(row.try_get(6)?)?,
        accrual_anchor: row.try_get(7)?,
        carried: Amount::from_db(row.try_get(8)?),
    })
}

fn claim_from_row(row: &Row) -> Result<ClaimRequest, StoreError> {
    Ok(ClaimRequest {
        id: row.try_get(0)?,
        user_id: row.try_get(1)?,
        mode: parsed(row, 2)?,
        amount: Amount::from_db(row.try_get(3)?),
        usd_value: row.try_get(4)?,
        processing_tier: parsed(row, 5)?,
        status: parsed(row, 6)?,
        tracking_id: row.try_get(7)?,
        submitted_at: row.try_get(8)?,
        processing_deadline: row.try_get(9)?,
        risk_score: row.try_get(10)?,
        user_reputation_score: row.try_get(11)?,
        wallet_address: row.try_get(12)?,
        network: row.try_get(13)?,
        requires_verification: row.try_get(14)?,
        resolved_at: row.try_get(15)?,
        failure_reason: row.try_get(16)?,
    })
}

fn sessions_from_rows(rows: &[Row]) -> Result<Vec<MiningSession>, StoreError> {
    rows.iter().map(session_from_row).collect()
}

fn claims_from_rows(rows: &[Row]) -> Result<Vec<ClaimRequest>, StoreError> {
    rows.iter().map(claim_from_row).collect()
}

// ============================================================================
// TRANSACTION HELPERS
// ============================================================================

/// Create the balance row if needed and lock it for the rest of the
/// transaction.
async fn lock_balance(tx: &Transaction<'_>, user_id: UserId) -> Result<BalanceAccount, StoreError> {
    tx.execute(
        "INSERT INTO balances (user_id, claimable, claimed) VALUES ($1, 0, 0) ON CONFLICT (user_id) DO NOTHING",
        &[&user_id],
    )
    .await?;
    let row = tx
        .query_one(
            "SELECT claimable, claimed, last_manual_claim_at FROM balances WHERE user_id = $1 FOR UPDATE",
            &[&user_id],
        )
        .await?;
    Ok(BalanceAccount {
        user_id,
        claimable: Amount::from_db(row.try_get(0)?),
        claimed: Amount::from_db(row.try_get(1)?),
        last_manual_claim_at: row.try_get(2)?,
    })
}

async fn lock_session(tx: &Transaction<'_>, session_id: i64) -> Result<MiningSession, StoreError> {
    let row = tx
        .query_opt(
            &format!(
                "SELECT {} FROM mining_sessions WHERE id = $1 FOR UPDATE",
                SESSION_COLUMNS
            ),
            &[&session_id],
        )
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))?;
    let session = session_from_row(&row)?;
    if session.status != SessionStatus::Active {
        return Err(Conflict::SessionNotActive(session_id).into());
    }
    Ok(session)
}

async fn insert_session(
    tx: &Transaction<'_>,
    session: &NewSession,
) -> Result<MiningSession, StoreError> {
    let active = tx
        .query_opt(
            "SELECT id FROM mining_sessions WHERE user_id = $1 AND status = 'active'",
            &[&session.user_id],
        )
        .await?;
    if active.is_some() {
        return Err(Conflict::ActiveSessionExists.into());
    }

    let row = tx
        .query_one(
            &format!(
                "INSERT INTO mining_sessions (user_id, start_time, end_time, status, daily_rate, multiplier_bps, accrual_anchor, carried)
                 VALUES ($1, $2, $3, 'active', $4, $5, $2, 0)
                 RETURNING {}",
                SESSION_COLUMNS
            ),
            &[
                &session.user_id,
                &session.start_time,
                &session.end_time,
                &session.daily_rate.to_db()?,
                &bps_to_db(session.multiplier_bps)?,
            ],
        )
        .await?;
    session_from_row(&row)
}

async fn credit_claimable(
    tx: &Transaction<'_>,
    user_id: UserId,
    amount: Amount,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE balances SET claimable = claimable + $2 WHERE user_id = $1",
        &[&user_id, &amount.to_db()?],
    )
    .await?;
    Ok(())
}

/// Fold a session's accrual up to `at` into claimable and re-anchor it.
/// The caller holds the balance lock.
async fn apply_sweep(
    tx: &Transaction<'_>,
    sweep: Sweep,
) -> Result<(MiningSession, Amount), StoreError> {
    let session = lock_session(tx, sweep.session_id).await?;
    let amount = session.accumulated_at(sweep.at);
    let anchor = sweep.at.min(session.end_time).max(session.accrual_anchor);

    credit_claimable(tx, session.user_id, amount).await?;
    let row = tx
        .query_one(
            &format!(
                "UPDATE mining_sessions SET carried = 0, accrual_anchor = $2 WHERE id = $1 RETURNING {}",
                SESSION_COLUMNS
            ),
            &[&session.id, &anchor],
        )
        .await?;
    Ok((session_from_row(&row)?, amount))
}

fn reputation_from_row(row: &Row) -> Result<UserReputation, StoreError> {
    Ok(UserReputation {
        user_id: row.try_get(0)?,
        score: row.try_get(1)?,
        instant_limit_usd: row.try_get(2)?,
        express_limit_usd: row.try_get(3)?,
        risk_level: parsed(row, 4)?,
    })
}

async fn user_of_session(tx: &Transaction<'_>, session_id: i64) -> Result<UserId, StoreError> {
    let row = tx
        .query_opt(
            "SELECT user_id FROM mining_sessions WHERE id = $1",
            &[&session_id],
        )
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))?;
    Ok(row.try_get(0)?)
}

async fn lock_claim(tx: &Transaction<'_>, tracking_id: &str) -> Result<ClaimRequest, StoreError> {
    let row = tx
        .query_opt(
            &format!(
                "SELECT {} FROM claim_requests WHERE tracking_id = $1 FOR UPDATE",
                CLAIM_COLUMNS
            ),
            &[&tracking_id],
        )
        .await?
        .ok_or_else(|| StoreError::NotFound(tracking_id.to_string()))?;
    claim_from_row(&row)
}

// ============================================================================
// STORE
// ============================================================================

#[async_trait]
impl RewardStore for PgStore {
    async fn active_session(&self, user_id: UserId) -> Result<Option<MiningSession>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM mining_sessions WHERE user_id = $1 AND status = 'active'",
                    SESSION_COLUMNS
                ),
                &[&user_id],
            )
            .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn open_session(&self, session: NewSession) -> Result<MiningSession, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        lock_balance(&tx, session.user_id).await?;
        let opened = insert_session(&tx, &session).await?;
        tx.commit().await?;
        Ok(opened)
    }

    async fn rollover_session(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
        successor: Option<NewSession>,
    ) -> Result<RolloverOutcome, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let user_id = user_of_session(&tx, session_id).await?;
        lock_balance(&tx, user_id).await?;
        let session = lock_session(&tx, session_id).await?;
        let settled = session.accumulated_at(at);
        credit_claimable(&tx, user_id, settled).await?;

        let status = if successor.is_some() {
            SessionStatus::RolledOver
        } else {
            SessionStatus::Expired
        };
        let row = tx
            .query_one(
                &format!(
                    "UPDATE mining_sessions SET status = $2, carried = 0, accrual_anchor = end_time WHERE id = $1 RETURNING {}",
                    SESSION_COLUMNS
                ),
                &[&session_id, &status.as_str()],
            )
            .await?;
        let closed = session_from_row(&row)?;

        let successor = match successor {
            Some(next) => Some(insert_session(&tx, &next).await?),
            None => None,
        };
        tx.commit().await?;

        Ok(RolloverOutcome {
            closed,
            settled,
            successor,
        })
    }

    async fn sweep_accumulated(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(MiningSession, Amount), StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let user_id = user_of_session(&tx, session_id).await?;
        lock_balance(&tx, user_id).await?;
        let swept = apply_sweep(&tx, Sweep { session_id, at }).await?;
        tx.commit().await?;
        Ok(swept)
    }

    async fn update_session_rate(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
        multiplier_bps: u32,
    ) -> Result<MiningSession, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let session = lock_session(&tx, session_id).await?;
        let carried = session.accumulated_at(at);
        let anchor = at.min(session.end_time).max(session.accrual_anchor);
        let row = tx
            .query_one(
                &format!(
                    "UPDATE mining_sessions SET carried = $2, accrual_anchor = $3, multiplier_bps = $4 WHERE id = $1 RETURNING {}",
                    SESSION_COLUMNS
                ),
                &[&session_id, &carried.to_db()?, &anchor, &bps_to_db(multiplier_bps)?],
            )
            .await?;
        let updated = session_from_row(&row)?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn expired_sessions(&self, now: DateTime<Utc>) -> Result<Vec<MiningSession>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM mining_sessions WHERE status = 'active' AND end_time <= $1 ORDER BY end_time",
                    SESSION_COLUMNS
                ),
                &[&now],
            )
            .await?;
        sessions_from_rows(&rows)
    }

    async fn active_sessions(&self) -> Result<Vec<MiningSession>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM mining_sessions WHERE status = 'active' ORDER BY id",
                    SESSION_COLUMNS
                ),
                &[],
            )
            .await?;
        sessions_from_rows(&rows)
    }

    async fn session_history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<MiningSession>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM mining_sessions WHERE user_id = $1 ORDER BY start_time DESC, id DESC LIMIT $2",
                    SESSION_COLUMNS
                ),
                &[&user_id, &i64::from(limit)],
            )
            .await?;
        sessions_from_rows(&rows)
    }

    async fn session_stats(&self, user_id: UserId) -> Result<SessionStats, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*), MIN(start_time) FROM mining_sessions WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(SessionStats {
            total_sessions: u32::try_from(count).unwrap_or(u32::MAX),
            first_started_at: row.try_get(1)?,
        })
    }

    async fn balance(&self, user_id: UserId) -> Result<BalanceAccount, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT claimable, claimed, last_manual_claim_at FROM balances WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        match row {
            Some(row) => Ok(BalanceAccount {
                user_id,
                claimable: Amount::from_db(row.try_get(0)?),
                claimed: Amount::from_db(row.try_get(1)?),
                last_manual_claim_at: row.try_get(2)?,
            }),
            None => Ok(BalanceAccount::empty(user_id)),
        }
    }

    async fn reputation(&self, user_id: UserId) -> Result<Option<UserReputation>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT user_id, score, instant_limit_usd, express_limit_usd, risk_level FROM reputations WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        row.as_ref().map(reputation_from_row).transpose()
    }

    async fn insert_reputation_if_absent(
        &self,
        reputation: &UserReputation,
    ) -> Result<UserReputation, StoreError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO reputations (user_id, score, instant_limit_usd, express_limit_usd, risk_level)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (user_id) DO NOTHING",
                &[
                    &reputation.user_id,
                    &reputation.score,
                    &reputation.instant_limit_usd,
                    &reputation.express_limit_usd,
                    &reputation.risk_level.as_str(),
                ],
            )
            .await?;
        let row = client
            .query_one(
                "SELECT user_id, score, instant_limit_usd, express_limit_usd, risk_level FROM reputations WHERE user_id = $1",
                &[&reputation.user_id],
            )
            .await?;
        reputation_from_row(&row)
    }

    async fn upsert_reputation(&self, reputation: &UserReputation) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO reputations (user_id, score, instant_limit_usd, express_limit_usd, risk_level)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (user_id) DO UPDATE SET
                    score = EXCLUDED.score,
                    instant_limit_usd = EXCLUDED.instant_limit_usd,
                    express_limit_usd = EXCLUDED.express_limit_usd,
                    risk_level = EXCLUDED.risk_level",
                &[
                    &reputation.user_id,
                    &reputation.score,
                    &reputation.instant_limit_usd,
                    &reputation.express_limit_usd,
                    &reputation.risk_level.as_str(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn commit_claim(&self, commit: ClaimCommit) -> Result<ClaimRequest, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let claim = &commit.claim;
        let user_id = claim.user_id;

        lock_balance(&tx, user_id).await?;
        if let Some(sweep) = commit.sweep {
            apply_sweep(&tx, sweep).await?;
        }

        let open = tx
            .query_opt(
                "SELECT tracking_id FROM claim_requests WHERE user_id = $1 AND status IN ('PENDING', 'PROCESSING') LIMIT 1",
                &[&user_id],
            )
            .await?;
        if let Some(row) = open {
            return Err(Conflict::OpenClaimExists(row.try_get(0)?).into());
        }

        let balance = lock_balance(&tx, user_id).await?;
        let remaining = balance.claimable.checked_sub(claim.amount).ok_or(
            Conflict::InsufficientBalance {
                need: claim.amount,
                have: balance.claimable,
            },
        )?;
        let last_manual = if commit.record_manual_claim {
            Some(claim.submitted_at)
        } else {
            balance.last_manual_claim_at
        };
        tx.execute(
            "UPDATE balances SET claimable = $2, last_manual_claim_at = $3 WHERE user_id = $1",
            &[&user_id, &remaining.to_db()?, &last_manual],
        )
        .await?;

        let row = tx
            .query_one(
                &format!(
                    "INSERT INTO claim_requests (user_id, mode, amount, usd_value, processing_tier, status, tracking_id,
                        submitted_at, processing_deadline, risk_score, user_reputation_score, wallet_address, network,
                        requires_verification)
                     VALUES ($1, $2, $3, $4, $5, 'PENDING', $6, $7, $8, $9, $10, $11, $12, $13)
                     RETURNING {}",
                    CLAIM_COLUMNS
                ),
                &[
                    &user_id,
                    &claim.mode.as_str(),
                    &claim.amount.to_db()?,
                    &claim.usd_value,
                    &claim.processing_tier.as_str(),
                    &claim.tracking_id,
                    &claim.submitted_at,
                    &claim.processing_deadline,
                    &claim.risk_score,
                    &claim.user_reputation_score,
                    &claim.wallet_address,
                    &claim.network,
                    &claim.requires_verification,
                ],
            )
            .await?;
        let stored = claim_from_row(&row)?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn transition_claim(
        &self,
        tracking_id: &str,
        to: ClaimStatus,
        at: DateTime<Utc>,
        failure_reason: Option<String>,
    ) -> Result<ClaimRequest, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let user_id: UserId = tx
            .query_opt(
                "SELECT user_id FROM claim_requests WHERE tracking_id = $1",
                &[&tracking_id],
            )
            .await?
            .ok_or_else(|| StoreError::NotFound(tracking_id.to_string()))?
            .try_get(0)?;
        lock_balance(&tx, user_id).await?;

        let claim = lock_claim(&tx, tracking_id).await?;
        if !claim.status.can_transition_to(to) {
            return Err(Conflict::StaleStatus {
                from: claim.status,
                to,
            }
            .into());
        }

        let resolved_at = if to.is_open() { None } else { Some(at) };
        let row = tx
            .query_one(
                &format!(
                    "UPDATE claim_requests SET status = $2, resolved_at = $3, failure_reason = COALESCE($4, failure_reason)
                     WHERE tracking_id = $1 RETURNING {}",
                    CLAIM_COLUMNS
                ),
                &[&tracking_id, &to.as_str(), &resolved_at, &failure_reason],
            )
            .await?;
        let updated = claim_from_row(&row)?;

        if to.refunds() {
            credit_claimable(&tx, user_id, claim.amount).await?;
        } else if to == ClaimStatus::Completed {
            tx.execute(
                "UPDATE balances SET claimed = claimed + $2 WHERE user_id = $1",
                &[&user_id, &claim.amount.to_db()?],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn claim_by_tracking_id(
        &self,
        tracking_id: &str,
    ) -> Result<Option<ClaimRequest>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM claim_requests WHERE tracking_id = $1",
                    CLAIM_COLUMNS
                ),
                &[&tracking_id],
            )
            .await?;
        row.as_ref().map(claim_from_row).transpose()
    }

    async fn claims_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ClaimRequest>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM claim_requests WHERE user_id = $1 ORDER BY submitted_at DESC, id DESC LIMIT $2 OFFSET $3",
                    CLAIM_COLUMNS
                ),
                &[&user_id, &i64::from(limit), &i64::from(offset)],
            )
            .await?;
        claims_from_rows(&rows)
    }

    async fn claims_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClaimRequest>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM claim_requests WHERE user_id = $1 AND submitted_at >= $2 ORDER BY submitted_at, id",
                    CLAIM_COLUMNS
                ),
                &[&user_id, &since],
            )
            .await?;
        claims_from_rows(&rows)
    }

    async fn open_claim(&self, user_id: UserId) -> Result<Option<ClaimRequest>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM claim_requests WHERE user_id = $1 AND status IN ('PENDING', 'PROCESSING') LIMIT 1",
                    CLAIM_COLUMNS
                ),
                &[&user_id],
            )
            .await?;
        row.as_ref().map(claim_from_row).transpose()
    }

    async fn open_claims(&self) -> Result<Vec<ClaimRequest>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM claim_requests WHERE status IN ('PENDING', 'PROCESSING') ORDER BY submitted_at, id",
                    CLAIM_COLUMNS
                ),
                &[],
            )
            .await?;
        claims_from_rows(&rows)
    }
}
