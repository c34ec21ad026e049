//! SQLite storage for single-node deployments and tests
//!
//! Timestamps are stored as UTC milliseconds and amounts as micro-units so
//! range queries and balance checks stay in integer arithmetic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::info;

use crate::amount::Amount;
use crate::error::{Conflict, StoreError};
use crate::models::{
    BalanceAccount, ClaimCommit, ClaimRequest, ClaimStatus, MiningSession, NewSession,
    SessionStatus, Sweep, UserId, UserReputation,
};
use crate::store::{RewardStore, RolloverOutcome, SessionStats};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS mining_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL,
    status TEXT NOT NULL,
    daily_rate INTEGER NOT NULL,
    multiplier_bps INTEGER NOT NULL,
    accrual_anchor INTEGER NOT NULL,
    carried INTEGER NOT NULL DEFAULT 0,
    CHECK (end_time > start_time)
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_active
    ON mining_sessions(user_id) WHERE status = 'active';
CREATE INDEX IF NOT EXISTS idx_sessions_user ON mining_sessions(user_id, start_time);

CREATE TABLE IF NOT EXISTS balances (
    user_id INTEGER PRIMARY KEY,
    claimable INTEGER NOT NULL DEFAULT 0 CHECK (claimable >= 0),
    claimed INTEGER NOT NULL DEFAULT 0 CHECK (claimed >= 0),
    last_manual_claim_at INTEGER
);

CREATE TABLE IF NOT EXISTS reputations (
    user_id INTEGER PRIMARY KEY,
    score INTEGER NOT NULL,
    instant_limit_usd REAL NOT NULL,
    express_limit_usd REAL NOT NULL,
    risk_level TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS claim_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    mode TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    usd_value REAL NOT NULL,
    processing_tier TEXT NOT NULL,
    status TEXT NOT NULL,
    tracking_id TEXT NOT NULL UNIQUE,
    submitted_at INTEGER NOT NULL,
    processing_deadline INTEGER NOT NULL,
    risk_score REAL NOT NULL,
    user_reputation_score INTEGER NOT NULL,
    wallet_address TEXT NOT NULL,
    network TEXT NOT NULL,
    requires_verification INTEGER NOT NULL DEFAULT 0,
    resolved_at INTEGER,
    failure_reason TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_claims_one_open
    ON claim_requests(user_id) WHERE status IN ('PENDING', 'PROCESSING');
CREATE INDEX IF NOT EXISTS idx_claims_user_submitted ON claim_requests(user_id, submitted_at);
"#;

const SESSION_COLUMNS: &str =
    "id, user_id, start_time, end_time, status, daily_rate, multiplier_bps, accrual_anchor, carried";

const CLAIM_COLUMNS: &str = "id, user_id, mode, amount, usd_value, processing_tier, status, \
     tracking_id, submitted_at, processing_deadline, risk_score, user_reputation_score, \
     wallet_address, network, requires_verification, resolved_at, failure_reason";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        info!("Opened SQLite store at {}", path.display());
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn run_migrations(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn bad_column(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(raw)
        .ok_or_else(|| bad_column(idx, format!("timestamp out of range: {}", raw)))
}

fn ts_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => ts(row, idx).map(Some),
        None => Ok(None),
    }
}

fn parsed<T: std::str::FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| bad_column(idx, e))
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<MiningSession> {
    Ok(MiningSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        start_time: ts(row, 2)?,
        end_time: ts(row, 3)?,
        status: parsed::<SessionStatus>(row, 4)?,
        daily_rate: Amount::from_db(row.get(5)?),
        multiplier_bps: row.get(6)?,
        accrual_anchor: ts(row, 7)?,
        carried: Amount::from_db(row.get(8)?),
    })
}

fn claim_from_row(row: &Row<'_>) -> rusqlite::Result<ClaimRequest> {
    Ok(ClaimRequest {
        id: row.get(0)?,
        user_id: row.get(1)?,
        mode: parsed(row, 2)?,
        amount: Amount::from_db(row.get(3)?),
        usd_value: row.get(4)?,
        processing_tier: parsed(row, 5)?,
        status: parsed(row, 6)?,
        tracking_id: row.get(7)?,
        submitted_at: ts(row, 8)?,
        processing_deadline: ts(row, 9)?,
        risk_score: row.get(10)?,
        user_reputation_score: row.get(11)?,
        wallet_address: row.get(12)?,
        network: row.get(13)?,
        requires_verification: row.get(14)?,
        resolved_at: ts_opt(row, 15)?,
        failure_reason: row.get(16)?,
    })
}

// ============================================================================
// TRANSACTION HELPERS
// ============================================================================

fn load_session(conn: &Connection, session_id: i64) -> Result<MiningSession, StoreError> {
    conn.query_row(
        &format!("SELECT {} FROM mining_sessions WHERE id = ?1", SESSION_COLUMNS),
        params![session_id],
        session_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))
}

fn load_active_session(conn: &Connection, session_id: i64) -> Result<MiningSession, StoreError> {
    let session = load_session(conn, session_id)?;
    if session.status != SessionStatus::Active {
        return Err(Conflict::SessionNotActive(session_id).into());
    }
    Ok(session)
}

fn insert_session(conn: &Connection, session: &NewSession) -> Result<MiningSession, StoreError> {
    let active: Option<i64> = conn
        .query_row(
            "SELECT id FROM mining_sessions WHERE user_id = ?1 AND status = 'active'",
            params![session.user_id],
            |row| row.get(0),
        )
        .optional()?;
    if active.is_some() {
        return Err(Conflict::ActiveSessionExists.into());
    }

    conn.execute(
        "INSERT INTO mining_sessions (user_id, start_time, end_time, status, daily_rate, multiplier_bps, accrual_anchor, carried)
         VALUES (?1, ?2, ?3, 'active', ?4, ?5, ?2, 0)",
        params![
            session.user_id,
            ms(session.start_time),
            ms(session.end_time),
            session.daily_rate.to_db()?,
            session.multiplier_bps,
        ],
    )?;
    load_session(conn, conn.last_insert_rowid())
}

fn ensure_balance(conn: &Connection, user_id: UserId) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO balances (user_id, claimable, claimed) VALUES (?1, 0, 0)",
        params![user_id],
    )?;
    Ok(())
}

fn load_balance(conn: &Connection, user_id: UserId) -> Result<BalanceAccount, StoreError> {
    let account = conn
        .query_row(
            "SELECT claimable, claimed, last_manual_claim_at FROM balances WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(BalanceAccount {
                    user_id,
                    claimable: Amount::from_db(row.get(0)?),
                    claimed: Amount::from_db(row.get(1)?),
                    last_manual_claim_at: ts_opt(row, 2)?,
                })
            },
        )
        .optional()?;
    Ok(account.unwrap_or_else(|| BalanceAccount::empty(user_id)))
}

fn load_reputation(conn: &Connection, user_id: UserId) -> Result<Option<UserReputation>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT user_id, score, instant_limit_usd, express_limit_usd, risk_level FROM reputations WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserReputation {
                    user_id: row.get(0)?,
                    score: row.get(1)?,
                    instant_limit_usd: row.get(2)?,
                    express_limit_usd: row.get(3)?,
                    risk_level: parsed(row, 4)?,
                })
            },
        )
        .optional()?)
}

fn credit_claimable(conn: &Connection, user_id: UserId, amount: Amount) -> Result<(), StoreError> {
    ensure_balance(conn, user_id)?;
    conn.execute(
        "UPDATE balances SET claimable = claimable + ?2 WHERE user_id = ?1",
        params![user_id, amount.to_db()?],
    )?;
    Ok(())
}

/// Fold a session's accrual up to `at` into claimable and re-anchor it.
fn apply_sweep(conn: &Connection, sweep: Sweep) -> Result<(MiningSession, Amount), StoreError> {
    let session = load_active_session(conn, sweep.session_id)?;
    let amount = session.accumulated_at(sweep.at);
    let anchor = sweep.at.min(session.end_time).max(session.accrual_anchor);

    credit_claimable(conn, session.user_id, amount)?;
    conn.execute(
        "UPDATE mining_sessions SET carried = 0, accrual_anchor = ?2 WHERE id = ?1",
        params![session.id, ms(anchor)],
    )?;
    Ok((load_session(conn, session.id)?, amount))
}

fn load_claim(conn: &Connection, tracking_id: &str) -> Result<Option<ClaimRequest>, StoreError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM claim_requests WHERE tracking_id = ?1",
                CLAIM_COLUMNS
            ),
            params![tracking_id],
            claim_from_row,
        )
        .optional()?)
}

fn load_open_claim(conn: &Connection, user_id: UserId) -> Result<Option<ClaimRequest>, StoreError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM claim_requests WHERE user_id = ?1 AND status IN ('PENDING', 'PROCESSING') LIMIT 1",
                CLAIM_COLUMNS
            ),
            params![user_id],
            claim_from_row,
        )
        .optional()?)
}

// ============================================================================
// STORE
// ============================================================================

#[async_trait]
impl RewardStore for SqliteStore {
    async fn active_session(&self, user_id: UserId) -> Result<Option<MiningSession>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM mining_sessions WHERE user_id = ?1 AND status = 'active'",
                    SESSION_COLUMNS
                ),
                params![user_id],
                session_from_row,
            )
            .optional()?)
    }

    async fn open_session(&self, session: NewSession) -> Result<MiningSession, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        ensure_balance(&tx, session.user_id)?;
        let opened = insert_session(&tx, &session)?;
        tx.commit()?;
        Ok(opened)
    }

    async fn rollover_session(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
        successor: Option<NewSession>,
    ) -> Result<RolloverOutcome, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let session = load_active_session(&tx, session_id)?;
        let settled = session.accumulated_at(at);
        credit_claimable(&tx, session.user_id, settled)?;

        let status = if successor.is_some() {
            SessionStatus::RolledOver
        } else {
            SessionStatus::Expired
        };
        tx.execute(
            "UPDATE mining_sessions SET status = ?2, carried = 0, accrual_anchor = end_time WHERE id = ?1",
            params![session_id, status.as_str()],
        )?;

        let successor = match successor {
            Some(next) => Some(insert_session(&tx, &next)?),
            None => None,
        };
        let closed = load_session(&tx, session_id)?;
        tx.commit()?;

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
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let swept = apply_sweep(&tx, Sweep { session_id, at })?;
        tx.commit()?;
        Ok(swept)
    }

    async fn update_session_rate(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
        multiplier_bps: u32,
    ) -> Result<MiningSession, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let session = load_active_session(&tx, session_id)?;
        let carried = session.accumulated_at(at);
        let anchor = at.min(session.end_time).max(session.accrual_anchor);
        tx.execute(
            "UPDATE mining_sessions SET carried = ?2, accrual_anchor = ?3, multiplier_bps = ?4 WHERE id = ?1",
            params![session_id, carried.to_db()?, ms(anchor), multiplier_bps],
        )?;
        let updated = load_session(&tx, session_id)?;
        tx.commit()?;
        Ok(updated)
    }

    async fn expired_sessions(&self, now: DateTime<Utc>) -> Result<Vec<MiningSession>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM mining_sessions WHERE status = 'active' AND end_time <= ?1 ORDER BY end_time",
            SESSION_COLUMNS
        ))?;
        let sessions = stmt
            .query_map(params![ms(now)], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    async fn active_sessions(&self) -> Result<Vec<MiningSession>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM mining_sessions WHERE status = 'active' ORDER BY id",
            SESSION_COLUMNS
        ))?;
        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    async fn session_history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<MiningSession>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM mining_sessions WHERE user_id = ?1 ORDER BY start_time DESC, id DESC LIMIT ?2",
            SESSION_COLUMNS
        ))?;
        let sessions = stmt
            .query_map(params![user_id, limit], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    async fn session_stats(&self, user_id: UserId) -> Result<SessionStats, StoreError> {
        let conn = self.conn.lock();
        let (count, first): (u32, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), MIN(start_time) FROM mining_sessions WHERE user_id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(SessionStats {
            total_sessions: count,
            first_started_at: first.and_then(DateTime::from_timestamp_millis),
        })
    }

    async fn balance(&self, user_id: UserId) -> Result<BalanceAccount, StoreError> {
        let conn = self.conn.lock();
        load_balance(&conn, user_id)
    }

    async fn reputation(&self, user_id: UserId) -> Result<Option<UserReputation>, StoreError> {
        let conn = self.conn.lock();
        load_reputation(&conn, user_id)
    }

    async fn insert_reputation_if_absent(
        &self,
        reputation: &UserReputation,
    ) -> Result<UserReputation, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO reputations (user_id, score, instant_limit_usd, express_limit_usd, risk_level)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO NOTHING",
            params![
                reputation.user_id,
                reputation.score,
                reputation.instant_limit_usd,
                reputation.express_limit_usd,
                reputation.risk_level.as_str(),
            ],
        )?;
        load_reputation(&conn, reputation.user_id)?
            .ok_or_else(|| StoreError::NotFound(format!("reputation {}", reputation.user_id)))
    }

    async fn upsert_reputation(&self, reputation: &UserReputation) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO reputations (user_id, score, instant_limit_usd, express_limit_usd, risk_level)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                score = excluded.score,
                instant_limit_usd = excluded.instant_limit_usd,
                express_limit_usd = excluded.express_limit_usd,
                risk_level = excluded.risk_level",
            params![
                reputation.user_id,
                reputation.score,
                reputation.instant_limit_usd,
                reputation.express_limit_usd,
                reputation.risk_level.as_str(),
            ],
        )?;
        Ok(())
    }

    async fn commit_claim(&self, commit: ClaimCommit) -> Result<ClaimRequest, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let claim = &commit.claim;
        let user_id = claim.user_id;

        ensure_balance(&tx, user_id)?;
        if let Some(sweep) = commit.sweep {
            apply_sweep(&tx, sweep)?;
        }

        if let Some(open) = load_open_claim(&tx, user_id)? {
            return Err(Conflict::OpenClaimExists(open.tracking_id).into());
        }

        let balance = load_balance(&tx, user_id)?;
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
            "UPDATE balances SET claimable = ?2, last_manual_claim_at = ?3 WHERE user_id = ?1",
            params![user_id, remaining.to_db()?, last_manual.map(ms)],
        )?;

        tx.execute(
            "INSERT INTO claim_requests (user_id, mode, amount, usd_value, processing_tier, status, tracking_id,
                submitted_at, processing_deadline, risk_score, user_reputation_score, wallet_address, network,
                requires_verification)
             VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING', ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                user_id,
                claim.mode.as_str(),
                claim.amount.to_db()?,
                claim.usd_value,
                claim.processing_tier.as_str(),
                claim.tracking_id,
                ms(claim.submitted_at),
                ms(claim.processing_deadline),
                claim.risk_score,
                claim.user_reputation_score,
                claim.wallet_address,
                claim.network,
                claim.requires_verification,
            ],
        )?;

        let stored = load_claim(&tx, &claim.tracking_id)?
            .ok_or_else(|| StoreError::NotFound(claim.tracking_id.clone()))?;
        tx.commit()?;
        Ok(stored)
    }

    async fn transition_claim(
        &self,
        tracking_id: &str,
        to: ClaimStatus,
        at: DateTime<Utc>,
        failure_reason: Option<String>,
    ) -> Result<ClaimRequest, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let claim = load_claim(&tx, tracking_id)?
            .ok_or_else(|| StoreError::NotFound(tracking_id.to_string()))?;
        if !claim.status.can_transition_to(to) {
            return Err(Conflict::StaleStatus {
                from: claim.status,
                to,
            }
            .into());
        }

        let resolved_at = if to.is_open() { None } else { Some(ms(at)) };
        tx.execute(
            "UPDATE claim_requests SET status = ?2, resolved_at = ?3, failure_reason = COALESCE(?4, failure_reason)
             WHERE tracking_id = ?1",
            params![tracking_id, to.as_str(), resolved_at, failure_reason],
        )?;

        if to.refunds() {
            credit_claimable(&tx, claim.user_id, claim.amount)?;
        } else if to == ClaimStatus::Completed {
            ensure_balance(&tx, claim.user_id)?;
            tx.execute(
                "UPDATE balances SET claimed = claimed + ?2 WHERE user_id = ?1",
                params![claim.user_id, claim.amount.to_db()?],
            )?;
        }

        let updated = load_claim(&tx, tracking_id)?
            .ok_or_else(|| StoreError::NotFound(tracking_id.to_string()))?;
        tx.commit()?;
        Ok(updated)
    }

    async fn claim_by_tracking_id(
        &self,
        tracking_id: &str,
    ) -> Result<Option<ClaimRequest>, StoreError> {
        let conn = self.conn.lock();
        load_claim(&conn, tracking_id)
    }

    async fn claims_for_user(
        &self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ClaimRequest>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM claim_requests WHERE user_id = ?1 ORDER BY submitted_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            CLAIM_COLUMNS
        ))?;
        let claims = stmt
            .query_map(params![user_id, limit, offset], claim_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(claims)
    }

    async fn claims_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClaimRequest>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM claim_requests WHERE user_id = ?1 AND submitted_at >= ?2 ORDER BY submitted_at, id",
            CLAIM_COLUMNS
        ))?;
        let claims = stmt
            .query_map(params![user_id, ms(since)], claim_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(claims)
    }

    async fn open_claim(&self, user_id: UserId) -> Result<Option<ClaimRequest>, StoreError> {
        let conn = self.conn.lock();
        load_open_claim(&conn, user_id)
    }

    async fn open_claims(&self) -> Result<Vec<ClaimRequest>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM claim_requests WHERE status IN ('PENDING', 'PROCESSING') ORDER BY submitted_at, id",
            CLAIM_COLUMNS
        ))?;
        let claims = stmt
            .query_map([], claim_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::BPS_ONE;
    use crate::models::{ClaimMode, NewClaim, ProcessingTier};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    fn new_session(user_id: UserId, start: DateTime<Utc>) -> NewSession {
        NewSession {
            user_id,
            start_time: start,
            end_time: start + Duration::hours(24),
            daily_rate: Amount::from_units(50),
            multiplier_bps: BPS_ONE,
        }
    }

    fn new_claim(user_id: UserId, amount: Amount, tracking_id: &str) -> NewClaim {
        NewClaim {
            user_id,
            mode: ClaimMode::Manual,
            amount,
            usd_value: amount.as_f64() * 0.1,
            processing_tier: ProcessingTier::Express,
            tracking_id: tracking_id.to_string(),
            submitted_at: t0(),
            processing_deadline: t0() + Duration::hours(6),
            risk_score: 0.1,
            user_reputation_score: 100,
            wallet_address: "UQBvW8Z5huBkMJYdnfAEM5JqTNkuWX3diqYENkWsIL0XggGG".to_string(),
            network: "ton".to_string(),
            requires_verification: false,
        }
    }

    /// Settle one full session, leaving 50 units claimable
    async fn seed_claimable(store: &SqliteStore, user_id: UserId) {
        let session = store.open_session(new_session(user_id, t0())).await.unwrap();
        store
            .rollover_session(session.id, t0() + Duration::hours(24), None)
            .await
            .unwrap();
        let balance = store.balance(user_id).await.unwrap();
        assert_eq!(balance.claimable, Amount::from_units(50));
    }

    #[tokio::test]
    async fn test_single_active_session() {
        let store = SqliteStore::in_memory().unwrap();
        store.open_session(new_session(1, t0())).await.unwrap();
        let err = store.open_session(new_session(1, t0())).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict(Conflict::ActiveSessionExists)
        ));
        // Other users are unaffected
        store.open_session(new_session(2, t0())).await.unwrap();
    }

    #[tokio::test]
    async fn test_rollover_settles_and_opens_successor() {
        let store = SqliteStore::in_memory().unwrap();
        let session = store.open_session(new_session(1, t0())).await.unwrap();
        let end = session.end_time;

        let outcome = store
            .rollover_session(session.id, end + Duration::hours(2), Some(new_session(1, end + Duration::hours(2))))
            .await
            .unwrap();

        assert_eq!(outcome.settled, Amount::from_units(50));
        assert_eq!(outcome.closed.status, SessionStatus::RolledOver);
        let next = outcome.successor.unwrap();
        assert_eq!(next.status, SessionStatus::Active);
        assert_eq!(store.active_session(1).await.unwrap().unwrap().id, next.id);
        assert_eq!(store.balance(1).await.unwrap().claimable, Amount::from_units(50));

        // The closed session cannot be settled twice
        let err = store.rollover_session(session.id, end, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(Conflict::SessionNotActive(_))));
    }

    #[tokio::test]
    async fn test_sweep_resets_baseline() {
        let store = SqliteStore::in_memory().unwrap();
        let session = store.open_session(new_session(1, t0())).await.unwrap();

        let (swept_session, swept) = store
            .sweep_accumulated(session.id, t0() + Duration::hours(12))
            .await
            .unwrap();
        assert_eq!(swept, Amount::from_units(25));
        assert_eq!(swept_session.carried, Amount::ZERO);
        assert_eq!(swept_session.accumulated_at(t0() + Duration::hours(12)), Amount::ZERO);
        assert_eq!(store.balance(1).await.unwrap().claimable, Amount::from_units(25));
    }

    #[tokio::test]
    async fn test_rate_change_is_prospective() {
        let store = SqliteStore::in_memory().unwrap();
        let session = store.open_session(new_session(1, t0())).await.unwrap();

        let updated = store
            .update_session_rate(session.id, t0() + Duration::hours(12), 2 * BPS_ONE)
            .await
            .unwrap();
        assert_eq!(updated.carried, Amount::from_units(25));
        // 12h at 1x + 12h at 2x
        assert_eq!(updated.accumulated_at(t0() + Duration::hours(24)), Amount::from_units(75));
    }

    #[tokio::test]
    async fn test_commit_claim_debits_and_enforces_single_open_claim() {
        let store = SqliteStore::in_memory().unwrap();
        seed_claimable(&store, 1).await;

        let claim = store
            .commit_claim(ClaimCommit {
                claim: new_claim(1, Amount::from_units(20), "RZC-A"),
                sweep: None,
                record_manual_claim: true,
            })
            .await
            .unwrap();
        assert_eq!(claim.status, ClaimStatus::Pending);

        let balance = store.balance(1).await.unwrap();
        assert_eq!(balance.claimable, Amount::from_units(30));
        assert_eq!(balance.last_manual_claim_at, Some(t0()));

        let err = store
            .commit_claim(ClaimCommit {
                claim: new_claim(1, Amount::from_units(5), "RZC-B"),
                sweep: None,
                record_manual_claim: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(Conflict::OpenClaimExists(ref id)) if id == "RZC-A"));
        // Rejected commit left the balance alone
        assert_eq!(store.balance(1).await.unwrap().claimable, Amount::from_units(30));
    }

    #[tokio::test]
    async fn test_commit_claim_rolls_back_on_insufficient_balance() {
        let store = SqliteStore::in_memory().unwrap();
        let session = store.open_session(new_session(1, t0())).await.unwrap();

        let err = store
            .commit_claim(ClaimCommit {
                claim: new_claim(1, Amount::from_units(40), "RZC-A"),
                sweep: Some(Sweep {
                    session_id: session.id,
                    at: t0() + Duration::hours(12),
                }),
                record_manual_claim: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict(Conflict::InsufficientBalance { .. })
        ));

        // The sweep was rolled back together with the failed debit
        let balance = store.balance(1).await.unwrap();
        assert_eq!(balance.claimable, Amount::ZERO);
        let session = store.active_session(1).await.unwrap().unwrap();
        assert_eq!(session.accrual_anchor, t0());
    }

    #[tokio::test]
    async fn test_transition_refunds_and_settles() {
        let store = SqliteStore::in_memory().unwrap();
        seed_claimable(&store, 1).await;

        store
            .commit_claim(ClaimCommit {
                claim: new_claim(1, Amount::from_units(20), "RZC-A"),
                sweep: None,
                record_manual_claim: false,
            })
            .await
            .unwrap();
        let cancelled = store
            .transition_claim("RZC-A", ClaimStatus::Cancelled, t0(), None)
            .await
            .unwrap();
        assert_eq!(cancelled.resolved_at, Some(t0()));
        assert_eq!(store.balance(1).await.unwrap().claimable, Amount::from_units(50));

        store
            .commit_claim(ClaimCommit {
                claim: new_claim(1, Amount::from_units(10), "RZC-B"),
                sweep: None,
                record_manual_claim: false,
            })
            .await
            .unwrap();
        store
            .transition_claim("RZC-B", ClaimStatus::Processing, t0(), None)
            .await
            .unwrap();
        store
            .transition_claim("RZC-B", ClaimStatus::Completed, t0(), None)
            .await
            .unwrap();
        let balance = store.balance(1).await.unwrap();
        assert_eq!(balance.claimable, Amount::from_units(40));
        assert_eq!(balance.claimed, Amount::from_units(10));

        let err = store
            .transition_claim("RZC-B", ClaimStatus::Cancelled, t0(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(Conflict::StaleStatus { .. })));
    }

    #[tokio::test]
    async fn test_claim_queries() {
        let store = SqliteStore::in_memory().unwrap();
        seed_claimable(&store, 1).await;
        store
            .commit_claim(ClaimCommit {
                claim: new_claim(1, Amount::from_units(5), "RZC-A"),
                sweep: None,
                record_manual_claim: false,
            })
            .await
            .unwrap();

        assert_eq!(store.open_claims().await.unwrap().len(), 1);
        assert_eq!(store.open_claim(1).await.unwrap().unwrap().tracking_id, "RZC-A");
        assert_eq!(store.claims_since(1, t0()).await.unwrap().len(), 1);
        assert!(store
            .claims_since(1, t0() + Duration::seconds(1))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.claims_for_user(1, 10, 0).await.unwrap().len(), 1);
        assert!(store.claims_for_user(1, 10, 1).await.unwrap().is_empty());
        assert!(store.claim_by_tracking_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_stats_and_history() {
        let store = SqliteStore::in_memory().unwrap();
        let stats = store.session_stats(1).await.unwrap();
        assert_eq!(stats, SessionStats::default());

        let first = store.open_session(new_session(1, t0())).await.unwrap();
        let later = t0() + Duration::hours(24);
        store
            .rollover_session(first.id, later, Some(new_session(1, later)))
            .await
            .unwrap();

        let stats = store.session_stats(1).await.unwrap();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.first_started_at, Some(t0()));

        let history = store.session_history(1, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].start_time, later);
        assert_eq!(store.expired_sessions(later).await.unwrap().len(), 0);
        assert_eq!(
            store.expired_sessions(later + Duration::hours(24)).await.unwrap().len(),
            1
        );
    }
}
