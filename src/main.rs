//! Mining Rewards Server
//!
//! Session accrual and tiered claim processing

use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use mining_rewards::clock::SystemClock;
use mining_rewards::config::{Config, ConfigHandle};
use mining_rewards::ledger::{ClaimLedger, LoggingSettlement};
use mining_rewards::locks::UserLocks;
use mining_rewards::pricing::ConfiguredRate;
use mining_rewards::processor::Reconciler;
use mining_rewards::server::{run_server, AppState};
use mining_rewards::session::{MiningEngine, SessionQuota};
use mining_rewards::store::RewardStore;
use mining_rewards::{PgStore, SqliteStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Mining Rewards Server");

    let path = Config::default_path();
    let config = Config::load_from(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    let handle = ConfigHandle::with_path(config.clone(), path);

    // PostgreSQL when DATABASE_URL is set, SQLite otherwise
    let store: Arc<dyn RewardStore> = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => {
            let store = PgStore::new(&url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            info!("PostgreSQL storage initialized");
            Arc::new(store)
        }
        _ => {
            let store = SqliteStore::new(&config.database.sqlite_path)
                .context("Failed to open SQLite store")?;
            info!("SQLite storage initialized at {}", config.database.sqlite_path);
            Arc::new(store)
        }
    };

    let clock = Arc::new(SystemClock);
    let locks = Arc::new(UserLocks::new());

    let mut engine = MiningEngine::new(store.clone(), handle.clone(), clock.clone(), locks.clone());
    if let (Some(days), Some(max_sessions)) =
        (config.mining.quota_period_days, config.mining.quota_max_sessions)
    {
        info!(
            "Free mining quota: {} sessions within {} days",
            max_sessions, days
        );
        engine = engine.with_eligibility(Arc::new(SessionQuota {
            period: Duration::days(days),
            max_sessions,
        }));
    }
    let engine = Arc::new(engine);

    let ledger = Arc::new(ClaimLedger::new(
        store,
        handle.clone(),
        clock,
        locks.clone(),
        Arc::new(ConfiguredRate::new(handle.clone())),
        Arc::new(LoggingSettlement),
    ));

    // Start background reconciliation (rollover, auto-claim, approvals)
    let reconciler = Arc::new(Reconciler::new(
        engine.clone(),
        ledger.clone(),
        locks,
        handle.clone(),
    ));
    tokio::spawn(reconciler.run_loop());

    let state = Arc::new(AppState {
        engine,
        ledger,
        config: handle,
        started_at: std::time::Instant::now(),
    });

    run_server(&config.host(), config.port(), state).await?;

    Ok(())
}
