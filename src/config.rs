//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - Server binding settings
//! - Mining rates and session lengths
//! - Claim limits, cooldown and tier thresholds
//! - Reputation defaults and the exchange rate
//!
//! The claim-side sections are hot-reloadable through [`ConfigHandle`].

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::amount::Amount;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub mining: MiningConfig,
    pub claims: ClaimsConfig,
    pub tiers: TierConfig,
    pub reputation: ReputationConfig,
    pub exchange: ExchangeConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration. `DATABASE_URL` takes precedence and selects
/// PostgreSQL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> String {
    "mining.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Units earned per 24h at 1x
    pub daily_rate: Amount,
    pub session_hours: i64,
    pub extended_session_hours: i64,
    pub reconcile_interval_secs: u64,
    #[serde(default)]
    pub auto_claim_threshold: Option<Amount>,
    /// Free-mining period length, counted from a user's first session
    #[serde(default)]
    pub quota_period_days: Option<i64>,
    #[serde(default)]
    pub quota_max_sessions: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimsConfig {
    pub daily_claim_limit: u32,
    pub unestablished_daily_claim_limit: u32,
    pub cooldown_secs: i64,
    pub tracking_prefix: String,
    pub express_auto_approve_hours: i64,
    pub high_risk_threshold: f64,
    pub verification_risk_threshold: f64,
    #[serde(default)]
    pub day_boundary_offset_secs: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub instant_threshold_usd: f64,
    pub express_threshold_usd: f64,
    pub express_deadline_hours: i64,
    pub standard_deadline_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    pub initial_score: i32,
    /// Score at which the per-user instant limit replaces the global one
    pub elite_score: i32,
    /// Users below this score get the reduced daily claim limit
    pub established_score: i32,
    pub default_instant_limit_usd: f64,
    pub default_express_limit_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub usd_per_unit: f64,
}

impl Config {
    /// `MINING_CONFIG`, or config.toml in the working directory
    pub fn default_path() -> PathBuf {
        std::env::var("MINING_CONFIG")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let config: Config = if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            // Use embedded default config
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mining.session_hours <= 0 || self.mining.extended_session_hours <= 0 {
            anyhow::bail!("session lengths must be positive");
        }
        if self.tiers.instant_threshold_usd > self.tiers.express_threshold_usd {
            anyhow::bail!("instant threshold must not exceed express threshold");
        }
        if !(0.0..=1.0).contains(&self.claims.high_risk_threshold)
            || !(0.0..=1.0).contains(&self.claims.verification_risk_threshold)
        {
            anyhow::bail!("risk thresholds must lie in [0, 1]");
        }
        if self.claims.verification_risk_threshold > self.claims.high_risk_threshold {
            anyhow::bail!("verification risk threshold must not exceed the high risk threshold");
        }
        if self.exchange.usd_per_unit < 0.0 || !self.exchange.usd_per_unit.is_finite() {
            anyhow::bail!("exchange rate must be a non-negative number");
        }
        Ok(())
    }

    /// Bind host, `MINING_HOST` takes precedence
    pub fn host(&self) -> String {
        match std::env::var("MINING_HOST") {
            Ok(host) if !host.is_empty() => host,
            _ => self.server.host.clone(),
        }
    }

    /// Bind port, `MINING_PORT` takes precedence
    pub fn port(&self) -> u16 {
        std::env::var("MINING_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        // The embedded file ships with the crate; the literal below only
        // matters if someone breaks it.
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            mining: MiningConfig {
                daily_rate: Amount::from_units(50),
                session_hours: 24,
                extended_session_hours: 48,
                reconcile_interval_secs: 60,
                auto_claim_threshold: None,
                quota_period_days: None,
                quota_max_sessions: None,
            },
            claims: ClaimsConfig {
                daily_claim_limit: 10,
                unestablished_daily_claim_limit: 5,
                cooldown_secs: 1800,
                tracking_prefix: "RZC".to_string(),
                express_auto_approve_hours: 6,
                high_risk_threshold: 0.8,
                verification_risk_threshold: 0.6,
                day_boundary_offset_secs: 0,
            },
            tiers: TierConfig {
                instant_threshold_usd: 50.0,
                express_threshold_usd: 500.0,
                express_deadline_hours: 6,
                standard_deadline_hours: 24,
            },
            reputation: ReputationConfig {
                initial_score: 100,
                elite_score: 750,
                established_score: 100,
                default_instant_limit_usd: 50.0,
                default_express_limit_usd: 500.0,
            },
            exchange: ExchangeConfig { usd_per_unit: 0.1 },
        })
    }
}

// ============================================================================
// HOT RELOAD
// ============================================================================

/// Shared, reloadable configuration. Readers take a snapshot per request.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Config>>,
    path: Option<PathBuf>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path: None,
        }
    }

    /// Handle that reloads from `path`
    pub fn with_path(config: Config, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path: Some(path.into()),
        }
    }

    pub fn snapshot(&self) -> Config {
        self.inner.read().clone()
    }

    /// Re-read the backing file. Server and database sections are bound at
    /// startup and stay as they were.
    pub fn reload(&self) -> Result<Config> {
        let path = self.path.clone().unwrap_or_else(Config::default_path);
        let fresh = Config::load_from(&path)?;

        let mut current = self.inner.write();
        current.mining.auto_claim_threshold = fresh.mining.auto_claim_threshold;
        current.claims = fresh.claims;
        current.tiers = fresh.tiers;
        current.reputation = fresh.reputation;
        current.exchange = fresh.exchange;
        Ok(current.clone())
    }

    /// Replace the live configuration (admin tooling and tests)
    pub fn replace(&self, config: Config) {
        *self.inner.write() = config;
    }
}

impl std::fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
