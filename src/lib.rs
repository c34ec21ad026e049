//! Mining Rewards - Session accrual and tiered claim processing
//!
//! Users of the mining mini-app run time-boxed mining sessions that accrue
//! currency at a fixed daily rate. Accrued currency is settled into a
//! claimable balance and withdrawn through claims.
//!
//! # How it works
//!
//! 1. A user starts a session (24h, or 48h with the extended entitlement)
//! 2. The accumulated amount is a pure function of the session and the time
//! 3. When the session expires it is settled into `claimable` and restarted
//! 4. Claims pass cooldown, balance, daily-limit, open-claim, wallet and
//!    risk checks, then land in a processing tier by USD value
//! 5. Instant claims settle immediately; Express claims are auto-approved
//!    after a delay; Standard claims wait for review
//!
//! # Balance buckets
//!
//! - `accumulating`: derived from the active session, never stored
//! - `claimable`: settled currency available for claims
//! - `claimed`: currency paid out by completed claims

pub mod amount;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod models;
pub mod pg_storage;
pub mod pricing;
pub mod processor;
pub mod reputation;
pub mod risk;
pub mod server;
pub mod session;
pub mod storage;
pub mod store;
pub mod tier;
pub mod wallet;

pub use amount::Amount;
pub use config::{Config, ConfigHandle};
pub use error::{ClaimError, RejectionReason, SessionError, StoreError};
pub use ledger::{ClaimLedger, ClaimSubmission, Settlement};
pub use pg_storage::PgStore;
pub use session::{MiningEngine, MiningEvent, SessionLength};
pub use storage::SqliteStore;
pub use store::RewardStore;
