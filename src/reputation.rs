//! Reputation lookup and the limits derived from it
//!
//! Reputation is owned by an external adjustment process; this module only
//! reads it, re-reading on every claim. A user without a record gets one
//! created with the configured defaults. When the lookup fails the claim
//! proceeds with conservative defaults instead of aborting.

use tracing::{info, warn};

use crate::config::{ClaimsConfig, ReputationConfig};
use crate::models::{RiskLevel, UserId, UserReputation};
use crate::store::RewardStore;

/// Reputation as seen by one claim
#[derive(Debug, Clone, PartialEq)]
pub struct ReputationLookup {
    pub reputation: UserReputation,
    /// The store could not be read and `reputation` holds fallback values
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct ReputationPolicy {
    config: ReputationConfig,
}

impl ReputationPolicy {
    pub fn new(config: ReputationConfig) -> Self {
        Self { config }
    }

    /// Record given to a user on their first claim
    pub fn new_user(&self, user_id: UserId) -> UserReputation {
        UserReputation {
            user_id,
            score: self.config.initial_score,
            instant_limit_usd: self.config.default_instant_limit_usd,
            express_limit_usd: self.config.default_express_limit_usd,
            risk_level: RiskLevel::Low,
        }
    }

    fn fallback(&self, user_id: UserId) -> UserReputation {
        UserReputation {
            risk_level: RiskLevel::Medium,
            ..self.new_user(user_id)
        }
    }

    pub async fn load(&self, store: &dyn RewardStore, user_id: UserId) -> ReputationLookup {
        match store.reputation(user_id).await {
            Ok(Some(reputation)) => ReputationLookup {
                reputation,
                degraded: false,
            },
            Ok(None) => {
                let defaults = self.new_user(user_id);
                // A record written concurrently by someone else wins over the defaults
                let reputation = match store.insert_reputation_if_absent(&defaults).await {
                    Ok(stored) => {
                        info!("Created default reputation for user {}", user_id);
                        stored
                    }
                    Err(e) => {
                        // Defaults are still valid for this claim; creation is retried next time
                        warn!("Failed to create reputation for user {}: {}", user_id, e);
                        defaults
                    }
                };
                ReputationLookup {
                    reputation,
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(
                    "Reputation lookup failed for user {}, using conservative defaults: {}",
                    user_id, e
                );
                ReputationLookup {
                    reputation: self.fallback(user_id),
                    degraded: true,
                }
            }
        }
    }

    pub fn is_elite(&self, reputation: &UserReputation) -> bool {
        reputation.score >= self.config.elite_score
    }

    pub fn is_established(&self, reputation: &UserReputation) -> bool {
        reputation.score >= self.config.established_score
    }

    /// Claims allowed per day. Unestablished users and failed lookups get
    /// the reduced limit.
    pub fn daily_limit(&self, lookup: &ReputationLookup, claims: &ClaimsConfig) -> u32 {
        if lookup.degraded || !self.is_established(&lookup.reputation) {
            claims.unestablished_daily_claim_limit
        } else {
            claims.daily_claim_limit
        }
    }
}
