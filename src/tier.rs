//! Processing tier classification

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::{ReputationConfig, TierConfig};
use crate::models::{ProcessingTier, UserReputation};
use crate::reputation::ReputationPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierDecision {
    pub tier: ProcessingTier,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TierClassifier {
    instant_threshold_usd: f64,
    express_threshold_usd: f64,
    policy: ReputationPolicy,
    express_deadline: Duration,
    standard_deadline: Duration,
}

impl TierClassifier {
    pub fn new(tiers: &TierConfig, reputation: &ReputationConfig) -> Self {
        Self {
            instant_threshold_usd: tiers.instant_threshold_usd,
            express_threshold_usd: tiers.express_threshold_usd,
            policy: ReputationPolicy::new(reputation.clone()),
            express_deadline: Duration::hours(tiers.express_deadline_hours),
            standard_deadline: Duration::hours(tiers.standard_deadline_hours),
        }
    }

    pub fn deadline(&self, tier: ProcessingTier, now: DateTime<Utc>) -> DateTime<Utc> {
        match tier {
            ProcessingTier::Instant => now,
            ProcessingTier::Express => now + self.express_deadline,
            ProcessingTier::Standard => now + self.standard_deadline,
        }
    }

    /// Without a trustworthy reputation or a usable value the claim is
    /// classified `Standard`.
    pub fn classify(
        &self,
        usd_value: f64,
        reputation: Option<&UserReputation>,
        now: DateTime<Utc>,
    ) -> TierDecision {
        let tier = match reputation {
            Some(rep) if usd_value.is_finite() && usd_value >= 0.0 => self.tier_for(usd_value, rep),
            _ => ProcessingTier::Standard,
        };
        TierDecision {
            tier,
            deadline: self.deadline(tier, now),
        }
    }

    fn tier_for(&self, usd_value: f64, reputation: &UserReputation) -> ProcessingTier {
        // Elite users get their own, usually higher, instant limit
        if self.policy.is_elite(reputation) && usd_value < reputation.instant_limit_usd {
            return ProcessingTier::Instant;
        }
        if usd_value < self.instant_threshold_usd {
            ProcessingTier::Instant
        } else if usd_value < self.express_threshold_usd {
            ProcessingTier::Express
        } else {
            ProcessingTier::Standard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::RiskLevel;

    fn classifier() -> TierClassifier {
        let config = Config::default();
        TierClassifier::new(&config.tiers, &config.reputation)
    }

    fn reputation(score: i32, instant_limit_usd: f64) -> UserReputation {
        UserReputation {
            user_id: 1,
            score,
            instant_limit_usd,
            express_limit_usd: 500.0,
            risk_level: RiskLevel::Low,
        }
    }

    #[test]
    fn test_small_claim_is_instant() {
        let now = Utc::now();
        let decision = classifier().classify(40.0, Some(&reputation(100, 50.0)), now);
        assert_eq!(decision.tier, ProcessingTier::Instant);
        assert_eq!(decision.deadline, now);
    }

    #[test]
    fn test_large_claim_below_elite_is_standard() {
        let now = Utc::now();
        let decision = classifier().classify(520.0, Some(&reputation(700, 1000.0)), now);
        assert_eq!(decision.tier, ProcessingTier::Standard);
        assert_eq!(decision.deadline, now + Duration::hours(24));
    }

    #[test]
    fn test_express_deadline() {
        let now = Utc::now();
        let decision = classifier().classify(120.0, Some(&reputation(100, 50.0)), now);
        assert_eq!(decision.tier, ProcessingTier::Express);
        assert_eq!(decision.deadline, now + Duration::hours(6));
    }

    #[test]
    fn test_elite_limit() {
        let now = Utc::now();
        let c = classifier();
        assert_eq!(
            c.classify(520.0, Some(&reputation(750, 1000.0)), now).tier,
            ProcessingTier::Instant
        );
        // Above their own limit the global thresholds apply
        assert_eq!(
            c.classify(1500.0, Some(&reputation(900, 1000.0)), now).tier,
            ProcessingTier::Standard
        );
    }

    #[test]
    fn test_missing_inputs_default_to_standard() {
        let now = Utc::now();
        let c = classifier();
        assert_eq!(c.classify(10.0, None, now).tier, ProcessingTier::Standard);
        assert_eq!(
            c.classify(f64::NAN, Some(&reputation(100, 50.0)), now).tier,
            ProcessingTier::Standard
        );
    }

    #[test]
    fn test_tier_is_monotone_in_value() {
        let now = Utc::now();
        let c = classifier();
        for rep in [reputation(100, 50.0), reputation(800, 300.0), reputation(800, 900.0)] {
            let mut previous = ProcessingTier::Instant;
            for usd in (0..2000).map(|v| v as f64) {
                let tier = c.classify(usd, Some(&rep), now).tier;
                assert!(tier >= previous, "tier dropped at ${} for score {}", usd, rep.score);
                previous = tier;
            }
        }
    }
}
