//! Fraud-risk scoring for claim submissions
//!
//! Four independently capped factors are summed and the total is capped at
//! 1.0:
//!
//! | factor               | max |
//! |----------------------|-----|
//! | claims in last 24h   | 0.3 |
//! | size vs user limits  | 0.3 |
//! | low reputation       | 0.2 |
//! | burst pattern        | 0.2 |

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::models::{UserId, UserReputation};
use crate::store::RewardStore;

/// Score used whenever the inputs cannot be gathered
pub const FALLBACK_RISK: f64 = 0.5;

/// Trailing window of claim history considered by the scorer
pub const HISTORY_WINDOW_HOURS: i64 = 24;

// Factors are counted in tenths so that the summed score lands exactly on the
// configured thresholds.

fn recency_factor(claims_in_window: usize) -> u8 {
    match claims_in_window {
        n if n > 5 => 3,
        n if n > 3 => 2,
        n if n > 1 => 1,
        _ => 0,
    }
}

fn size_factor(usd_value: f64, reputation: &UserReputation) -> u8 {
    if usd_value > reputation.express_limit_usd * 0.8 {
        3
    } else if usd_value > reputation.instant_limit_usd * 2.0 {
        2
    } else {
        0
    }
}

fn reputation_factor(score: i32) -> u8 {
    if score < 200 {
        2
    } else if score < 400 {
        1
    } else {
        0
    }
}

/// Mean gap between consecutive submissions; needs at least two claims.
fn burst_factor(submitted: &[DateTime<Utc>]) -> u8 {
    if submitted.len() < 2 {
        return 0;
    }
    let mut sorted = submitted.to_vec();
    sorted.sort();
    let gaps: i64 = sorted
        .windows(2)
        .map(|w| (w[1] - w[0]).num_milliseconds())
        .sum();
    let mean_ms = gaps / (sorted.len() as i64 - 1);

    if mean_ms < Duration::hours(1).num_milliseconds() {
        2
    } else if mean_ms < Duration::hours(6).num_milliseconds() {
        1
    } else {
        0
    }
}

/// Score a candidate claim against the user's recent submissions.
pub fn score(usd_value: f64, recent_submissions: &[DateTime<Utc>], reputation: &UserReputation) -> f64 {
    if !usd_value.is_finite() {
        return FALLBACK_RISK;
    }
    let tenths = recency_factor(recent_submissions.len())
        + size_factor(usd_value, reputation)
        + reputation_factor(reputation.score)
        + burst_factor(recent_submissions);
    f64::from(tenths.min(10)) / 10.0
}

/// Load the trailing history and score; any failure yields [`FALLBACK_RISK`].
pub async fn assess(
    store: &dyn RewardStore,
    user_id: UserId,
    usd_value: f64,
    reputation: Option<&UserReputation>,
    now: DateTime<Utc>,
) -> f64 {
    let Some(reputation) = reputation else {
        return FALLBACK_RISK;
    };
    let since = now - Duration::hours(HISTORY_WINDOW_HOURS);
    match store.claims_since(user_id, since).await {
        Ok(history) => {
            let submitted: Vec<_> = history.iter().map(|c| c.submitted_at).collect();
            let risk = score(usd_value, &submitted, reputation);
            debug!(
                "Risk for user {}: {:.2} ({} claims in window, ${:.2})",
                user_id,
                risk,
                submitted.len(),
                usd_value
            );
            risk
        }
        Err(e) => {
            warn!("Risk history unavailable for user {}: {}", user_id, e);
            FALLBACK_RISK
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProcessingTier, RecommendedAction, RiskLevel};

    fn reputation(score: i32) -> UserReputation {
        UserReputation {
            user_id: 1,
            score,
            instant_limit_usd: 50.0,
            express_limit_usd: 500.0,
            risk_level: RiskLevel::Low,
        }
    }

    fn spaced(now: DateTime<Utc>, count: usize, gap: Duration) -> Vec<DateTime<Utc>> {
        (0..count).map(|i| now - gap * i as i32).collect()
    }

    #[test]
    fn test_clean_history_scores_zero() {
        assert_eq!(score(10.0, &[], &reputation(500)), 0.0);
    }

    #[test]
    fn test_new_user_carries_reputation_factor() {
        // Score 100 is below 200
        assert!((score(10.0, &[], &reputation(100)) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_size_factor_thresholds() {
        let rep = reputation(500);
        assert!((score(401.0, &[], &rep) - 0.3).abs() < 1e-9);
        assert!((score(101.0, &[], &rep) - 0.2).abs() < 1e-9);
        assert_eq!(score(100.0, &[], &rep), 0.0);
    }

    #[test]
    fn test_recency_and_burst() {
        let now = Utc::now();
        let rep = reputation(500);
        // Two claims 30 minutes apart: recency 0.1, burst 0.2
        let history = spaced(now, 2, Duration::minutes(30));
        assert!((score(1.0, &history, &rep) - 0.3).abs() < 1e-9);

        // Four claims 2h apart: recency 0.2, burst 0.1
        let history = spaced(now, 4, Duration::hours(2));
        assert!((score(1.0, &history, &rep) - 0.3).abs() < 1e-9);

        // One claim: no recency, no burst
        assert_eq!(score(1.0, &spaced(now, 1, Duration::hours(1)), &rep), 0.0);
    }

    #[test]
    fn test_threshold_sums_are_exact() {
        let now = Utc::now();
        let rep = reputation(150);
        let spread = [now - Duration::hours(14), now - Duration::hours(7)];
        let close = [now - Duration::hours(4), now - Duration::hours(2)];
        let burst = [now - Duration::minutes(60), now - Duration::minutes(30)];

        // recency 0.1 + size 0.3 + reputation 0.2, then burst 0.0 / 0.1 / 0.2
        let at_verification = score(450.0, &spread, &rep);
        let at_review = score(450.0, &close, &rep);
        let at_rejection = score(450.0, &burst, &rep);
        assert_eq!(at_verification, 0.6);
        assert_eq!(at_review, 0.7);
        assert_eq!(at_rejection, 0.8);

        // Inclusive upper bounds: exactly 0.6 is not flagged, exactly 0.8 is not rejected
        assert!(at_verification <= 0.6);
        assert!(at_rejection <= 0.8);
        assert_eq!(
            RecommendedAction::for_claim(ProcessingTier::Express, at_review),
            RecommendedAction::AutoApproveAfterDelay
        );
        assert_eq!(
            RecommendedAction::for_claim(ProcessingTier::Express, at_rejection),
            RecommendedAction::HighRiskReview
        );
    }

    #[test]
    fn test_score_is_capped() {
        let now = Utc::now();
        let history = spaced(now, 8, Duration::minutes(1));
        let risk = score(10_000.0, &history, &reputation(0));
        assert_eq!(risk, 1.0);
    }

    #[test]
    fn test_bounds_over_many_inputs() {
        let now = Utc::now();
        for count in 0..10 {
            for usd in [0.0, 10.0, 99.0, 450.0, 1e9] {
                for rep in [0, 150, 300, 900] {
                    let risk = score(usd, &spaced(now, count, Duration::minutes(20)), &reputation(rep));
                    assert!((0.0..=1.0).contains(&risk));
                }
            }
        }
        assert_eq!(score(f64::NAN, &[], &reputation(100)), FALLBACK_RISK);
    }

    #[tokio::test]
    async fn test_missing_reputation_falls_back() {
        let store = crate::storage::SqliteStore::in_memory().unwrap();
        assert_eq!(assess(&store, 1, 10.0, None, Utc::now()).await, FALLBACK_RISK);
        let rep = reputation(500);
        assert_eq!(assess(&store, 1, 10.0, Some(&rep), Utc::now()).await, 0.0);
    }
}
