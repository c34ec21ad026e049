//! Minimum interval between manual claims

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::RejectionReason;
use crate::models::ClaimKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CooldownStatus {
    pub allowed: bool,
    pub remaining_secs: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct CooldownGuard {
    window: Duration,
}

impl CooldownGuard {
    pub fn new(window_secs: i64) -> Self {
        Self {
            window: Duration::seconds(window_secs.max(0)),
        }
    }

    /// Remaining wait is rounded up to whole seconds so a caller that sleeps
    /// for `remaining_secs` is never early.
    pub fn can_claim(&self, last_claim_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CooldownStatus {
        let Some(last) = last_claim_at else {
            return CooldownStatus {
                allowed: true,
                remaining_secs: 0,
            };
        };

        let remaining_ms = (last + self.window - now).num_milliseconds();
        if remaining_ms <= 0 {
            CooldownStatus {
                allowed: true,
                remaining_secs: 0,
            }
        } else {
            CooldownStatus {
                allowed: false,
                remaining_secs: (remaining_ms + 999) / 1000,
            }
        }
    }

    /// Gate a claim submission. Bulk claims are never held back.
    pub fn check(
        &self,
        kind: &ClaimKind,
        last_manual_claim_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), RejectionReason> {
        if let ClaimKind::Bulk = kind {
            return Ok(());
        }
        let status = self.can_claim(last_manual_claim_at, now);
        if status.allowed {
            Ok(())
        } else {
            Err(RejectionReason::CooldownActive {
                remaining_secs: status.remaining_secs,
            })
        }
    }
}
