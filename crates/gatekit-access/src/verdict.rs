use chrono::{DateTime, Utc};
use gatekit_billing::{SubscriptionSnapshot, SubscriptionStatus};
use gatekit_storage::User;
use serde::{Deserialize, Serialize};

use crate::TrialStatus;

/// Why access was granted or denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    Subscribed,
    Trialing,
    Expired,
    Unauthenticated,
}

impl std::fmt::Display for AccessReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Subscribed => "subscribed",
            Self::Trialing => "trialing",
            Self::Expired => "expired",
            Self::Unauthenticated => "unauthenticated",
        })
    }
}

/// Single output of the decision engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessVerdict {
    pub allowed: bool,
    pub reason: AccessReason,
    pub show_upgrade_cta: bool,
}

impl AccessVerdict {
    fn new(allowed: bool, reason: AccessReason, show_upgrade_cta: bool) -> Self {
        Self {
            allowed,
            reason,
            show_upgrade_cta,
        }
    }
}

/// Decide whether `user` may access a gated surface.
///
/// Rules are evaluated top to bottom and the first match wins:
///
/// 1. no user: denied, unauthenticated
/// 2. snapshot effectively active or trialing: allowed, subscribed
/// 3. snapshot canceled but still inside a paid period scheduled to end: allowed, subscribed, upsell
/// 4. no snapshot at all and the trial is active: allowed, trialing, upsell
/// 5. otherwise: denied, expired, upsell
///
/// Subscription state always wins over trial state. A snapshot that exists but
/// grants nothing (pending payment, lapsed) does not fall back to the trial.
pub fn decide(
    user: Option<&User>,
    snapshot: Option<&SubscriptionSnapshot>,
    trial: &TrialStatus,
    now: DateTime<Utc>,
) -> AccessVerdict {
    if user.is_none() {
        return AccessVerdict::new(false, AccessReason::Unauthenticated, false);
    }

    match snapshot {
        Some(s) if s.effective_status(now).grants_access() => {
            AccessVerdict::new(true, AccessReason::Subscribed, false)
        }
        Some(s) if s.status == SubscriptionStatus::Canceled && s.in_grace_period(now) => {
            AccessVerdict::new(true, AccessReason::Subscribed, true)
        }
        None if trial.is_active => AccessVerdict::new(true, AccessReason::Trialing, true),
        _ => AccessVerdict::new(false, AccessReason::Expired, true),
    }
}
