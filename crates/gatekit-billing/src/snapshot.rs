//! Subscription snapshots: the normalized projection of a billing record.

use chrono::{DateTime, Utc};
use gatekit_storage::SubscriptionRow;
use serde::{Deserialize, Serialize};

use crate::FetchError;

/// Subscription status as seen by the access engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// No live subscription (never paid, payment pending, or lapsed after period end)
    None,

    /// Provider-side trial period
    Trialing,

    /// Active subscription
    Active,

    /// Canceled or lapsed billing
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::Canceled => "canceled",
        }
    }

    /// Active and trialing subscriptions grant access outright.
    pub fn grants_access(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "trialing" => Ok(Self::Trialing),
            "active" => Ok(Self::Active),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("Unknown subscription status: {}", s)),
        }
    }
}

/// Map a billing provider status string onto `(status, pending)`.
///
/// `incomplete` is the only pending state: the first payment has not settled yet.
pub fn normalize_provider_status(raw: &str) -> Result<(SubscriptionStatus, bool), String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "active" => Ok((SubscriptionStatus::Active, false)),
        "trialing" => Ok((SubscriptionStatus::Trialing, false)),
        "canceled" | "cancelled" => Ok((SubscriptionStatus::Canceled, false)),
        "past_due" | "unpaid" | "incomplete_expired" | "paused" => {
            Ok((SubscriptionStatus::Canceled, false))
        }
        "incomplete" => Ok((SubscriptionStatus::None, true)),
        "" | "none" => Ok((SubscriptionStatus::None, false)),
        other => Err(format!("unknown provider status '{}'", other)),
    }
}

/// Point-in-time copy of a user's subscription, fetched from the billing system of record.
///
/// Snapshots are only built from a fetched record and are replaced whole on
/// every successful fetch; nothing patches individual fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub status: SubscriptionStatus,

    /// The provider has not settled this subscription yet
    pub pending: bool,

    pub current_period_end: DateTime<Utc>,

    /// Whether the subscription will cancel at period end
    pub cancel_at_period_end: bool,

    pub stripe_subscription_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl SubscriptionSnapshot {
    /// Build a snapshot from a raw record, rejecting statuses we can't interpret.
    pub fn from_row(row: &SubscriptionRow) -> Result<Self, FetchError> {
        let (status, pending) =
            normalize_provider_status(&row.status).map_err(FetchError::Malformed)?;

        Ok(Self {
            status,
            pending,
            current_period_end: row.current_period_end,
            cancel_at_period_end: row.cancel_at_period_end,
            stripe_subscription_id: row.stripe_subscription_id.clone(),
            created_at: row.created_at,
        })
    }

    /// Status after applying the period end: a scheduled cancellation whose
    /// period has passed reverts to `None`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        if self.has_lapsed(now) {
            SubscriptionStatus::None
        } else {
            self.status
        }
    }

    /// Scheduled to cancel and the paid period is over.
    pub fn has_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.cancel_at_period_end && now >= self.current_period_end
    }

    /// Scheduled to cancel but still inside the paid period.
    pub fn in_grace_period(&self, now: DateTime<Utc>) -> bool {
        self.cancel_at_period_end && now < self.current_period_end
    }
}
