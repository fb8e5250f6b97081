//! Subscription rows as stored by the hosted backend.

use chrono::{DateTime, Utc};

use super::{SubscriptionId, UserId};

/// Subscription record.
///
/// `status` is the billing provider's raw status string; gatekit-billing
/// normalizes it when building a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct SubscriptionRow {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub stripe_subscription_id: Option<String>,
    pub status: String,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for writing a user's subscription row
#[derive(Clone, Debug)]
pub struct UpsertSubscriptionParams {
    pub user_id: UserId,
    pub stripe_subscription_id: Option<String>,
    pub status: String,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
}
