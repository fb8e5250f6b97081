//! Per-user preference types.

use chrono::{DateTime, Utc};

use super::UserId;

/// User preferences record
#[derive(Clone, Debug, PartialEq)]
pub struct UserPreferences {
    pub user_id: UserId,
    pub has_completed_onboarding: bool,
    pub updated_at: DateTime<Utc>,
}
