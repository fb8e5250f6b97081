//! The Store trait that backends implement.

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::StoreError;

/// The storage trait the billing and session crates depend on.
///
/// Lookups of a single row return [`StoreError::NotFound`] when the row is absent;
/// callers decide whether absence is an error.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Users ──────────────────────────────────────────

    /// Create a new user (returns generated ID).
    async fn create_user(&self, params: &CreateUserParams) -> Result<UserId, StoreError>;

    /// Get user by ID.
    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError>;

    /// Get user by email.
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Stamp the user's last sign-in time.
    async fn record_sign_in(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<(), StoreError>;

    // ───────────────────────────────────── Subscriptions ──────────────────────────────────

    /// Insert or replace the subscription row for a user.
    ///
    /// There is at most one row per user; an existing row is overwritten as a whole.
    async fn upsert_subscription(
        &self,
        params: &UpsertSubscriptionParams,
    ) -> Result<SubscriptionRow, StoreError>;

    /// Get the subscription row for a user.
    async fn get_subscription_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<SubscriptionRow, StoreError>;

    /// Get a subscription row by its billing provider id.
    async fn get_subscription_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<SubscriptionRow, StoreError>;

    /// Set or clear the scheduled cancellation flag.
    async fn set_cancel_at_period_end(
        &self,
        stripe_subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Preferences ────────────────────────────────────

    /// Get the preferences row for a user.
    async fn get_user_preferences(&self, user_id: &UserId)
        -> Result<UserPreferences, StoreError>;

    /// Record whether the user has finished the onboarding tour.
    async fn set_onboarding_completed(
        &self,
        user_id: &UserId,
        completed: bool,
    ) -> Result<(), StoreError>;
}
