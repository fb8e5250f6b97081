//! gatekit-billing - Billing collaborator integration for gatekit
//!
//! This crate provides:
//! - The [`BillingService`] contract (read a user's subscription, cancel, reactivate)
//! - A store-backed implementation over the hosted backend's subscriptions table
//! - [`SubscriptionSnapshot`], the normalized projection of a subscription record
//! - [`SnapshotFetcher`], the fetch boundary that turns every failure into a [`FetchError`]
//!
//! # Architecture
//!
//! The billing provider is the system of record. Mutating calls are fire-and-forget
//! from the access engine's perspective: callers refetch a snapshot afterwards
//! instead of patching local state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatekit_storage::{Store, StoreError, SubscriptionRow, UserId};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

mod fetch;
mod snapshot;

pub use fetch::{BillingSnapshotFetcher, FetchError, SnapshotFetcher};
pub use snapshot::{normalize_provider_status, SubscriptionSnapshot, SubscriptionStatus};

#[cfg(any(test, feature = "test-support"))]
pub use fetch::MockSnapshotFetcher;

/// Billing service errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Billing provider error: {0}")]
    Provider(String),

    #[error("Subscription not found")]
    SubscriptionNotFound,

    #[error("Subscription period ended at {0}, a new subscription is required")]
    PeriodEnded(DateTime<Utc>),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Billing service trait for dependency injection
#[cfg_attr(any(test, feature = "test-support"), mockall::automock)]
#[async_trait]
pub trait BillingService: Send + Sync {
    /// Get the raw subscription record for a user (`None` when the user never subscribed)
    async fn get_subscription(
        &self,
        user_id: &UserId,
    ) -> Result<Option<SubscriptionRow>, BillingError>;

    /// Schedule a subscription to cancel at the end of its current period
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError>;

    /// Undo a scheduled cancellation while the paid period is still running
    async fn reactivate_subscription(&self, subscription_id: &str) -> Result<(), BillingError>;
}

/// Billing service backed by the hosted backend's subscriptions table
pub struct StoreBillingService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> StoreBillingService<S> {
    /// Create a new store-backed billing service
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn map_store_error(e: StoreError) -> BillingError {
        match e {
            StoreError::NotFound => BillingError::SubscriptionNotFound,
            other => BillingError::Storage(other),
        }
    }

    async fn set_cancel_flag(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<(), BillingError> {
        self.store
            .set_cancel_at_period_end(subscription_id, cancel)
            .await
            .map_err(Self::map_store_error)
    }
}

#[async_trait]
impl<S: Store + 'static> BillingService for StoreBillingService<S> {
    async fn get_subscription(
        &self,
        user_id: &UserId,
    ) -> Result<Option<SubscriptionRow>, BillingError> {
        match self.store.get_subscription_by_user(user_id).await {
            Ok(row) => Ok(Some(row)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError> {
        self.set_cancel_flag(subscription_id, true).await?;

        info!(%subscription_id, "Subscription scheduled to cancel at period end");

        Ok(())
    }

    async fn reactivate_subscription(&self, subscription_id: &str) -> Result<(), BillingError> {
        let row = self
            .store
            .get_subscription_by_stripe_id(subscription_id)
            .await
            .map_err(Self::map_store_error)?;
        if Utc::now() >= row.current_period_end {
            warn!(
                %subscription_id,
                current_period_end = %row.current_period_end,
                "Refusing to reactivate a subscription whose period has ended"
            );
            return Err(BillingError::PeriodEnded(row.current_period_end));
        }

        self.set_cancel_flag(subscription_id, false).await?;

        info!(%subscription_id, "Subscription reactivated");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use gatekit_storage::{MockStore, SubscriptionId};
    use mockall::predicate::eq;
    use uuid::Uuid;

    fn row(user_id: &UserId) -> SubscriptionRow {
        SubscriptionRow {
            id: SubscriptionId(Uuid::new_v4()),
            user_id: user_id.clone(),
            stripe_subscription_id: Some("sub_123".to_string()),
            status: "active".to_string(),
            current_period_end: Utc::now() + Duration::days(30),
            cancel_at_period_end: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_row_is_no_subscription() {
        let mut store = MockStore::new();
        store
            .expect_get_subscription_by_user()
            .returning(|_| Err(StoreError::NotFound));

        let billing = StoreBillingService::new(Arc::new(store));
        let result = billing
            .get_subscription(&UserId(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn existing_row_is_returned() {
        let user_id = UserId(Uuid::new_v4());
        let expected = row(&user_id);
        let returned = expected.clone();

        let mut store = MockStore::new();
        store
            .expect_get_subscription_by_user()
            .with(eq(user_id.clone()))
            .returning(move |_| Ok(returned.clone()));

        let billing = StoreBillingService::new(Arc::new(store));
        assert_eq!(
            billing.get_subscription(&user_id).await.unwrap(),
            Some(expected)
        );
    }

    #[tokio::test]
    async fn backend_failure_is_storage_error() {
        let mut store = MockStore::new();
        store
            .expect_get_subscription_by_user()
            .returning(|_| Err(StoreError::Backend("connection reset".into())));

        let billing = StoreBillingService::new(Arc::new(store));
        let err = billing
            .get_subscription(&UserId(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Storage(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn cancel_and_reactivate_toggle_flag() {
        let user_id = UserId(Uuid::new_v4());
        let mut scheduled = row(&user_id);
        scheduled.cancel_at_period_end = true;

        let mut store = MockStore::new();
        store
            .expect_get_subscription_by_stripe_id()
            .with(eq("sub_123"))
            .returning(move |_| Ok(scheduled.clone()));
        store
            .expect_set_cancel_at_period_end()
            .with(eq("sub_123"), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));
        store
            .expect_set_cancel_at_period_end()
            .with(eq("sub_123"), eq(false))
            .times(1)
            .returning(|_, _| Ok(()));

        let billing = StoreBillingService::new(Arc::new(store));
        billing.cancel_subscription("sub_123").await.unwrap();
        billing.reactivate_subscription("sub_123").await.unwrap();
    }

    #[tokio::test]
    async fn reactivate_after_period_end_is_refused() {
        let user_id = UserId(Uuid::new_v4());
        let mut lapsed = row(&user_id);
        lapsed.cancel_at_period_end = true;
        lapsed.current_period_end = Utc::now() - Duration::days(5);
        let ended = lapsed.current_period_end;

        let mut store = MockStore::new();
        store
            .expect_get_subscription_by_stripe_id()
            .returning(move |_| Ok(lapsed.clone()));
        store.expect_set_cancel_at_period_end().never();

        let billing = StoreBillingService::new(Arc::new(store));
        let err = billing.reactivate_subscription("sub_123").await.unwrap_err();
        assert!(matches!(err, BillingError::PeriodEnded(at) if at == ended));
    }

    #[tokio::test]
    async fn reactivate_unknown_subscription() {
        let mut store = MockStore::new();
        store
            .expect_get_subscription_by_stripe_id()
            .returning(|_| Err(StoreError::NotFound));

        let billing = StoreBillingService::new(Arc::new(store));
        let err = billing
            .reactivate_subscription("sub_missing")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::SubscriptionNotFound));
    }

    #[tokio::test]
    async fn cancel_unknown_subscription() {
        let mut store = MockStore::new();
        store
            .expect_set_cancel_at_period_end()
            .returning(|_, _| Err(StoreError::NotFound));

        let billing = StoreBillingService::new(Arc::new(store));
        let err = billing.cancel_subscription("sub_missing").await.unwrap_err();
        assert!(matches!(err, BillingError::SubscriptionNotFound));
    }

    #[test]
    fn test_billing_error_display() {
        assert_eq!(
            BillingError::SubscriptionNotFound.to_string(),
            "Subscription not found"
        );
        assert!(BillingError::Provider("502".into())
            .to_string()
            .contains("502"));
    }
}
