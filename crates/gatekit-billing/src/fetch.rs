//! Snapshot fetch boundary.
//!
//! Everything that can go wrong while reading from the billing collaborator is
//! converted into a tagged [`FetchError`] here. No caching and no retries: the
//! reconciliation loop owns both.

use async_trait::async_trait;
use gatekit_storage::UserId;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{BillingService, SubscriptionSnapshot};

/// Why a snapshot fetch failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("billing transport error: {0}")]
    Transport(String),

    #[error("billing fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed subscription record: {0}")]
    Malformed(String),
}

/// Source of subscription snapshots.
///
/// `Ok(None)` means the user has no subscription record, which is a valid
/// terminal answer and not a failure.
#[cfg_attr(any(test, feature = "test-support"), mockall::automock)]
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch(&self, user_id: &UserId) -> Result<Option<SubscriptionSnapshot>, FetchError>;
}

/// Fetches snapshots through a [`BillingService`] with a per-call timeout.
pub struct BillingSnapshotFetcher {
    billing: Arc<dyn BillingService>,
    timeout: Duration,
}

impl BillingSnapshotFetcher {
    pub fn new(billing: Arc<dyn BillingService>, timeout: Duration) -> Self {
        Self { billing, timeout }
    }
}

#[async_trait]
impl SnapshotFetcher for BillingSnapshotFetcher {
    async fn fetch(&self, user_id: &UserId) -> Result<Option<SubscriptionSnapshot>, FetchError> {
        let record = tokio::time::timeout(self.timeout, self.billing.get_subscription(user_id))
            .await
            .map_err(|_| {
                warn!(%user_id, timeout = ?self.timeout, "Subscription fetch timed out");
                FetchError::Timeout(self.timeout)
            })?
            .map_err(|e| {
                warn!(%user_id, error = %e, "Subscription fetch failed");
                FetchError::Transport(e.to_string())
            })?;

        match record {
            None => {
                debug!(%user_id, "No subscription record");
                Ok(None)
            }
            Some(row) => {
                let snapshot = SubscriptionSnapshot::from_row(&row)?;
                debug!(
                    %user_id,
                    status = %snapshot.status,
                    pending = snapshot.pending,
                    "Fetched subscription snapshot"
                );
                Ok(Some(snapshot))
            }
        }
    }
}
