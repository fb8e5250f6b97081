pub mod access;
pub mod onboarding;
pub mod subscription;
pub mod user;

pub use access::{cmd_access_check, cmd_access_profile};
pub use onboarding::{cmd_onboarding_complete, cmd_onboarding_status};
pub use subscription::{
    cmd_subscription_cancel, cmd_subscription_reactivate, cmd_subscription_set,
};
pub use user::{cmd_user_create, cmd_user_show};

use chrono::{DateTime, Utc};
use gatekit_billing::{BillingService, BillingSnapshotFetcher, StoreBillingService};
use gatekit_config::GatekitConfig;
use gatekit_events_memory::MemoryEventBus;
use gatekit_session::{AccessGate, LocalAuthSession, ReconciliationLoop, RetryPolicy};
use gatekit_storage::{SessionId, Store, StoreError, User, UserId};
use gatekit_store_sqlite::SqliteStore;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a command needs: resolved config and an open store.
pub struct Context {
    pub config: GatekitConfig,
    pub store: Arc<SqliteStore>,
}

impl Context {
    pub async fn open(
        config: GatekitConfig,
        database_url: Option<&str>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let url = database_url.or(config.database_url.as_deref());
        let store = match url {
            Some(url) => SqliteStore::open(url).await?,
            None => SqliteStore::open_default().await?,
        };
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    /// Look a user up by ID, or by email when the argument isn't a UUID.
    pub async fn find_user(&self, user: &str) -> Result<User, Box<dyn std::error::Error>> {
        let found = match user.parse::<UserId>() {
            Ok(id) => self.store.get_user_by_id(&id).await,
            Err(_) => self.store.get_user_by_email(user).await,
        };
        match found {
            Ok(u) => Ok(u),
            Err(StoreError::NotFound) => Err(format!("User '{}' not found", user).into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Access gate for a session already signed in as `user_id`.
    pub fn gate_for(&self, user_id: &UserId) -> AccessGate {
        let billing: Arc<dyn BillingService> =
            Arc::new(StoreBillingService::new(self.store.clone()));
        let fetcher = Arc::new(BillingSnapshotFetcher::new(
            billing.clone(),
            self.config.fetch_timeout(),
        ));
        let reconciler = Arc::new(ReconciliationLoop::new(
            fetcher,
            RetryPolicy::from(&self.config),
        ));

        let auth = Arc::new(LocalAuthSession::new(
            SessionId(Uuid::new_v4()),
            self.store.clone(),
            Arc::new(MemoryEventBus::new()),
        ));
        auth.restore(Some(user_id.clone()));

        AccessGate::new(auth, billing, self.store.clone(), reconciler, &self.config)
    }
}

/// Parse an optional RFC 3339 timestamp, defaulting to now.
pub fn parse_instant(value: Option<&str>) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    match value {
        Some(v) => Ok(DateTime::parse_from_rfc3339(v)
            .map_err(|e| format!("Invalid timestamp '{}': {}", v, e))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}
