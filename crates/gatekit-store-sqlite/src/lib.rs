use chrono::{DateTime, Utc};
use gatekit_storage::{
    AuthProvider, CreateUserParams, Store, StoreError, SubscriptionId, SubscriptionRow,
    UpsertSubscriptionParams, User, UserId, UserPreferences,
};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

type UserTuple = (String, String, String, Option<i64>, Option<i64>, i64, i64);
type SubscriptionTuple = (String, String, Option<String>, String, i64, bool, i64, i64);

const USER_COLUMNS: &str =
    "id,email,auth_provider,email_confirmed_at,last_sign_in_at,created_at,updated_at";
const SUBSCRIPTION_COLUMNS: &str = "id,user_id,stripe_subscription_id,status,current_period_end,\
     cancel_at_period_end,created_at,updated_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// `~/.gatekit/store.db` (creates dir with 0700 perms on unix)
    pub async fn open_default() -> Result<Self, StoreError> {
        let dir = dirs::home_dir()
            .ok_or_else(|| StoreError::Backend("no home dir".into()))?
            .join(".gatekit");
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let path = dir.join("store.db");
        let url = format!("sqlite://{}?mode=rwc", path.to_string_lossy());
        Self::open(&url).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Map constraint violations onto the uniform error variants.
fn write_error(e: sqlx::Error) -> StoreError {
    let s = e.to_string();
    if s.contains("UNIQUE") {
        StoreError::AlreadyExists
    } else if s.contains("FOREIGN KEY") {
        StoreError::NotFound
    } else {
        StoreError::Backend(s)
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {}", ms)))
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(|e| StoreError::Backend(e.to_string()))
}

fn user_from_row(row: UserTuple) -> Result<User, StoreError> {
    let (id, email, provider, confirmed, last_sign_in, created, updated) = row;
    Ok(User {
        id: UserId(parse_uuid(&id)?),
        email,
        auth_provider: provider
            .parse::<AuthProvider>()
            .map_err(StoreError::Backend)?,
        email_confirmed_at: confirmed.map(from_millis).transpose()?,
        last_sign_in_at: last_sign_in.map(from_millis).transpose()?,
        created_at: from_millis(created)?,
        updated_at: from_millis(updated)?,
    })
}

fn subscription_from_row(row: SubscriptionTuple) -> Result<SubscriptionRow, StoreError> {
    let (id, user_id, stripe_id, status, period_end, cancel, created, updated) = row;
    Ok(SubscriptionRow {
        id: SubscriptionId(parse_uuid(&id)?),
        user_id: UserId(parse_uuid(&user_id)?),
        stripe_subscription_id: stripe_id,
        status,
        current_period_end: from_millis(period_end)?,
        cancel_at_period_end: cancel,
        created_at: from_millis(created)?,
        updated_at: from_millis(updated)?,
    })
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ─────────────────────────────── Users ────────────────────────────────

    async fn create_user(&self, params: &CreateUserParams) -> Result<UserId, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now().timestamp_millis();
        let created_at = params
            .created_at
            .map(|t| t.timestamp_millis())
            .unwrap_or(now);

        sqlx::query(
            "INSERT INTO users(id,email,auth_provider,created_at,updated_at) VALUES(?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(&params.email)
        .bind(params.auth_provider.as_str())
        .bind(created_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        Ok(UserId(id))
    }

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserTuple>(&format!(
            "SELECT {} FROM users WHERE id=?",
            USER_COLUMNS
        ))
        .bind(user_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.ok_or(StoreError::NotFound).and_then(user_from_row)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserTuple>(&format!(
            "SELECT {} FROM users WHERE email=?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.ok_or(StoreError::NotFound).and_then(user_from_row)
    }

    async fn record_sign_in(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET last_sign_in_at=?, updated_at=? WHERE id=?")
            .bind(at.timestamp_millis())
            .bind(Utc::now().timestamp_millis())
            .bind(user_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ──────────────────────────── Subscriptions ───────────────────────────

    async fn upsert_subscription(
        &self,
        params: &UpsertSubscriptionParams,
    ) -> Result<SubscriptionRow, StoreError> {
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            "INSERT INTO subscriptions(id,user_id,stripe_subscription_id,status,current_period_end,
                                       cancel_at_period_end,created_at,updated_at)
             VALUES(?,?,?,?,?,?,?,?)
             ON CONFLICT(user_id)
             DO UPDATE SET stripe_subscription_id=excluded.stripe_subscription_id,
                           status=excluded.status,
                           current_period_end=excluded.current_period_end,
                           cancel_at_period_end=excluded.cancel_at_period_end,
                           updated_at=excluded.updated_at",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(params.user_id.0.to_string())
        .bind(&params.stripe_subscription_id)
        .bind(&params.status)
        .bind(params.current_period_end.timestamp_millis())
        .bind(params.cancel_at_period_end)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        self.get_subscription_by_user(&params.user_id).await
    }

    async fn get_subscription_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<SubscriptionRow, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionTuple>(&format!(
            "SELECT {} FROM subscriptions WHERE user_id=?",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.ok_or(StoreError::NotFound)
            .and_then(subscription_from_row)
    }

    async fn get_subscription_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<SubscriptionRow, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionTuple>(&format!(
            "SELECT {} FROM subscriptions WHERE stripe_subscription_id=?",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(stripe_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.ok_or(StoreError::NotFound)
            .and_then(subscription_from_row)
    }

    async fn set_cancel_at_period_end(
        &self,
        stripe_subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET cancel_at_period_end=?, updated_at=?
              WHERE stripe_subscription_id=?",
        )
        .bind(cancel_at_period_end)
        .bind(Utc::now().timestamp_millis())
        .bind(stripe_subscription_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ───────────────────────────── Preferences ────────────────────────────

    async fn get_user_preferences(
        &self,
        user_id: &UserId,
    ) -> Result<UserPreferences, StoreError> {
        let row = sqlx::query_as::<_, (bool, i64)>(
            "SELECT has_completed_onboarding,updated_at FROM user_preferences WHERE user_id=?",
        )
        .bind(user_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            None => Err(StoreError::NotFound),
            Some((has_completed_onboarding, updated)) => Ok(UserPreferences {
                user_id: user_id.clone(),
                has_completed_onboarding,
                updated_at: from_millis(updated)?,
            }),
        }
    }

    async fn set_onboarding_completed(
        &self,
        user_id: &UserId,
        completed: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_preferences(user_id,has_completed_onboarding,updated_at)
             VALUES(?,?,?)
             ON CONFLICT(user_id)
             DO UPDATE SET has_completed_onboarding=excluded.has_completed_onboarding,
                           updated_at=excluded.updated_at",
        )
        .bind(user_id.0.to_string())
        .bind(completed)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }
}
