//! Auth collaborator contract and a store-backed session.

use async_trait::async_trait;
use chrono::Utc;
use gatekit_events::{AuthEvent, EventBus, EventStream};
use gatekit_storage::{SessionId, Store, User, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::SessionError;

/// Resolution state of a session's user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// The session has not been restored yet
    Loading,
    SignedOut,
    SignedIn(UserId),
}

/// What the access engine needs from the auth provider.
#[async_trait]
pub trait AuthSession: Send + Sync {
    fn session_id(&self) -> &SessionId;

    fn state(&self) -> AuthState;

    /// The signed-in user, or `None` while loading or signed out
    async fn current_user(&self) -> Result<Option<User>, SessionError>;

    /// Wait up to `timeout` for the session to resolve to a signed-in user.
    ///
    /// Returns [`SessionError::AuthUnavailable`] when the session resolves
    /// signed out or does not resolve in time.
    async fn wait_for_user(&self, timeout: Duration) -> Result<User, SessionError>;

    /// Auth state changes for this session
    async fn subscribe(&self) -> Result<EventStream, SessionError>;

    async fn sign_out(&self) -> Result<(), SessionError>;
}

/// Session backed by the user store, announcing changes on an [`EventBus`].
pub struct LocalAuthSession<S: Store, B: EventBus> {
    session_id: SessionId,
    store: Arc<S>,
    bus: Arc<B>,
    state: watch::Sender<AuthState>,
}

impl<S: Store, B: EventBus> LocalAuthSession<S, B> {
    /// New session in the [`AuthState::Loading`] state
    pub fn new(session_id: SessionId, store: Arc<S>, bus: Arc<B>) -> Self {
        let (state, _) = watch::channel(AuthState::Loading);
        Self {
            session_id,
            store,
            bus,
            state,
        }
    }

    /// Resolve the session from a persisted sign-in without announcing it.
    pub fn restore(&self, user_id: Option<UserId>) {
        let state = match user_id {
            Some(id) => AuthState::SignedIn(id),
            None => AuthState::SignedOut,
        };
        debug!(session_id = %self.session_id.0, ?state, "Session restored");
        self.state.send_replace(state);
    }

    pub async fn sign_in(&self, user_id: &UserId) -> Result<User, SessionError> {
        self.store.record_sign_in(user_id, Utc::now()).await?;
        let user = self.store.get_user_by_id(user_id).await?;

        self.state.send_replace(AuthState::SignedIn(user.id.clone()));
        self.bus
            .publish(
                &self.session_id,
                AuthEvent::SignedIn {
                    user_id: user.id.clone(),
                },
            )
            .await?;

        info!(session_id = %self.session_id.0, user_id = %user.id, "User signed in");

        Ok(user)
    }

    pub async fn sign_in_with_email(&self, email: &str) -> Result<User, SessionError> {
        let user = self.store.get_user_by_email(email).await?;
        self.sign_in(&user.id).await
    }

    /// Announce that the signed-in user's record changed.
    pub async fn notify_user_updated(&self) -> Result<(), SessionError> {
        let state = self.state.borrow().clone();
        let AuthState::SignedIn(user_id) = state else {
            return Err(SessionError::AuthUnavailable);
        };
        self.bus
            .publish(&self.session_id, AuthEvent::UserUpdated { user_id })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<S: Store + 'static, B: EventBus + 'static> AuthSession for LocalAuthSession<S, B> {
    fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    async fn current_user(&self) -> Result<Option<User>, SessionError> {
        match self.state() {
            AuthState::SignedIn(user_id) => Ok(Some(self.store.get_user_by_id(&user_id).await?)),
            AuthState::Loading | AuthState::SignedOut => Ok(None),
        }
    }

    async fn wait_for_user(&self, timeout: Duration) -> Result<User, SessionError> {
        let mut rx = self.state.subscribe();
        let resolved = tokio::time::timeout(timeout, async {
            rx.wait_for(|s| *s != AuthState::Loading)
                .await
                .map(|s| s.clone())
        })
        .await;

        match resolved {
            Ok(Ok(AuthState::SignedIn(user_id))) => Ok(self.store.get_user_by_id(&user_id).await?),
            Ok(Ok(_)) | Ok(Err(_)) => Err(SessionError::AuthUnavailable),
            Err(_) => {
                warn!(session_id = %self.session_id.0, ?timeout, "Auth did not resolve in time");
                Err(SessionError::AuthUnavailable)
            }
        }
    }

    async fn subscribe(&self) -> Result<EventStream, SessionError> {
        Ok(self.bus.subscribe(&self.session_id).await?)
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        let previous = self.state.send_replace(AuthState::SignedOut);
        self.bus
            .publish(&self.session_id, AuthEvent::SignedOut)
            .await?;

        if let AuthState::SignedIn(user_id) = previous {
            info!(session_id = %self.session_id.0, %user_id, "User signed out");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use gatekit_events_memory::MemoryEventBus;
    use gatekit_storage::{AuthProvider, MockStore, StoreError};
    use mockall::predicate::eq;
    use uuid::Uuid;

    fn user(id: &UserId) -> User {
        let now = Utc::now();
        User {
            id: id.clone(),
            email: "grace@example.com".to_string(),
            auth_provider: AuthProvider::Password,
            email_confirmed_at: Some(now),
            last_sign_in_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn session(store: MockStore) -> LocalAuthSession<MockStore, MemoryEventBus> {
        LocalAuthSession::new(
            SessionId(Uuid::new_v4()),
            Arc::new(store),
            Arc::new(MemoryEventBus::new()),
        )
    }

    fn store_with_user(user_id: &UserId) -> MockStore {
        let mut store = MockStore::new();
        let id = user_id.clone();
        store
            .expect_get_user_by_id()
            .with(eq(user_id.clone()))
            .returning(move |_| Ok(user(&id)));
        store.expect_record_sign_in().returning(|_, _| Ok(()));
        store
    }

    #[tokio::test]
    async fn starts_loading_without_user() {
        let session = session(MockStore::new());
        assert_eq!(session.state(), AuthState::Loading);
        assert!(session.current_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_in_publishes_event() {
        let user_id = UserId(Uuid::new_v4());
        let session = session(store_with_user(&user_id));
        let mut events = session.subscribe().await.unwrap();

        let signed_in = session.sign_in(&user_id).await.unwrap();
        assert_eq!(signed_in.id, user_id);
        assert_eq!(session.state(), AuthState::SignedIn(user_id.clone()));
        assert_eq!(
            events.next().await,
            Some(AuthEvent::SignedIn {
                user_id: user_id.clone()
            })
        );

        session.sign_out().await.unwrap();
        assert_eq!(events.next().await, Some(AuthEvent::SignedOut));
        assert!(session.current_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_in_unknown_user_fails() {
        let mut store = MockStore::new();
        store
            .expect_record_sign_in()
            .returning(|_, _| Err(StoreError::NotFound));

        let session = session(store);
        let err = session.sign_in(&UserId(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, SessionError::Store(StoreError::NotFound)));
        assert_eq!(session.state(), AuthState::Loading);
    }

    #[tokio::test]
    async fn wait_for_user_resolves_on_restore() {
        let user_id = UserId(Uuid::new_v4());
        let session = Arc::new(session(store_with_user(&user_id)));

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.wait_for_user(Duration::from_secs(15)).await })
        };
        tokio::task::yield_now().await;
        session.restore(Some(user_id.clone()));

        let user = waiter.await.unwrap().unwrap();
        assert_eq!(user.id, user_id);
    }

    #[tokio::test]
    async fn wait_for_user_signed_out_is_unavailable() {
        let session = session(MockStore::new());
        session.restore(None);

        let err = session
            .wait_for_user(Duration::from_secs(15))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AuthUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_user_times_out() {
        let session = session(MockStore::new());

        let start = tokio::time::Instant::now();
        let err = session
            .wait_for_user(Duration::from_secs(15))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AuthUnavailable));
        assert!(start.elapsed() >= Duration::from_secs(15));
        assert_eq!(session.state(), AuthState::Loading);
    }

    #[tokio::test]
    async fn notify_user_updated_requires_user() {
        let session = session(MockStore::new());
        assert!(matches!(
            session.notify_user_updated().await,
            Err(SessionError::AuthUnavailable)
        ));
    }
}
