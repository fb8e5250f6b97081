//! Event bus abstraction for gatekit auth state changes.
//!
//! This crate defines the EventBus trait that carries the auth collaborator's
//! `onAuthStateChange` notifications to whoever holds a session:
//! - Memory (single process, tokio broadcast channels)

use async_trait::async_trait;
use futures::Stream;
use gatekit_storage::{SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

/// Auth state change within a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthEvent {
    /// A user signed in (password or OAuth callback completed)
    SignedIn { user_id: UserId },
    /// The session's user signed out
    SignedOut,
    /// The signed-in user's record changed (email confirmed, password updated)
    UserUpdated { user_id: UserId },
}

impl AuthEvent {
    /// The user the event concerns, if any.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            AuthEvent::SignedIn { user_id } | AuthEvent::UserUpdated { user_id } => Some(user_id),
            AuthEvent::SignedOut => None,
        }
    }
}

/// Error type for event bus operations
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("backend error: {0}")]
    Backend(String),
}

/// Stream of auth events
pub type EventStream = Pin<Box<dyn Stream<Item = AuthEvent> + Send>>;

/// Event bus trait for publishing and subscribing to auth events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an auth event to all watchers of this session.
    async fn publish(&self, session_id: &SessionId, event: AuthEvent)
        -> Result<(), EventBusError>;

    /// Subscribe to auth events for a session.
    ///
    /// Returns a stream that yields events as they occur.
    /// The stream will continue until dropped.
    async fn subscribe(&self, session_id: &SessionId) -> Result<EventStream, EventBusError>;
}
