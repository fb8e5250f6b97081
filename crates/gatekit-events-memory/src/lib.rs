//! In-memory event bus implementation using tokio broadcast channels.
//!
//! Events are only broadcast within a single process, which matches the
//! single-owner session model: one client session, one channel.

use async_trait::async_trait;
use dashmap::DashMap;
use gatekit_events::{AuthEvent, EventBus, EventBusError, EventStream};
use gatekit_storage::SessionId;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

const CHANNEL_CAPACITY: usize = 32;

/// In-memory event bus using tokio broadcast channels.
pub struct MemoryEventBus {
    channels: Arc<DashMap<SessionId, broadcast::Sender<AuthEvent>>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Get or create a broadcast channel for a session
    fn get_or_create_channel(&self, session_id: &SessionId) -> broadcast::Sender<AuthEvent> {
        self.channels
            .entry(session_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Drop the channel for a session that has ended.
    pub fn close(&self, session_id: &SessionId) {
        self.channels.remove(session_id);
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(
        &self,
        session_id: &SessionId,
        event: AuthEvent,
    ) -> Result<(), EventBusError> {
        let tx = self.get_or_create_channel(session_id);

        // No receivers is fine
        let _ = tx.send(event);

        Ok(())
    }

    async fn subscribe(&self, session_id: &SessionId) -> Result<EventStream, EventBusError> {
        let tx = self.get_or_create_channel(session_id);
        let rx = tx.subscribe();

        // Lagged receivers drop the missed events; the next visit refetches anyway
        let stream = BroadcastStream::new(rx).filter_map(|result| result.ok());

        Ok(Box::pin(stream))
    }
}
