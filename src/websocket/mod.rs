use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

use crate::models::SessionUser;

pub mod message_types;

/// Unique identifier for a WebSocket subscriber
///
/// Each connection gets a unique subscriber ID when it registers, allowing
/// precise cleanup when it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber entry: connection identity plus its outbound channel
struct Subscriber {
    id: SubscriberId,
    user: SessionUser,
    sender: UnboundedSender<String>,
}

/// Connection registry for live session WebSockets.
///
/// Tracks, per session, the set of live connections and the identity behind
/// each one. Owned by the transport-hosting process, injected where needed;
/// fan-out is process-local (cross-instance delivery would need a shared
/// pub/sub layer this service does not carry).
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    // session_id -> list of subscribers
    inner: Arc<RwLock<HashMap<Uuid, Vec<Subscriber>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a session.
    ///
    /// Returns the subscriber ID (used for cleanup and broadcast exclusion)
    /// and the channel the transport drains into the socket.
    pub async fn add_subscriber(
        &self,
        session_id: Uuid,
        user: SessionUser,
    ) -> (SubscriberId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let subscriber_id = SubscriberId::new();

        let subscriber = Subscriber {
            id: subscriber_id,
            user,
            sender: tx,
        };

        let mut guard = self.inner.write().await;
        guard.entry(session_id).or_default().push(subscriber);

        tracing::debug!(
            "added subscriber {:?} to session {}, total subscribers: {}",
            subscriber_id,
            session_id,
            guard.get(&session_id).map(|v| v.len()).unwrap_or(0)
        );

        (subscriber_id, rx)
    }

    /// Remove a specific subscriber, garbage-collecting the session entry
    /// when it becomes empty. Must be called when a connection closes.
    pub async fn remove_subscriber(&self, session_id: Uuid, subscriber_id: SubscriberId) {
        let mut guard = self.inner.write().await;

        if let Some(subscribers) = guard.get_mut(&session_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                guard.remove(&session_id);
                tracing::debug!("removed empty session {} from registry", session_id);
            }
        }
    }

    /// Best-effort fan-out to every connection in the session, optionally
    /// excluding one subscriber (typically the originator). A send failure on
    /// one connection drops that connection without aborting the rest.
    pub async fn broadcast(&self, session_id: Uuid, payload: &str, exclude: Option<SubscriberId>) {
        let mut guard = self.inner.write().await;
        if let Some(subscribers) = guard.get_mut(&session_id) {
            let before = subscribers.len();
            subscribers.retain(|subscriber| {
                if Some(subscriber.id) == exclude {
                    return true;
                }
                subscriber.sender.send(payload.to_string()).is_ok()
            });
            let after = subscribers.len();
            if before != after {
                tracing::debug!(
                    "broadcast to session {}: {} dead senders cleaned up, {} active",
                    session_id,
                    before - after,
                    after
                );
            }
        }
    }

    /// Targeted delivery to every connection of one user in the session.
    ///
    /// Returns how many connections received the payload. A recipient with no
    /// live connection simply gets nothing — private messages are not queued
    /// for offline delivery at this layer.
    pub async fn send_to_user(&self, session_id: Uuid, user_id: Uuid, payload: &str) -> usize {
        let guard = self.inner.read().await;
        let mut delivered = 0;
        if let Some(subscribers) = guard.get(&session_id) {
            for subscriber in subscribers {
                if subscriber.user.user_id == user_id
                    && subscriber.sender.send(payload.to_string()).is_ok()
                {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Distinct users currently connected to the session.
    pub async fn active_users(&self, session_id: Uuid) -> Vec<SessionUser> {
        let guard = self.inner.read().await;
        let mut seen = std::collections::HashSet::new();
        let mut users = Vec::new();
        if let Some(subscribers) = guard.get(&session_id) {
            for subscriber in subscribers {
                if seen.insert(subscriber.user.user_id) {
                    users.push(subscriber.user.clone());
                }
            }
        }
        users
    }

    /// Connection count for a session (for debugging/metrics)
    pub async fn subscriber_count(&self, session_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.get(&session_id).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionRole;

    fn user(name: &str) -> SessionUser {
        SessionUser {
            user_id: Uuid::new_v4(),
            display_name: name.into(),
            role: SessionRole::Member,
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_but_excluded() {
        let registry = ConnectionRegistry::new();
        let session = Uuid::new_v4();

        let (id_a, mut rx_a) = registry.add_subscriber(session, user("a")).await;
        let (_id_b, mut rx_b) = registry.add_subscriber(session, user("b")).await;

        registry.broadcast(session, "hello", Some(id_a)).await;

        assert_eq!(rx_b.recv().await.as_deref(), Some("hello"));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_user_targets_only_matching_identity() {
        let registry = ConnectionRegistry::new();
        let session = Uuid::new_v4();
        let alice = user("alice");

        let (_ida, mut rx_alice) = registry.add_subscriber(session, alice.clone()).await;
        let (_idb, mut rx_bob) = registry.add_subscriber(session, user("bob")).await;

        let delivered = registry.send_to_user(session, alice.user_id, "psst").await;
        assert_eq!(delivered, 1);
        assert_eq!(rx_alice.recv().await.as_deref(), Some("psst"));
        assert!(rx_bob.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_offline_user_is_noop() {
        let registry = ConnectionRegistry::new();
        let session = Uuid::new_v4();
        let (_id, _rx) = registry.add_subscriber(session, user("a")).await;

        let delivered = registry.send_to_user(session, Uuid::new_v4(), "psst").await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_remove_subscriber_garbage_collects_session() {
        let registry = ConnectionRegistry::new();
        let session = Uuid::new_v4();

        let (id, _rx) = registry.add_subscriber(session, user("a")).await;
        assert_eq!(registry.subscriber_count(session).await, 1);

        registry.remove_subscriber(session, id).await;
        assert_eq!(registry.subscriber_count(session).await, 0);
        assert!(registry.inner.read().await.get(&session).is_none());
    }

    #[tokio::test]
    async fn test_dead_sender_pruned_on_broadcast() {
        let registry = ConnectionRegistry::new();
        let session = Uuid::new_v4();

        let (_id_a, rx_a) = registry.add_subscriber(session, user("a")).await;
        let (_id_b, mut rx_b) = registry.add_subscriber(session, user("b")).await;
        drop(rx_a);

        registry.broadcast(session, "still here", None).await;
        assert_eq!(registry.subscriber_count(session).await, 1);
        assert_eq!(rx_b.recv().await.as_deref(), Some("still here"));
    }

    #[tokio::test]
    async fn test_active_users_dedups_multiple_connections() {
        let registry = ConnectionRegistry::new();
        let session = Uuid::new_v4();
        let alice = user("alice");

        let (_a1, _rx1) = registry.add_subscriber(session, alice.clone()).await;
        let (_a2, _rx2) = registry.add_subscriber(session, alice.clone()).await;

        let users = registry.active_users(session).await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, alice.user_id);
    }
}
