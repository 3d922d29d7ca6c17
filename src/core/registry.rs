//! Which local connections want which notifications.
//!
//! Two indexes keyed first by app id, plus a per-connection reverse index so
//! teardown touches only the entries a connection actually holds. All three
//! live behind one lock; every public operation takes it exactly once.

use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::connection::{ConnectionHandle, ConnectionId};

type Subscribers = HashMap<ConnectionId, ConnectionHandle>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Subscription {
    Key { app_id: String, key: String },
    App { app_id: String },
}

#[derive(Debug, Default)]
struct Indexes {
    keys: HashMap<String, HashMap<String, Subscribers>>, // app_id -> key -> conn
    apps: HashMap<String, Subscribers>,                   // app_id -> conn
    by_conn: HashMap<ConnectionId, HashSet<Subscription>>,
}

impl Indexes {
    fn remember(&mut self, conn: ConnectionId, sub: Subscription) {
        self.by_conn.entry(conn).or_default().insert(sub);
    }

    fn forget(&mut self, conn: ConnectionId, sub: &Subscription) {
        if let Some(subs) = self.by_conn.get_mut(&conn) {
            subs.remove(sub);
            if subs.is_empty() {
                self.by_conn.remove(&conn);
            }
        }
    }

    fn remove_key(&mut self, app_id: &str, key: &str, conn: ConnectionId) -> bool {
        let Some(app_keys) = self.keys.get_mut(app_id) else {
            return false;
        };
        let Some(subscribers) = app_keys.get_mut(key) else {
            return false;
        };
        let removed = subscribers.remove(&conn).is_some();
        if subscribers.is_empty() {
            app_keys.remove(key);
        }
        if app_keys.is_empty() {
            self.keys.remove(app_id);
        }
        removed
    }

    fn remove_app(&mut self, app_id: &str, conn: ConnectionId) -> bool {
        let Some(subscribers) = self.apps.get_mut(app_id) else {
            return false;
        };
        let removed = subscribers.remove(&conn).is_some();
        if subscribers.is_empty() {
            self.apps.remove(app_id);
        }
        removed
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<Indexes>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the connection already held this subscription.
    pub async fn subscribe_key(&self, app_id: &str, key: &str, conn: &ConnectionHandle) -> bool {
        let mut inner = self.inner.lock().await;
        let inserted = inner
            .keys
            .entry(app_id.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .insert(conn.id(), conn.clone())
            .is_none();
        inner.remember(
            conn.id(),
            Subscription::Key {
                app_id: app_id.to_string(),
                key: key.to_string(),
            },
        );
        debug!(app_id, key, conn_id = %conn.id(), inserted, "key subscription");
        inserted
    }

    pub async fn unsubscribe_key(&self, app_id: &str, key: &str, conn: ConnectionId) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.remove_key(app_id, key, conn);
        inner.forget(
            conn,
            &Subscription::Key {
                app_id: app_id.to_string(),
                key: key.to_string(),
            },
        );
        debug!(app_id, key, conn_id = %conn, removed, "key unsubscription");
        removed
    }

    pub async fn subscribe_app(&self, app_id: &str, conn: &ConnectionHandle) -> bool {
        let mut inner = self.inner.lock().await;
        let inserted = inner
            .apps
            .entry(app_id.to_string())
            .or_default()
            .insert(conn.id(), conn.clone())
            .is_none();
        inner.remember(
            conn.id(),
            Subscription::App {
                app_id: app_id.to_string(),
            },
        );
        debug!(app_id, conn_id = %conn.id(), inserted, "app subscription");
        inserted
    }

    pub async fn unsubscribe_app(&self, app_id: &str, conn: ConnectionId) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.remove_app(app_id, conn);
        inner.forget(
            conn,
            &Subscription::App {
                app_id: app_id.to_string(),
            },
        );
        debug!(app_id, conn_id = %conn, removed, "app unsubscription");
        removed
    }

    /// Removes every subscription `conn` holds. Returns how many there were.
    pub async fn drop_connection(&self, conn: ConnectionId) -> usize {
        let mut inner = self.inner.lock().await;
        let Some(subs) = inner.by_conn.remove(&conn) else {
            return 0;
        };
        let count = subs.len();
        for sub in subs {
            match sub {
                Subscription::Key { app_id, key } => {
                    inner.remove_key(&app_id, &key, conn);
                }
                Subscription::App { app_id } => {
                    inner.remove_app(&app_id, conn);
                }
            }
        }
        count
    }

    /// Everyone subscribed to `app_id/key` directly or through the whole
    /// app, once per connection, ordered by connection id.
    pub async fn matching_handles(&self, app_id: &str, key: &str) -> Vec<ConnectionHandle> {
        let inner = self.inner.lock().await;
        let mut matched: BTreeMap<ConnectionId, ConnectionHandle> = BTreeMap::new();

        if let Some(subscribers) = inner.keys.get(app_id).and_then(|keys| keys.get(key)) {
            for (id, handle) in subscribers {
                matched.insert(*id, handle.clone());
            }
        }
        if let Some(subscribers) = inner.apps.get(app_id) {
            for (id, handle) in subscribers {
                matched.entry(*id).or_insert_with(|| handle.clone());
            }
        }

        matched.into_values().collect()
    }

    /// Total number of (subscription, connection) entries across both indexes.
    pub async fn subscription_count(&self) -> usize {
        let inner = self.inner.lock().await;
        let keyed: usize = inner
            .keys
            .values()
            .flat_map(|keys| keys.values())
            .map(HashMap::len)
            .sum();
        let apps: usize = inner.apps.values().map(HashMap::len).sum();
        keyed + apps
    }

    pub async fn is_empty(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.keys.is_empty() && inner.apps.is_empty() && inner.by_conn.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::ConnectionIds;
    use kvfeed_protocol::ServerEvent;
    use tokio::sync::mpsc;

    fn handle(ids: &ConnectionIds) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
        ConnectionHandle::channel(ids.next_id(), 8)
    }

    #[tokio::test]
    async fn subscribing_twice_keeps_one_entry() {
        let ids = ConnectionIds::new();
        let registry = SubscriptionRegistry::new();
        let (conn, _rx) = handle(&ids);

        assert!(registry.subscribe_key("x", "k1", &conn).await);
        assert!(!registry.subscribe_key("x", "k1", &conn).await);

        assert_eq!(registry.subscription_count().await, 1);
        assert_eq!(registry.matching_handles("x", "k1").await.len(), 1);
    }

    #[tokio::test]
    async fn key_and_app_subscriptions_match_once() {
        let ids = ConnectionIds::new();
        let registry = SubscriptionRegistry::new();
        let (conn, _rx) = handle(&ids);

        registry.subscribe_key("x", "k1", &conn).await;
        registry.subscribe_app("x", &conn).await;

        let matched = registry.matching_handles("x", "k1").await;
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id(), conn.id());

        // app subscription alone still matches other keys
        assert_eq!(registry.matching_handles("x", "other").await.len(), 1);
        assert!(registry.matching_handles("y", "k1").await.is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_prunes_empty_levels() {
        let ids = ConnectionIds::new();
        let registry = SubscriptionRegistry::new();
        let (conn, _rx) = handle(&ids);

        registry.subscribe_key("x", "k1", &conn).await;
        registry.subscribe_app("y", &conn).await;
        assert!(registry.unsubscribe_key("x", "k1", conn.id()).await);
        assert!(registry.unsubscribe_app("y", conn.id()).await);

        assert!(registry.is_empty().await);
        assert!(!registry.unsubscribe_key("x", "k1", conn.id()).await);
    }

    #[tokio::test]
    async fn drop_connection_cleans_both_indexes() {
        let ids = ConnectionIds::new();
        let registry = SubscriptionRegistry::new();
        let (gone, _rx1) = handle(&ids);
        let (stays, _rx2) = handle(&ids);

        registry.subscribe_key("x", "k1", &gone).await;
        registry.subscribe_key("x", "k2", &gone).await;
        registry.subscribe_key("z", "k1", &gone).await;
        registry.subscribe_app("x", &gone).await;
        registry.subscribe_key("x", "k1", &stays).await;

        assert_eq!(registry.drop_connection(gone.id()).await, 4);

        for (app, key) in [("x", "k1"), ("x", "k2"), ("z", "k1"), ("x", "any")] {
            let matched = registry.matching_handles(app, key).await;
            assert!(matched.iter().all(|h| h.id() != gone.id()), "{}/{}", app, key);
        }
        assert_eq!(registry.matching_handles("x", "k1").await.len(), 1);
        assert_eq!(registry.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn drop_connection_without_subscriptions_is_noop() {
        let ids = ConnectionIds::new();
        let registry = SubscriptionRegistry::new();
        let (conn, _rx) = handle(&ids);

        assert_eq!(registry.drop_connection(conn.id()).await, 0);
        assert_eq!(registry.drop_connection(conn.id()).await, 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn matches_are_ordered_by_connection() {
        let ids = ConnectionIds::new();
        let registry = SubscriptionRegistry::new();
        let conns: Vec<_> = (0..5).map(|_| handle(&ids)).collect();

        for (conn, _) in conns.iter().rev() {
            registry.subscribe_app("x", conn).await;
        }
        let matched: Vec<_> = registry
            .matching_handles("x", "k")
            .await
            .iter()
            .map(ConnectionHandle::id)
            .collect();
        let mut sorted = matched.clone();
        sorted.sort();
        assert_eq!(matched, sorted);
    }
}
