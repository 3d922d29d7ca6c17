use kvfeed_protocol::{ClientEvent, ServerEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::core::connection::{ConnectionHandle, ConnectionId, ConnectionIds};
use crate::core::registry::SubscriptionRegistry;

/// Keeps the registry in step with client connections: hands out identities,
/// applies control events, and cleans up once per disconnect.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    registry: Arc<SubscriptionRegistry>,
    ids: ConnectionIds,
    outbound_queue: usize,
}

impl ConnectionLifecycle {
    pub fn new(registry: Arc<SubscriptionRegistry>, outbound_queue: usize) -> Self {
        ConnectionLifecycle {
            registry,
            ids: ConnectionIds::new(),
            outbound_queue,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// A fresh identity and outbound queue for a newly accepted connection.
    pub fn open(&self) -> (Session, mpsc::Receiver<ServerEvent>) {
        let id = self.ids.next_id();
        let (handle, rx) = ConnectionHandle::channel(id, self.outbound_queue);
        info!(conn_id = %id, "client connected");
        (Session { handle }, rx)
    }

    pub async fn apply(&self, session: &Session, event: ClientEvent) {
        let conn = &session.handle;
        match event {
            ClientEvent::SubscribeKey { app_id, key } => {
                self.registry.subscribe_key(&app_id, &key, conn).await;
            }
            ClientEvent::UnsubscribeKey { app_id, key } => {
                self.registry.unsubscribe_key(&app_id, &key, conn.id()).await;
            }
            ClientEvent::SubscribeApp { app_id } => {
                self.registry.subscribe_app(&app_id, conn).await;
            }
            ClientEvent::UnsubscribeApp { app_id } => {
                self.registry.unsubscribe_app(&app_id, conn.id()).await;
            }
        }
    }

    /// The disconnect hook. Consumes the session, so it runs once per
    /// connection.
    pub async fn close(&self, session: Session, reason: &str) {
        let id = session.id();
        drop(session);
        let dropped = self.registry.drop_connection(id).await;
        info!(conn_id = %id, dropped, reason, "client disconnected");
    }
}

/// One open client connection.
#[derive(Debug)]
pub struct Session {
    handle: ConnectionHandle,
}

impl Session {
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }
}
