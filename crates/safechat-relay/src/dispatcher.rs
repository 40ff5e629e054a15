use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use safechat_types::events::RelayEvent;

/// Registry of live relay connections, keyed by user id.
///
/// One user may hold several connections at once (multiple tabs or devices);
/// an event addressed to a user goes to every one of them. Connect and
/// disconnect of unrelated users only contend on the outer map lock, held
/// for the duration of a single map mutation.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// user_id -> connection_id -> per-connection sender
    connections: RwLock<HashMap<i64, HashMap<Uuid, mpsc::UnboundedSender<RelayEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open connection for `user_id`. Returns the connection id
    /// to pass back to `unregister` on disconnect.
    pub async fn register(&self, user_id: i64, tx: mpsc::UnboundedSender<RelayEvent>) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner
            .connections
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        conn_id
    }

    /// Drop a single connection. The user's entry disappears with its last
    /// connection.
    pub async fn unregister(&self, user_id: i64, conn_id: Uuid) {
        let mut map = self.inner.connections.write().await;
        if let Some(conns) = map.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                map.remove(&user_id);
            }
        }
    }

    /// Deliver an event to every open connection of `user_id`. Returns how
    /// many connections actually received it; zero means the event was
    /// dropped — there is no pending-delivery queue.
    pub async fn send_to_user(&self, user_id: i64, event: RelayEvent) -> usize {
        let map = self.inner.connections.read().await;
        let Some(conns) = map.get(&user_id) else {
            return 0;
        };

        let mut delivered = 0;
        for tx in conns.values() {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of open connections for `user_id`.
    pub async fn connection_count(&self, user_id: i64) -> usize {
        self.inner
            .connections
            .read()
            .await
            .get(&user_id)
            .map_or(0, HashMap::len)
    }
}
