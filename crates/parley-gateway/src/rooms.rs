use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::trace;
use uuid::Uuid;

use parley_types::events::GatewayEvent;
use parley_types::ids::ConversationId;

/// Maps conversations to the live connections currently joined to them and
/// fans events out to a room. Shared across every connection task; all state
/// lives behind this registry, nothing is process-global.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// conn_id -> event sender for that connection's forwarding task
    connections: RwLock<HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>,

    /// room name -> member conn_ids
    rooms: RwLock<HashMap<String, HashSet<Uuid>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connections: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a live connection. Returns its id and the receiving end the
    /// connection task forwards to the socket.
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Attach a connection to a conversation's room. Joining twice has no
    /// additional effect.
    pub async fn join(&self, conn_id: Uuid, conversation_id: ConversationId) {
        let room = conversation_id.room_name();
        let mut rooms = self.inner.rooms.write().await;
        if rooms.entry(room.clone()).or_default().insert(conn_id) {
            trace!("connection {} joined {}", conn_id, room);
        }
    }

    /// Deliver an event to every connection joined to the conversation's
    /// room, the sender's own connection included. Dead peers are skipped.
    /// Returns how many connections the event was handed to.
    pub async fn broadcast(&self, conversation_id: ConversationId, event: GatewayEvent) -> usize {
        let room = conversation_id.room_name();
        let rooms = self.inner.rooms.read().await;
        let Some(members) = rooms.get(&room) else {
            return 0;
        };

        let connections = self.inner.connections.read().await;
        let mut delivered = 0;
        for conn_id in members {
            if let Some(tx) = connections.get(conn_id) {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Send an event to one connection only (command error replies).
    pub async fn send_to(&self, conn_id: Uuid, event: GatewayEvent) {
        let connections = self.inner.connections.read().await;
        if let Some(tx) = connections.get(&conn_id) {
            let _ = tx.send(event);
        }
    }

    /// Implicit leave: drop the connection from every room and forget its
    /// sender.
    pub async fn disconnect(&self, conn_id: Uuid) {
        self.inner.connections.write().await.remove(&conn_id);

        let mut rooms = self.inner.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
