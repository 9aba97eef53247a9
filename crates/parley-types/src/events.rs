use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::ConversationId;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { username: String },

    /// A new encrypted message was posted to a room this connection joined
    Message {
        id: i64,
        /// As addressed by the sender, including the `"global"` literal.
        conversation_id: ConversationId,
        sender: String,
        content_encrypted: serde_json::Value,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_token: Option<Uuid>,
    },

    /// A command from this connection failed. Sent to the offending
    /// connection only, never broadcast.
    Error { code: String, message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection. Must be the first frame.
    Identify { token: String },

    /// Join the fanout room of a conversation. Idempotent.
    Join { conversation_id: ConversationId },

    /// Persist and broadcast a message. Sender identity comes from the
    /// authenticated connection, the timestamp from the store.
    Send {
        conversation_id: ConversationId,
        #[serde(default)]
        content_encrypted: Option<serde_json::Value>,
        #[serde(default)]
        client_token: Option<Uuid>,
    },
}
