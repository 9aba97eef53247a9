use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::ConversationId;

// -- JWT Claims --

/// JWT claims shared across parley-api (REST middleware) and parley-gateway
/// (WebSocket identify handshake). Identity is an opaque username; credential
/// handling and token issuance live outside this system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateConversationResponse {
    pub id: i64,
    pub title: Option<String>,
    pub is_group: bool,
}

/// One entry of the conversation list. The preview is always redacted: the
/// literal `"[encrypted]"` when any message exists, never the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub is_group: bool,
    pub title: Option<String>,
    pub peer_username: Option<String>,
    pub last_message_preview: Option<String>,
}

impl ConversationSummary {
    /// Synthetic summary for the global conversation, always listed first.
    pub fn global() -> Self {
        Self {
            id: ConversationId::Global,
            is_group: true,
            title: Some("Global conversation".to_string()),
            peer_username: None,
            last_message_preview: Some("[global chat]".to_string()),
        }
    }
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Opaque encrypted envelope, stored verbatim. `None`/null is rejected
    /// before anything is persisted.
    #[serde(default)]
    pub content_encrypted: Option<serde_json::Value>,
    /// Client-generated idempotency token, echoed through both the response
    /// and the broadcast so receivers can de-duplicate across transports.
    #[serde(default)]
    pub client_token: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: i64,
    pub conversation_id: ConversationId,
    pub sender: String,
    pub content_encrypted: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<Uuid>,
}
