use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use parley_db::models::MessageRow;
use parley_db::{ChatError, Database};
use parley_types::events::GatewayEvent;
use parley_types::ids::ConversationId;

/// Persist-then-broadcast coordinator. This is the single send entry point:
/// the REST handler and the WebSocket `Send` command both call it exactly
/// once per logical send, so one user action is one stored row and one
/// broadcast event.
#[derive(Clone)]
pub struct Fanout {
    db: Arc<Database>,
    rooms: super::RoomRegistry,
}

impl Fanout {
    pub fn new(db: Arc<Database>, rooms: super::RoomRegistry) -> Self {
        Self { db, rooms }
    }

    pub fn rooms(&self) -> &super::RoomRegistry {
        &self.rooms
    }

    /// Validate, authorize, persist, broadcast — in that order. A failure at
    /// any step reaches the caller only: nothing is broadcast unless the row
    /// is durable.
    ///
    /// The work runs in its own task: a caller whose future is dropped after
    /// the row has been persisted (an aborted HTTP request, a dropped
    /// connection) cannot leave a stored message that joined peers were
    /// never told about.
    pub async fn send(
        &self,
        conversation_id: ConversationId,
        sender: &str,
        envelope: Option<serde_json::Value>,
        client_token: Option<Uuid>,
    ) -> Result<MessageRow, ChatError> {
        let envelope = match envelope {
            Some(v) if !v.is_null() => v,
            _ => {
                return Err(ChatError::Validation(
                    "missing content_encrypted".to_string(),
                ));
            }
        };

        let this = self.clone();
        let sender = sender.to_string();
        tokio::spawn(async move {
            this.persist_and_broadcast(conversation_id, sender, envelope, client_token)
                .await
        })
        .await
        .map_err(|e| ChatError::Persistence(format!("send task join error: {}", e)))?
    }

    async fn persist_and_broadcast(
        &self,
        conversation_id: ConversationId,
        sender: String,
        envelope: serde_json::Value,
        client_token: Option<Uuid>,
    ) -> Result<MessageRow, ChatError> {
        // Run blocking DB work off the async runtime
        let db = self.db.clone();
        let row = tokio::task::spawn_blocking(move || {
            db.ensure_participant(conversation_id, &sender)?;
            db.insert_message(conversation_id.db_key(), &sender, &envelope, client_token)
        })
        .await
        .map_err(|e| ChatError::Persistence(format!("spawn_blocking join error: {}", e)))??;

        let delivered = self
            .rooms
            .broadcast(
                conversation_id,
                GatewayEvent::Message {
                    id: row.id,
                    conversation_id,
                    sender: row.sender.clone(),
                    content_encrypted: row.content_encrypted.clone(),
                    timestamp: row.timestamp,
                    client_token: row.client_token,
                },
            )
            .await;

        debug!(
            "message {} fanned out to {} connections in {}",
            row.id,
            delivered,
            conversation_id.room_name()
        );

        Ok(row)
    }
}
