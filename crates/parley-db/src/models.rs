/// Database row types — these map directly to SQLite rows.
/// Distinct from the parley-types wire models to keep the DB layer
/// independent.
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct ConversationRow {
    pub id: i64,
    pub is_group: bool,
    pub title: Option<String>,
    pub created_by: String,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: i64,
    /// None for the global conversation.
    pub conversation_id: Option<i64>,
    pub sender: String,
    pub content_encrypted: serde_json::Value,
    pub client_token: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}
