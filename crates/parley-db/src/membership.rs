use parley_types::ids::ConversationId;

use crate::{ChatError, Database};

impl Database {
    /// True iff `username` may read and write the conversation's messages.
    /// The global conversation has no membership rows; every authenticated
    /// user is implicitly a participant.
    pub fn is_participant(
        &self,
        conversation_id: ConversationId,
        username: &str,
    ) -> Result<bool, ChatError> {
        let id = match conversation_id {
            ConversationId::Global => return Ok(true),
            ConversationId::Id(id) => id,
        };

        self.with_conn(|conn| {
            let found: bool = conn.query_row(
                "SELECT EXISTS (
                    SELECT 1 FROM participants
                    WHERE conversation_id = ?1 AND username = ?2
                 )",
                rusqlite::params![id, username],
                |row| row.get(0),
            )?;
            Ok(found)
        })
    }

    /// Membership check that surfaces as an authorization error instead of a
    /// silent empty result.
    pub fn ensure_participant(
        &self,
        conversation_id: ConversationId,
        username: &str,
    ) -> Result<(), ChatError> {
        if self.is_participant(conversation_id, username)? {
            Ok(())
        } else {
            Err(ChatError::Forbidden)
        }
    }
}
