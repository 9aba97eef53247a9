use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::OptionalExtension;
use tracing::warn;
use uuid::Uuid;

use parley_types::api::ConversationSummary;
use parley_types::ids::ConversationId;

use crate::models::{ConversationRow, MessageRow};
use crate::{ChatError, Database};

impl Database {
    // -- Conversations --

    /// Insert a conversation plus one participant row per unique username in
    /// `invitees ∪ {creator}`, all in one transaction. A failed participant
    /// insert rolls the conversation back — no orphan with partial
    /// membership.
    pub fn create_conversation(
        &self,
        creator: &str,
        is_group: bool,
        title: Option<&str>,
        invitees: &[String],
    ) -> Result<ConversationRow, ChatError> {
        let members: BTreeSet<&str> = invitees
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(creator))
            .collect();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO conversations (is_group, title, created_by) VALUES (?1, ?2, ?3)",
                rusqlite::params![is_group, title, creator],
            )?;
            let id = tx.last_insert_rowid();

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO participants (conversation_id, username) VALUES (?1, ?2)",
                )?;
                for username in &members {
                    stmt.execute(rusqlite::params![id, username])?;
                }
            }

            tx.commit()?;

            Ok(ConversationRow {
                id,
                is_group,
                title: title.map(str::to_string),
                created_by: creator.to_string(),
            })
        })
    }

    /// All conversations `username` participates in, newest first, with the
    /// direct-chat peer (only when exactly one other participant exists) and
    /// a redacted preview. The synthetic global summary always comes first.
    pub fn list_conversations(&self, username: &str) -> Result<Vec<ConversationSummary>, ChatError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT
                    c.id,
                    c.is_group,
                    c.title,
                    (SELECT CASE WHEN COUNT(DISTINCT p2.username) = 1
                            THEN MIN(p2.username) END
                       FROM participants p2
                      WHERE p2.conversation_id = c.id AND p2.username != ?1),
                    EXISTS (SELECT 1 FROM messages m WHERE m.conversation_id = c.id)
                 FROM conversations c
                 JOIN participants p ON c.id = p.conversation_id
                 WHERE p.username = ?1
                 ORDER BY c.id DESC",
            )?;

            let rows = stmt
                .query_map([username], |row| {
                    let has_messages: bool = row.get(4)?;
                    Ok(ConversationSummary {
                        id: ConversationId::Id(row.get(0)?),
                        is_group: row.get(1)?,
                        title: row.get(2)?,
                        peer_username: row.get(3)?,
                        last_message_preview: has_messages.then(|| "[encrypted]".to_string()),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut summaries = Vec::with_capacity(rows.len() + 1);
            summaries.push(ConversationSummary::global());
            summaries.extend(rows);
            Ok(summaries)
        })
    }

    /// Delete a conversation, its participants and its messages in one
    /// transaction. Only the creator may delete.
    pub fn delete_conversation(&self, id: i64, requester: &str) -> Result<(), ChatError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let created_by: Option<String> = tx
                .query_row(
                    "SELECT created_by FROM conversations WHERE id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;

            let created_by = created_by.ok_or(ChatError::NotFound)?;
            if created_by != requester {
                return Err(ChatError::Forbidden);
            }

            tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [id])?;
            tx.execute("DELETE FROM participants WHERE conversation_id = ?1", [id])?;
            tx.execute("DELETE FROM conversations WHERE id = ?1", [id])?;

            tx.commit()?;
            Ok(())
        })
    }

    // -- Messages --

    /// Insert a message and return it with the store-assigned id and
    /// timestamp. The envelope is stored verbatim and never inspected.
    pub fn insert_message(
        &self,
        conversation_id: Option<i64>,
        sender: &str,
        envelope: &serde_json::Value,
        client_token: Option<Uuid>,
    ) -> Result<MessageRow, ChatError> {
        // Truncate to millisecond precision up front so the returned row,
        // the broadcast event and a later history fetch all carry the same
        // timestamp.
        let ts_text = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let timestamp = ts_text
            .parse::<DateTime<Utc>>()
            .map_err(|e| ChatError::Persistence(e.to_string()))?;
        let envelope_text = serde_json::to_string(envelope)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (conversation_id, sender, content_encrypted, client_token, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    conversation_id,
                    sender,
                    envelope_text,
                    client_token.map(|t| t.to_string()),
                    ts_text,
                ],
            )?;

            Ok(MessageRow {
                id: conn.last_insert_rowid(),
                conversation_id,
                sender: sender.to_string(),
                content_encrypted: envelope.clone(),
                client_token,
                timestamp,
            })
        })
    }

    /// Message history for one conversation (None = global), ordered by
    /// timestamp then id. Timestamps can coincide, the id breaks the tie.
    pub fn list_messages(&self, conversation_id: Option<i64>) -> Result<Vec<MessageRow>, ChatError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender, content_encrypted, client_token, timestamp
                 FROM messages
                 WHERE conversation_id IS ?1
                 ORDER BY timestamp ASC, id ASC",
            )?;

            let rows = stmt
                .query_map([conversation_id], |row| {
                    let id: i64 = row.get(0)?;
                    let envelope_text: String = row.get(3)?;
                    let token_text: Option<String> = row.get(4)?;
                    let ts_text: String = row.get(5)?;
                    Ok(MessageRow {
                        id,
                        conversation_id: row.get(1)?,
                        sender: row.get(2)?,
                        content_encrypted: parse_envelope(id, &envelope_text),
                        client_token: token_text.and_then(|t| parse_token(id, &t)),
                        timestamp: parse_timestamp(id, &ts_text),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn parse_envelope(message_id: i64, text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap_or_else(|e| {
        warn!("Corrupt envelope on message {}: {}", message_id, e);
        serde_json::Value::Null
    })
}

fn parse_token(message_id: i64, text: &str) -> Option<Uuid> {
    text.parse()
        .map_err(|e| warn!("Corrupt client_token on message {}: {}", message_id, e))
        .ok()
}

fn parse_timestamp(message_id: i64, text: &str) -> DateTime<Utc> {
    text.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') default writes "YYYY-MM-DD HH:MM:SS"
            // without a timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on message {}: {}", text, message_id, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn participant_count(db: &Database, id: i64) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM participants WHERE conversation_id = ?1",
                [id],
                |row| row.get(0),
            )?)
        })
        .unwrap()
    }

    #[test]
    fn creation_seeds_creator_and_dedupes_invitees() {
        let db = db();
        let convo = db
            .create_conversation(
                "alice",
                false,
                None,
                &["bob".into(), "bob".into(), "alice".into()],
            )
            .unwrap();

        assert_eq!(participant_count(&db, convo.id), 2);
        assert!(db.is_participant(ConversationId::Id(convo.id), "alice").unwrap());
        assert!(db.is_participant(ConversationId::Id(convo.id), "bob").unwrap());
        assert!(!db.is_participant(ConversationId::Id(convo.id), "mallory").unwrap());
    }

    #[test]
    fn listing_puts_global_first_then_newest() {
        let db = db();
        let a = db.create_conversation("bob", false, Some("one"), &[]).unwrap();
        let b = db.create_conversation("bob", true, Some("two"), &[]).unwrap();

        let summaries = db.list_conversations("bob").unwrap();
        assert_eq!(summaries[0].id, ConversationId::Global);
        assert_eq!(summaries[1].id, ConversationId::Id(b.id));
        assert_eq!(summaries[2].id, ConversationId::Id(a.id));
    }

    #[test]
    fn direct_chat_peer_is_reported_to_both_sides() {
        let db = db();
        let convo = db
            .create_conversation("alice", false, None, &["bob".into()])
            .unwrap();

        let for_bob = db.list_conversations("bob").unwrap();
        let entry = for_bob
            .iter()
            .find(|s| s.id == ConversationId::Id(convo.id))
            .unwrap();
        assert_eq!(entry.peer_username.as_deref(), Some("alice"));

        let for_alice = db.list_conversations("alice").unwrap();
        let entry = for_alice
            .iter()
            .find(|s| s.id == ConversationId::Id(convo.id))
            .unwrap();
        assert_eq!(entry.peer_username.as_deref(), Some("bob"));
    }

    #[test]
    fn group_with_several_others_has_no_peer() {
        let db = db();
        let convo = db
            .create_conversation("alice", true, Some("crew"), &["bob".into(), "carol".into()])
            .unwrap();

        let summaries = db.list_conversations("alice").unwrap();
        let entry = summaries
            .iter()
            .find(|s| s.id == ConversationId::Id(convo.id))
            .unwrap();
        assert_eq!(entry.peer_username, None);
    }

    #[test]
    fn preview_is_redacted_and_absent_when_empty() {
        let db = db();
        let convo = db
            .create_conversation("alice", false, None, &["bob".into()])
            .unwrap();

        let before = db.list_conversations("alice").unwrap();
        let entry = before
            .iter()
            .find(|s| s.id == ConversationId::Id(convo.id))
            .unwrap();
        assert_eq!(entry.last_message_preview, None);

        db.insert_message(Some(convo.id), "alice", &json!({"iv": [1], "ct": "x"}), None)
            .unwrap();

        let after = db.list_conversations("alice").unwrap();
        let entry = after
            .iter()
            .find(|s| s.id == ConversationId::Id(convo.id))
            .unwrap();
        assert_eq!(entry.last_message_preview.as_deref(), Some("[encrypted]"));
    }

    #[test]
    fn envelope_round_trips_verbatim() {
        let db = db();
        let envelope = json!({"iv": [1, 2, 3], "ct": "hi", "extra": {"nested": true}});

        let stored = db.insert_message(None, "alice", &envelope, None).unwrap();
        assert_eq!(stored.content_encrypted, envelope);

        let history = db.list_messages(None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content_encrypted, envelope);
        assert_eq!(history[0].sender, "alice");
    }

    #[test]
    fn history_orders_by_timestamp_then_id() {
        let db = db();
        let convo = db.create_conversation("alice", false, None, &[]).unwrap();

        // Insert out of order with explicit timestamps; id 2 predates id 1.
        db.with_conn(|conn| {
            conn.execute_batch(&format!(
                "INSERT INTO messages (conversation_id, sender, content_encrypted, timestamp)
                 VALUES ({id}, 'alice', '{{}}', '2024-01-01T00:00:02.000Z');
                 INSERT INTO messages (conversation_id, sender, content_encrypted, timestamp)
                 VALUES ({id}, 'alice', '{{}}', '2024-01-01T00:00:01.000Z');
                 INSERT INTO messages (conversation_id, sender, content_encrypted, timestamp)
                 VALUES ({id}, 'alice', '{{}}', '2024-01-01T00:00:01.000Z');",
                id = convo.id
            ))?;
            Ok(())
        })
        .unwrap();

        let history = db.list_messages(Some(convo.id)).unwrap();
        let ids: Vec<i64> = history.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn global_and_concrete_histories_are_disjoint() {
        let db = db();
        let convo = db.create_conversation("alice", false, None, &[]).unwrap();

        db.insert_message(None, "alice", &json!({"ct": "global"}), None).unwrap();
        db.insert_message(Some(convo.id), "alice", &json!({"ct": "direct"}), None)
            .unwrap();

        assert_eq!(db.list_messages(None).unwrap().len(), 1);
        assert_eq!(db.list_messages(Some(convo.id)).unwrap().len(), 1);
    }

    #[test]
    fn delete_requires_creator_and_leaves_rows_intact_on_failure() {
        let db = db();
        let convo = db
            .create_conversation("alice", false, None, &["bob".into()])
            .unwrap();
        db.insert_message(Some(convo.id), "bob", &json!({"ct": "x"}), None)
            .unwrap();

        let err = db.delete_conversation(convo.id, "bob").unwrap_err();
        assert!(matches!(err, ChatError::Forbidden));

        assert_eq!(participant_count(&db, convo.id), 2);
        assert_eq!(db.list_messages(Some(convo.id)).unwrap().len(), 1);

        let err = db.delete_conversation(999, "alice").unwrap_err();
        assert!(matches!(err, ChatError::NotFound));
    }

    #[test]
    fn delete_cascades_messages_and_participants() {
        let db = db();
        let convo = db
            .create_conversation("alice", false, None, &["bob".into()])
            .unwrap();
        db.insert_message(Some(convo.id), "alice", &json!({"ct": "x"}), None)
            .unwrap();

        db.delete_conversation(convo.id, "alice").unwrap();

        assert_eq!(participant_count(&db, convo.id), 0);
        assert_eq!(db.list_messages(Some(convo.id)).unwrap().len(), 0);
        assert!(!db.is_participant(ConversationId::Id(convo.id), "alice").unwrap());
    }

    #[test]
    fn append_to_deleted_conversation_fails_cleanly() {
        let db = db();
        let convo = db.create_conversation("alice", false, None, &[]).unwrap();
        db.delete_conversation(convo.id, "alice").unwrap();

        // The foreign key makes the racing append fail rather than orphaning
        // a row; the delete itself stayed atomic.
        let err = db
            .insert_message(Some(convo.id), "alice", &json!({"ct": "late"}), None)
            .unwrap_err();
        assert!(matches!(err, ChatError::Persistence(_)));
    }

    #[test]
    fn client_token_survives_persistence() {
        let db = db();
        let token = Uuid::new_v4();
        db.insert_message(None, "alice", &json!({"ct": "x"}), Some(token))
            .unwrap();

        let history = db.list_messages(None).unwrap();
        assert_eq!(history[0].client_token, Some(token));
    }
}
