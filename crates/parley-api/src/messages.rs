use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::error;

use parley_db::ChatError;
use parley_db::models::MessageRow;
use parley_types::api::{Claims, MessageResponse, SendMessageRequest, SendMessageResponse};
use parley_types::ids::ConversationId;

use crate::{ApiError, AppState};

pub async fn get_conversation_messages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    fetch_history(state, ConversationId::Id(id), claims).await
}

pub async fn get_global_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    fetch_history(state, ConversationId::Global, claims).await
}

pub async fn send_conversation_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    send(state, ConversationId::Id(id), claims, req).await
}

pub async fn send_global_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    send(state, ConversationId::Global, claims, req).await
}

/// History read: membership guard first, then the ordered rows. A failed
/// guard is a 403, never an empty list.
async fn fetch_history(
    state: AppState,
    conversation_id: ConversationId,
    claims: Claims,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let db = state.db.clone();

    let rows = tokio::task::spawn_blocking(move || {
        db.ensure_participant(conversation_id, &claims.sub)?;
        db.list_messages(conversation_id.db_key())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ChatError::Persistence(e.to_string())
    })??;

    let messages = rows
        .into_iter()
        .map(|row| to_response(row, conversation_id))
        .collect();

    Ok(Json(messages))
}

/// Sends go through the fanout coordinator: one persisted row, one broadcast,
/// shared with the WebSocket path.
async fn send(
    state: AppState,
    conversation_id: ConversationId,
    claims: Claims,
    req: SendMessageRequest,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let row = state
        .fanout
        .send(conversation_id, &claims.sub, req.content_encrypted, req.client_token)
        .await?;

    Ok(Json(SendMessageResponse { id: row.id }))
}

fn to_response(row: MessageRow, conversation_id: ConversationId) -> MessageResponse {
    MessageResponse {
        id: row.id,
        conversation_id,
        sender: row.sender,
        content_encrypted: row.content_encrypted,
        timestamp: row.timestamp,
        client_token: row.client_token,
    }
}
