use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::error;

use parley_db::ChatError;
use parley_types::api::{
    Claims, ConversationSummary, CreateConversationRequest, CreateConversationResponse,
};

use crate::{ApiError, AppState};

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<CreateConversationResponse>, ApiError> {
    let db = state.db.clone();
    let creator = claims.sub;

    // Run blocking DB work off the async runtime
    let row = tokio::task::spawn_blocking(move || {
        db.create_conversation(&creator, req.is_group, req.title.as_deref(), &req.participants)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ChatError::Persistence(e.to_string())
    })??;

    Ok(Json(CreateConversationResponse {
        id: row.id,
        title: row.title,
        is_group: row.is_group,
    }))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let db = state.db.clone();

    let summaries = tokio::task::spawn_blocking(move || db.list_conversations(&claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ChatError::Persistence(e.to_string())
        })??;

    Ok(Json(summaries))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let db = state.db.clone();

    tokio::task::spawn_blocking(move || db.delete_conversation(id, &claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ChatError::Persistence(e.to_string())
        })??;

    Ok(StatusCode::OK)
}
