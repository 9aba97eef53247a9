pub mod conversations;
pub mod messages;
pub mod middleware;

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};

use parley_db::{ChatError, Database};
use parley_gateway::Fanout;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub fanout: Fanout,
}

/// REST error envelope: maps the core taxonomy onto status codes.
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Forbidden => StatusCode::FORBIDDEN,
            ChatError::NotFound => StatusCode::NOT_FOUND,
            ChatError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// The REST surface. Every route requires an authenticated actor; the
/// WebSocket gateway route is mounted separately by the server binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/conversations",
            post(conversations::create_conversation).get(conversations::list_conversations),
        )
        .route(
            "/conversations/{id}",
            delete(conversations::delete_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            get(messages::get_conversation_messages).post(messages::send_conversation_message),
        )
        .route(
            "/global/messages",
            get(messages::get_global_messages).post(messages::send_global_message),
        )
        .layer(axum::middleware::from_fn(middleware::require_auth))
        .with_state(state)
}
