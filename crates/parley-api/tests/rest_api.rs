//! REST boundary tests: drives the full router (auth middleware included)
//! against an in-memory store.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

use parley_api::{AppState, AppStateInner, router};
use parley_db::Database;
use parley_gateway::{Fanout, RoomRegistry};
use parley_types::api::Claims;
use parley_types::ids::ConversationId;

fn test_app() -> (Router, AppState) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let rooms = RoomRegistry::new();
    let fanout = Fanout::new(db.clone(), rooms);
    let state: AppState = Arc::new(AppStateInner { db, fanout });
    (router(state.clone()), state)
}

fn token_for(username: &str) -> String {
    let claims = Claims {
        sub: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"dev-secret-change-me"),
    )
    .unwrap()
}

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("authorization", format!("Bearer {}", token_for(user)));
    }
    match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let (app, _) = test_app();
    let response = app
        .oneshot(request("GET", "/conversations", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn direct_conversation_shows_the_peer_to_the_invitee() {
    let (app, _) = test_app();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/conversations",
            Some("alice"),
            Some(json!({"is_group": false, "participants": ["bob"]})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let id = created["id"].as_i64().unwrap();

    let response = app
        .oneshot(request("GET", "/conversations", Some("bob"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    let list = list.as_array().unwrap();

    // Global summary always leads
    assert_eq!(list[0]["id"], json!("global"));

    let entry = list
        .iter()
        .find(|s| s["id"] == json!(id))
        .expect("bob should see the conversation");
    assert_eq!(entry["peer_username"], json!("alice"));
    assert_eq!(entry["last_message_preview"], Value::Null);
}

#[tokio::test]
async fn global_send_and_history_round_trip() {
    let (app, _) = test_app();

    let envelope = json!({"iv": [1, 2, 3], "ct": "hi"});
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/global/messages",
            Some("alice"),
            Some(json!({"content_encrypted": envelope})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let sent = body_json(response).await;
    assert!(sent["id"].is_i64());

    let response = app
        .oneshot(request("GET", "/global/messages", Some("bob"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history = body_json(response).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["sender"], json!("alice"));
    assert_eq!(history[0]["content_encrypted"], envelope);
    assert_eq!(history[0]["conversation_id"], json!("global"));
}

#[tokio::test]
async fn missing_envelope_is_a_400_and_nothing_is_stored() {
    let (app, state) = test_app();

    let response = app
        .oneshot(request(
            "POST",
            "/global/messages",
            Some("alice"),
            Some(json!({})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.db.list_messages(None).unwrap().len(), 0);
}

#[tokio::test]
async fn non_participants_get_403_not_an_empty_list() {
    let (app, state) = test_app();
    let convo = state
        .db
        .create_conversation("alice", false, None, &[])
        .unwrap();

    let uri = format!("/conversations/{}/messages", convo.id);
    let response = app
        .clone()
        .oneshot(request("GET", &uri, Some("bob"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(request(
            "POST",
            &uri,
            Some("bob"),
            Some(json!({"content_encrypted": {"ct": "x"}})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(state.db.list_messages(Some(convo.id)).unwrap().len(), 0);
}

#[tokio::test]
async fn delete_is_creator_only() {
    let (app, state) = test_app();
    let convo = state
        .db
        .create_conversation("alice", false, None, &["bob".into()])
        .unwrap();
    let uri = format!("/conversations/{}", convo.id);

    let response = app
        .clone()
        .oneshot(request("DELETE", &uri, Some("bob"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(request("DELETE", "/conversations/999", Some("alice"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(request("DELETE", &uri, Some("alice"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        !state
            .db
            .is_participant(ConversationId::Id(convo.id), "bob")
            .unwrap()
    );
}

#[tokio::test]
async fn rest_send_broadcasts_to_joined_connections() {
    let (app, state) = test_app();

    let (conn, mut rx) = state.fanout.rooms().register().await;
    state.fanout.rooms().join(conn, ConversationId::Global).await;

    let response = app
        .oneshot(request(
            "POST",
            "/global/messages",
            Some("alice"),
            Some(json!({"content_encrypted": {"ct": "live"}})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    match rx.try_recv().unwrap() {
        parley_types::events::GatewayEvent::Message { sender, .. } => {
            assert_eq!(sender, "alice");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(rx.try_recv().is_err(), "exactly one broadcast per send");
}
