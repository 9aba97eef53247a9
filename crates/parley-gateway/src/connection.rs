use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, Stream, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{info, trace, warn};
use uuid::Uuid;

use parley_types::api::Claims;
use parley_types::events::{GatewayCommand, GatewayEvent};

use crate::Fanout;

/// A socket that connects but never identifies is dropped after this long.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection: identify handshake, then the
/// join/send command loop with events fanned back from the room registry.
pub async fn handle_connection(socket: WebSocket, fanout: Fanout, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let username = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(username) => username,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} connected to gateway", username);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        username: username.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    let rooms = fanout.rooms().clone();
    let (conn_id, mut event_rx) = rooms.register().await;

    // Forward registry events -> client
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let text = serde_json::to_string(&event).unwrap();
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Client commands -> registry/fanout
    let recv_rooms = rooms.clone();
    let recv_username = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else { continue };

            let command: GatewayCommand = match serde_json::from_str(&text) {
                Ok(cmd) => cmd,
                Err(e) => {
                    warn!("{}: unparseable gateway command: {}", recv_username, e);
                    continue;
                }
            };

            handle_command(command, conn_id, &recv_username, &recv_rooms, &fanout).await;
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    rooms.disconnect(conn_id).await;
    info!("{} disconnected from gateway", username);
}

async fn handle_command(
    command: GatewayCommand,
    conn_id: Uuid,
    username: &str,
    rooms: &crate::RoomRegistry,
    fanout: &Fanout,
) {
    match command {
        GatewayCommand::Identify { .. } => {
            trace!("{} sent a redundant Identify", username);
        }

        GatewayCommand::Join { conversation_id } => {
            rooms.join(conn_id, conversation_id).await;
        }

        GatewayCommand::Send {
            conversation_id,
            content_encrypted,
            client_token,
        } => {
            // Spawned so a slow store cannot stall the command loop; the
            // fanout itself guarantees a persisted send still broadcasts.
            let fanout = fanout.clone();
            let rooms = rooms.clone();
            let sender = username.to_string();
            tokio::spawn(async move {
                if let Err(e) = fanout
                    .send(conversation_id, &sender, content_encrypted, client_token)
                    .await
                {
                    warn!("{}: send to {} failed: {}", sender, conversation_id, e);
                    rooms
                        .send_to(
                            conn_id,
                            GatewayEvent::Error {
                                code: error_code(&e).to_string(),
                                message: e.to_string(),
                            },
                        )
                        .await;
                }
            });
        }
    }
}

fn error_code(e: &parley_db::ChatError) -> &'static str {
    use parley_db::ChatError;
    match e {
        ChatError::Validation(_) => "validation",
        ChatError::Forbidden => "forbidden",
        ChatError::NotFound => "not_found",
        ChatError::Persistence(_) => "persistence",
    }
}

/// Read frames until the client identifies with a valid JWT. Any other
/// command before Identify closes the connection, and so does staying
/// silent past IDENTIFY_TIMEOUT.
async fn wait_for_identify<S>(receiver: &mut S, jwt_secret: &str) -> Option<String>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else { continue };

            let command: GatewayCommand = serde_json::from_str(&text).ok()?;
            let GatewayCommand::Identify { token } = command else {
                return None;
            };

            let token_data = decode::<Claims>(
                &token,
                &DecodingKey::from_secret(jwt_secret.as_bytes()),
                &Validation::default(),
            )
            .ok()?;

            return Some(token_data.claims.sub);
        }

        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify)
        .await
        .ok()
        .flatten()
}
