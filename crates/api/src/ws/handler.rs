use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use repairlink_core::realtime::{event_kind, RoomRole};
use repairlink_core::types::DbId;

use crate::auth::jwt::{validate_token, JwtConfig};
use crate::state::AppState;
use crate::ws::protocol::{ClientMessage, ServerMessage};
use crate::ws::registry::ConnectionRegistry;

/// HTTP handler that upgrades the connection to WebSocket.
///
/// The socket starts anonymous; it receives events only after a
/// `join_room` message carrying a valid access token.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let registry = Arc::clone(&state.registry);
    let jwt = state.config.jwt.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, registry, jwt))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Registers the connection, forwards queued messages to the sink from a
/// spawned task, processes inbound control messages on the current task and
/// purges the connection from every room on disconnect.
async fn handle_socket(socket: WebSocket, registry: Arc<ConnectionRegistry>, jwt: JwtConfig) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let mut rx = registry.add(conn_id.clone()).await;
    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let reply = process_message(&registry, &jwt, &conn_id, text.as_str()).await;
                send_reply(&registry, &conn_id, &reply).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    registry.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Apply one inbound text frame to the registry and build the reply.
pub async fn process_message(
    registry: &ConnectionRegistry,
    jwt: &JwtConfig,
    conn_id: &str,
    text: &str,
) -> ServerMessage {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => return ServerMessage::error(format!("Malformed message: {e}")),
    };

    match message {
        ClientMessage::JoinRoom { token } => {
            let (role, identity_id) = match room_for_token(&token, jwt) {
                Ok(room) => room,
                Err(reply) => return reply,
            };
            registry.join(conn_id, role, identity_id).await;
            tracing::info!(conn_id, role = role.as_str(), identity_id, "Joined room");
            ServerMessage::RoomJoined { role, identity_id }
        }
        ClientMessage::LeaveRoom { token } => {
            let (role, identity_id) = match room_for_token(&token, jwt) {
                Ok(room) => room,
                Err(reply) => return reply,
            };
            registry.leave(conn_id, role, identity_id).await;
            tracing::info!(conn_id, role = role.as_str(), identity_id, "Left room");
            ServerMessage::RoomLeft { role, identity_id }
        }
        ClientMessage::Subscribe { events } => match known_kinds(&events) {
            Ok(kinds) => match registry.subscribe(conn_id, &kinds).await {
                Some(events) => ServerMessage::Subscriptions { events },
                None => ServerMessage::error("Connection is not registered"),
            },
            Err(reply) => reply,
        },
        ClientMessage::Unsubscribe { events } => match known_kinds(&events) {
            Ok(kinds) => match registry.unsubscribe(conn_id, &kinds).await {
                Some(events) => ServerMessage::Subscriptions { events },
                None => ServerMessage::error("Connection is not registered"),
            },
            Err(reply) => reply,
        },
    }
}

/// Resolve the room an access token grants.
fn room_for_token(token: &str, jwt: &JwtConfig) -> Result<(RoomRole, DbId), ServerMessage> {
    let claims =
        validate_token(token, jwt).map_err(|_| ServerMessage::error("Invalid or expired token"))?;
    let role = RoomRole::from_role(&claims.role)
        .ok_or_else(|| ServerMessage::error(format!("Role '{}' has no room", claims.role)))?;
    Ok((role, claims.sub))
}

fn known_kinds(names: &[String]) -> Result<Vec<&'static str>, ServerMessage> {
    let mut kinds = Vec::with_capacity(names.len());
    let mut unknown = Vec::new();
    for name in names {
        match event_kind(name) {
            Some(kind) => kinds.push(kind),
            None => unknown.push(name.as_str()),
        }
    }
    if unknown.is_empty() {
        Ok(kinds)
    } else {
        Err(ServerMessage::error(format!(
            "Unknown event kinds: {}",
            unknown.join(", ")
        )))
    }
}

async fn send_reply(registry: &ConnectionRegistry, conn_id: &str, reply: &ServerMessage) {
    match serde_json::to_string(reply) {
        Ok(json) => {
            registry
                .send_to_connection(conn_id, Message::Text(json.into()))
                .await;
        }
        Err(e) => tracing::error!(conn_id, error = %e, "Failed to serialize reply"),
    }
}
