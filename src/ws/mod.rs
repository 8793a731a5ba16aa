pub mod handlers;
pub mod moderator;
pub mod player;
pub mod supporter;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    Extension,
};
use futures::{sink::SinkExt, stream::SplitSink, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::auth::AuthConfig;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::Role;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
    /// Player session token for reconnects
    pub token: Option<String>,
    /// Moderator secret
    pub secret: Option<String>,
}

/// Pick the connection role. Moderator needs the right secret, everyone else
/// without a known role is treated as a player.
pub fn resolve_role(params: &WsQuery, auth: &AuthConfig) -> Role {
    match params.role.as_deref() {
        Some("moderator") => {
            if params.secret.as_deref().is_some_and(|s| auth.verify(s)) {
                Role::Moderator
            } else {
                tracing::warn!("Moderator connection without valid secret, downgraded to player");
                Role::Player
            }
        }
        Some("screen") => Role::Screen,
        _ => Role::Player,
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Arc<AuthConfig>>,
) -> impl IntoResponse {
    tracing::info!(
        "WebSocket connection request: role={:?}, reconnect={}",
        params.role,
        params.token.is_some()
    );

    let role = resolve_role(&params, &auth);
    ws.on_upgrade(move |socket| handle_socket(socket, role, params.token, state))
}

async fn send_json(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            true
        }
    }
}

/// Wait on an optional role channel; connections without one wait forever
async fn recv_optional(
    rx: &mut Option<broadcast::Receiver<ServerMessage>>,
) -> Option<ServerMessage> {
    match rx {
        Some(rx) => rx.recv().await.ok(),
        None => std::future::pending::<Option<ServerMessage>>().await,
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    role: Role,
    player_token: Option<String>,
    state: Arc<AppState>,
) {
    let (mut sender, mut receiver) = socket.split();

    tracing::info!("WebSocket connected with role: {:?}", role);

    // Ensure a game exists
    let game = match state.get_current_game().await {
        Some(g) => Some(g),
        None => {
            tracing::warn!("No game found, creating one");
            Some(state.create_game().await)
        }
    };

    let welcome = ServerMessage::Welcome {
        protocol: "1.0".to_string(),
        role: role.clone(),
        game,
        server_now: state.now().to_rfc3339(),
    };
    if !send_json(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message");
        return;
    }

    // Reconnecting phones get their player state right away
    if role == Role::Player {
        if let Some(token) = player_token.as_deref() {
            let msg = handlers::player_state_message(&state, token)
                .await
                .unwrap_or_else(ServerMessage::from);
            if !send_json(&mut sender, &msg).await {
                return;
            }
        }
    }

    // Subscribe to general broadcast (all clients)
    let mut broadcast_rx = state.broadcast.subscribe();

    let mut moderator_rx = if role == Role::Moderator {
        Some(state.moderator_broadcast.subscribe())
    } else {
        None
    };

    let mut screen_rx = if role == Role::Screen {
        Some(state.screen_broadcast.subscribe())
    } else {
        None
    };

    loop {
        tokio::select! {
            broadcast_msg = broadcast_rx.recv() => {
                match broadcast_msg {
                    Ok(msg) => {
                        if !send_json(&mut sender, &msg).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Client lagged behind, skipped {} messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            Some(msg) = recv_optional(&mut moderator_rx) => {
                if !send_json(&mut sender, &msg).await {
                    break;
                }
            }

            Some(msg) = recv_optional(&mut screen_rx) => {
                if !send_json(&mut sender, &msg).await {
                    break;
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::handle_message(client_msg, &role, &state).await
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                Some(ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                })
                            }
                        };
                        if let Some(response) = response {
                            if !send_json(&mut sender, &response).await {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!("WebSocket connection closed for role: {:?}", role);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(role: Option<&str>, secret: Option<&str>) -> WsQuery {
        WsQuery {
            role: role.map(String::from),
            token: None,
            secret: secret.map(String::from),
        }
    }

    #[test]
    fn test_resolve_role() {
        let auth = AuthConfig::new("bouquet");
        assert_eq!(
            resolve_role(&query(Some("moderator"), Some("bouquet")), &auth),
            Role::Moderator
        );
        assert_eq!(
            resolve_role(&query(Some("moderator"), Some("wrong")), &auth),
            Role::Player
        );
        assert_eq!(resolve_role(&query(Some("moderator"), None), &auth), Role::Player);
        assert_eq!(resolve_role(&query(Some("screen"), None), &auth), Role::Screen);
        assert_eq!(resolve_role(&query(None, None), &auth), Role::Player);
        assert_eq!(resolve_role(&query(Some("host"), None), &auth), Role::Player);
    }
}
