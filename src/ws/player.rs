//! Player message handlers
//!
//! Registration and voting from the guests' phones.

use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::Player;
use std::sync::Arc;

/// Resolve a session token to its player
pub(super) async fn player_for_token(
    state: &Arc<AppState>,
    player_token: &str,
) -> GameResult<Player> {
    state
        .get_player_by_token(player_token)
        .await
        .ok_or_else(|| GameError::Unauthorized("Unknown player token".to_string()))
}

pub async fn handle_register_player(
    state: &Arc<AppState>,
    name: String,
) -> GameResult<ServerMessage> {
    tracing::info!("Player registration: {}", name);
    let game_id = state.current_game_id().await?;
    let player = state.register_player(&game_id, &name).await?;

    let joined = ServerMessage::PlayerJoined {
        player_id: player.id.clone(),
        nickname: player.nickname.clone(),
    };
    state.broadcast_to_moderator(joined.clone());
    state.broadcast_to_screens(joined);

    Ok(ServerMessage::PlayerRegistered { player })
}

pub async fn handle_submit_vote(
    state: &Arc<AppState>,
    player_token: String,
    number: u32,
) -> GameResult<ServerMessage> {
    let player = player_for_token(state, &player_token).await?;
    let receipt = state
        .submit_vote(&player.game_id, &player.id, number)
        .await?;
    Ok(ServerMessage::VoteAccepted { receipt })
}
