//! Supporter message handlers
//!
//! Eliminated players predict each round's winner with their token and
//! spend a correct token to rejoin the game.

use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{Player, SupporterToken};
use std::sync::Arc;

use super::handlers::broadcast_game_state;
use super::player::player_for_token;

/// Tokens can only be used by the player they were issued to
async fn owned_token(
    state: &Arc<AppState>,
    player: &Player,
    token_id: &str,
) -> GameResult<SupporterToken> {
    let token = state.get_token(token_id).await?;
    if token.player_id != player.id {
        return Err(GameError::Unauthorized(
            "Token belongs to another player".to_string(),
        ));
    }
    Ok(token)
}

pub async fn handle_predict(
    state: &Arc<AppState>,
    player_token: String,
    token_id: String,
    number: u32,
    team_id: String,
) -> GameResult<ServerMessage> {
    let player = player_for_token(state, &player_token).await?;
    owned_token(state, &player, &token_id).await?;
    let token = state.predict(&token_id, number, &team_id).await?;
    Ok(ServerMessage::SupporterToken { token })
}

pub async fn handle_redeem(
    state: &Arc<AppState>,
    player_token: String,
    token_id: String,
) -> GameResult<ServerMessage> {
    let player = player_for_token(state, &player_token).await?;
    owned_token(state, &player, &token_id).await?;
    let outcome = state.redeem_token(&token_id).await?;

    let msg = ServerMessage::SupporterRejoined { outcome };
    state.broadcast_to_all(msg.clone());
    broadcast_game_state(state).await;
    Ok(msg)
}
