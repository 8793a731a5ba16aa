//! WebSocket message dispatch
//!
//! This module provides the main entry point for handling client messages.
//! Authorization is checked here, then dispatched to role-specific handler modules.

use crate::error::{GameError, GameResult};
use crate::protocol::{ClientMessage, ServerMessage, TeamInfo};
use crate::state::AppState;
use crate::types::Role;
use std::sync::Arc;

use super::{moderator, player, supporter};

/// Macro to check moderator authorization and return early if unauthorized
macro_rules! check_moderator {
    ($role:expr, $action:expr) => {
        if *$role != Role::Moderator {
            return Some(
                GameError::Unauthorized(format!("Only the moderator can {}", $action)).into(),
            );
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    role: &Role,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        // Player messages
        ClientMessage::RegisterPlayer { name } => {
            respond(player::handle_register_player(state, name).await)
        }

        ClientMessage::SubmitVote {
            player_token,
            number,
        } => respond(player::handle_submit_vote(state, player_token, number).await),

        // Supporter messages
        ClientMessage::SupporterPredict {
            player_token,
            token_id,
            number,
            team_id,
        } => respond(
            supporter::handle_predict(state, player_token, token_id, number, team_id).await,
        ),

        ClientMessage::RedeemToken {
            player_token,
            token_id,
        } => respond(supporter::handle_redeem(state, player_token, token_id).await),

        // Read-only queries, open to every role
        ClientMessage::GetSettings => respond(settings_message(state).await),

        ClientMessage::GetGameState => respond(game_state_message(state).await),

        ClientMessage::GetRoundStatus => respond(vote_status_message(state).await),

        // Moderator-only commands (authorization checked before dispatch)
        ClientMessage::ModPairPlayers {
            player1_id,
            player2_id,
        } => {
            check_moderator!(role, "pair players");
            respond(moderator::handle_pair_players(state, player1_id, player2_id).await)
        }

        ClientMessage::ModStartPairing => {
            check_moderator!(role, "start pairing");
            respond(moderator::handle_start_pairing(state).await)
        }

        ClientMessage::ModStartPlaying => {
            check_moderator!(role, "start the game");
            respond(moderator::handle_start_playing(state).await)
        }

        ClientMessage::ModStartRound => {
            check_moderator!(role, "start rounds");
            respond(moderator::handle_start_round(state).await)
        }

        ClientMessage::ModFinalizeRound => {
            check_moderator!(role, "finalize rounds");
            respond(moderator::handle_finalize_round(state).await)
        }

        ClientMessage::ModAnswerQuiz { is_correct, answer } => {
            check_moderator!(role, "judge quiz answers");
            respond(moderator::handle_answer_quiz(state, is_correct, answer).await)
        }

        ClientMessage::ModStealPlayer {
            source_team_id,
            target_team_id,
            player_id,
        } => {
            check_moderator!(role, "steal players");
            respond(
                moderator::handle_steal_player(state, source_team_id, target_team_id, player_id)
                    .await,
            )
        }

        ClientMessage::ModMovePlayer { player_id, team_id } => {
            check_moderator!(role, "move players");
            respond(moderator::handle_move_player(state, player_id, team_id).await)
        }

        ClientMessage::ModAutoBalance => {
            check_moderator!(role, "balance teams");
            respond(moderator::handle_auto_balance(state).await)
        }

        ClientMessage::ModCheckBalance => {
            check_moderator!(role, "check team balance");
            respond(moderator::handle_check_balance(state).await)
        }

        ClientMessage::ModTogglePause => {
            check_moderator!(role, "pause the game");
            respond(moderator::handle_toggle_pause(state).await)
        }

        ClientMessage::ModDrinkBreak {
            message,
            duration_seconds,
        } => {
            check_moderator!(role, "call a drink break");
            respond(moderator::handle_drink_break(state, message, duration_seconds).await)
        }

        ClientMessage::ModResumeGame => {
            check_moderator!(role, "resume the game");
            respond(moderator::handle_resume_game(state).await)
        }

        ClientMessage::ModIssueTokens { round_number } => {
            check_moderator!(role, "issue supporter tokens");
            respond(moderator::handle_issue_tokens(state, round_number).await)
        }

        ClientMessage::ModEvaluatePredictions {
            round_number,
            winner_team_id,
            winning_number,
        } => {
            check_moderator!(role, "evaluate predictions");
            respond(
                moderator::handle_evaluate_predictions(
                    state,
                    round_number,
                    winner_team_id,
                    winning_number,
                )
                .await,
            )
        }

        ClientMessage::ModUpdateSettings { update } => {
            check_moderator!(role, "change settings");
            respond(moderator::handle_update_settings(state, update).await)
        }

        ClientMessage::ModApplyPreset { preset } => {
            check_moderator!(role, "apply presets");
            respond(moderator::handle_apply_preset(state, preset).await)
        }

        ClientMessage::ModResetGame => {
            check_moderator!(role, "reset the game");
            respond(moderator::handle_reset_game(state).await)
        }

        ClientMessage::ModEndGame => {
            check_moderator!(role, "end the game");
            respond(moderator::handle_end_game(state).await)
        }

        ClientMessage::ModStats => {
            check_moderator!(role, "view stats");
            respond(moderator::handle_stats(state).await)
        }

        ClientMessage::ModAddQuizQuestion {
            question,
            answer,
            category,
        } => {
            check_moderator!(role, "add quiz questions");
            respond(moderator::handle_add_quiz_question(state, question, answer, category).await)
        }
    }
}

/// Turn a handler result into the reply for the sender
fn respond(result: GameResult<ServerMessage>) -> Option<ServerMessage> {
    match result {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::debug!("Rejected client message: {} ({})", e, e.code());
            Some(e.into())
        }
    }
}

/// Active teams of a game with their active members, by position
pub async fn team_infos(state: &AppState, game_id: &str) -> Vec<TeamInfo> {
    let teams = state.list_teams(game_id).await;
    let players = state.list_players(game_id).await;
    teams
        .iter()
        .filter(|t| t.is_active)
        .map(|t| TeamInfo::build(t, &players))
        .collect()
}

pub async fn game_state_message(state: &AppState) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let game = state.get_game(&game_id).await?;
    let teams = team_infos(state, &game_id).await;
    Ok(ServerMessage::GameState { game, teams })
}

async fn settings_message(state: &AppState) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let settings = state.get_settings(&game_id).await?;
    Ok(ServerMessage::Settings { settings })
}

/// Per-team voting progress of the current round
pub async fn vote_status_message(state: &AppState) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let status = state.round_status(&game_id).await?;
    let round = status
        .round
        .ok_or_else(|| GameError::validation("No round has been started yet"))?;
    Ok(ServerMessage::VoteStatus {
        round_id: round.id,
        teams: status.teams,
        seconds_remaining: status.seconds_remaining,
    })
}

/// Everything a reconnecting phone needs to restore its screen
pub async fn player_state_message(
    state: &AppState,
    player_token: &str,
) -> GameResult<ServerMessage> {
    let player = state
        .get_player_by_token(player_token)
        .await
        .ok_or_else(|| GameError::Unauthorized("Unknown player token".to_string()))?;

    let team = match player.team_id.as_deref() {
        Some(team_id) if player.is_active => team_infos(state, &player.game_id)
            .await
            .into_iter()
            .find(|t| t.id == team_id),
        _ => None,
    };
    let active_token = state.active_token_for_player(&player.id).await;
    let redeemable_tokens = state.redeemable_tokens_for_player(&player.id).await;

    Ok(ServerMessage::PlayerState {
        player,
        team,
        active_token,
        redeemable_tokens,
    })
}

/// Broadcast the refreshed game state to every client
pub async fn broadcast_game_state(state: &AppState) {
    match game_state_message(state).await {
        Ok(msg) => state.broadcast_to_all(msg),
        Err(e) => tracing::warn!("Could not build game state broadcast: {}", e),
    }
}
