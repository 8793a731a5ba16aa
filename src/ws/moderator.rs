//! Moderator message handlers
//!
//! Game flow control, team management and supporter token administration.
//! Handlers reply to the moderator and broadcast the resulting changes.

use crate::error::{GameError, GameResult};
use crate::protocol::{ServerMessage, TeamInfo};
use crate::settings::{Preset, SettingsUpdate};
use crate::state::{AppState, RoundResult};
use crate::types::{PlayerId, Round, TeamId};
use std::sync::Arc;

use super::handlers::{broadcast_game_state, game_state_message};

pub async fn handle_pair_players(
    state: &Arc<AppState>,
    player1_id: PlayerId,
    player2_id: PlayerId,
) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let team = state
        .pair_players(&game_id, &player1_id, &player2_id)
        .await?;
    let players = state.list_players(&game_id).await;

    let msg = ServerMessage::TeamCreated {
        team: TeamInfo::build(&team, &players),
    };
    state.broadcast_to_all(msg.clone());
    Ok(msg)
}

pub async fn handle_start_pairing(state: &Arc<AppState>) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    state.start_pairing(&game_id).await?;
    broadcast_game_state(state).await;
    game_state_message(state).await
}

pub async fn handle_start_playing(state: &Arc<AppState>) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let round = state.start_playing(&game_id).await?;
    announce_round_started(state, &game_id, round).await
}

pub async fn handle_start_round(state: &Arc<AppState>) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let round = state.start_round(&game_id).await?;
    announce_round_started(state, &game_id, round).await
}

/// Tell everyone about the new round and hand out its supporter tokens
async fn announce_round_started(
    state: &Arc<AppState>,
    game_id: &str,
    round: Round,
) -> GameResult<ServerMessage> {
    let msg = ServerMessage::RoundStarted {
        round: round.clone(),
    };
    state.broadcast_to_all(msg.clone());
    broadcast_game_state(state).await;

    let tokens = state.issue_supporter_tokens(game_id, round.number).await?;
    if !tokens.is_empty() {
        state.broadcast_to_all(ServerMessage::SupporterTokens {
            round_number: round.number,
            tokens,
        });
    }
    Ok(msg)
}

pub async fn handle_finalize_round(state: &Arc<AppState>) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let round = state
        .get_current_round(&game_id)
        .await
        .ok_or_else(|| GameError::validation("No round has been started yet"))?;
    let result = finalize_and_announce(state, &game_id, &round.id).await?;
    Ok(ServerMessage::RoundResult { result })
}

/// Close a round's voting and broadcast the outcome.
///
/// Used by the moderator command and by the voting deadline watcher.
pub async fn finalize_and_announce(
    state: &Arc<AppState>,
    game_id: &str,
    round_id: &str,
) -> GameResult<RoundResult> {
    let result = state.finalize_round(game_id, round_id).await?;

    state.broadcast_to_all(ServerMessage::RoundResult {
        result: result.clone(),
    });
    if result.predictions.total > 0 {
        state.broadcast_to_moderator(ServerMessage::PredictionsEvaluated {
            summary: result.predictions.clone(),
        });
    }
    broadcast_game_state(state).await;
    Ok(result)
}

pub async fn handle_answer_quiz(
    state: &Arc<AppState>,
    is_correct: bool,
    answer: Option<String>,
) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let outcome = state.answer_quiz(&game_id, is_correct, answer).await?;

    let msg = ServerMessage::QuizAnswered { outcome };
    state.broadcast_to_all(msg.clone());
    broadcast_game_state(state).await;
    Ok(msg)
}

pub async fn handle_steal_player(
    state: &Arc<AppState>,
    source_team_id: TeamId,
    target_team_id: TeamId,
    player_id: PlayerId,
) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let outcome = state
        .steal_player(&game_id, &source_team_id, &target_team_id, &player_id)
        .await?;

    let msg = ServerMessage::PlayerStolen { outcome };
    state.broadcast_to_all(msg.clone());
    broadcast_game_state(state).await;
    Ok(msg)
}

pub async fn handle_move_player(
    state: &Arc<AppState>,
    player_id: PlayerId,
    team_id: TeamId,
) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let outcome = state.move_player(&game_id, &player_id, &team_id).await?;

    let msg = ServerMessage::PlayerMoved { outcome };
    state.broadcast_to_all(msg.clone());
    broadcast_game_state(state).await;
    Ok(msg)
}

pub async fn handle_auto_balance(state: &Arc<AppState>) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let outcome = state.auto_balance(&game_id).await?;

    let msg = ServerMessage::Rebalanced { outcome };
    state.broadcast_to_all(msg.clone());
    broadcast_game_state(state).await;
    Ok(msg)
}

pub async fn handle_check_balance(state: &Arc<AppState>) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let report = state.check_balance(&game_id).await?;
    Ok(ServerMessage::Balance { report })
}

pub async fn handle_toggle_pause(state: &Arc<AppState>) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let is_paused = state.toggle_pause(&game_id).await?;

    let msg = ServerMessage::PauseUpdate { is_paused };
    state.broadcast_to_all(msg.clone());
    Ok(msg)
}

pub async fn handle_drink_break(
    state: &Arc<AppState>,
    message: Option<String>,
    duration_seconds: Option<u32>,
) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let drink_break = state
        .drink_break(&game_id, message.as_deref(), duration_seconds)
        .await?;

    let msg = ServerMessage::DrinkBreak { drink_break };
    state.broadcast_to_all(msg.clone());
    Ok(msg)
}

pub async fn handle_resume_game(state: &Arc<AppState>) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let game = state.resume_game(&game_id).await?;

    let msg = ServerMessage::PauseUpdate {
        is_paused: game.is_paused,
    };
    state.broadcast_to_all(msg.clone());
    Ok(msg)
}

pub async fn handle_issue_tokens(
    state: &Arc<AppState>,
    round_number: Option<u32>,
) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let round_number = match round_number {
        Some(n) => n,
        None => state.get_game(&game_id).await?.current_round,
    };
    if round_number == 0 {
        return Err(GameError::validation("No round has been started yet"));
    }

    let tokens = state.issue_supporter_tokens(&game_id, round_number).await?;
    Ok(ServerMessage::SupporterTokens {
        round_number,
        tokens,
    })
}

pub async fn handle_evaluate_predictions(
    state: &Arc<AppState>,
    round_number: u32,
    winner_team_id: Option<TeamId>,
    winning_number: Option<u32>,
) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let summary = state
        .evaluate_predictions(
            &game_id,
            round_number,
            winner_team_id.as_deref(),
            winning_number,
        )
        .await?;
    Ok(ServerMessage::PredictionsEvaluated { summary })
}

pub async fn handle_update_settings(
    state: &Arc<AppState>,
    update: SettingsUpdate,
) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let settings = state.update_settings(&game_id, update).await?;

    let msg = ServerMessage::Settings { settings };
    state.broadcast_to_all(msg.clone());
    Ok(msg)
}

pub async fn handle_apply_preset(
    state: &Arc<AppState>,
    preset: Preset,
) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let settings = state.apply_preset(&game_id, preset).await?;

    let msg = ServerMessage::Settings { settings };
    state.broadcast_to_all(msg.clone());
    Ok(msg)
}

pub async fn handle_reset_game(state: &Arc<AppState>) -> GameResult<ServerMessage> {
    let game = state.reset_game().await;

    let msg = ServerMessage::GameReset { game };
    state.broadcast_to_all(msg.clone());
    Ok(msg)
}

pub async fn handle_end_game(state: &Arc<AppState>) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    state.end_game(&game_id).await?;
    broadcast_game_state(state).await;
    game_state_message(state).await
}

pub async fn handle_stats(state: &Arc<AppState>) -> GameResult<ServerMessage> {
    let game_id = state.current_game_id().await?;
    let stats = state.stats(&game_id).await?;
    Ok(ServerMessage::Stats { stats })
}

pub async fn handle_add_quiz_question(
    state: &Arc<AppState>,
    question: String,
    answer: String,
    category: Option<String>,
) -> GameResult<ServerMessage> {
    let question = state
        .add_quiz_question(&question, &answer, category.as_deref().unwrap_or_default())
        .await?;
    Ok(ServerMessage::QuizQuestionAdded { question })
}
