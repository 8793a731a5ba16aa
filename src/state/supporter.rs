//! Supporter tokens: eliminated players predict the round outcome and may
//! rejoin the game on a correct guess.
//!
//! Lifecycle: issued (active, no prediction) -> predicted (active) ->
//! evaluated (inactive, verdict set) -> redeemed (`used_at` set, correct only).

use super::team::{active_team_sizes, retire_if_empty, smallest_team};
use super::{active_game, settings_for, AppState};
use crate::error::{GameError, GameResult};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub round_number: u32,
    pub total: usize,
    pub correct: usize,
    pub winners: Vec<SupporterToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejoinOutcome {
    pub player: Player,
    pub team: Team,
    pub token: SupporterToken,
}

fn has_active_token(
    tokens: &HashMap<TokenId, SupporterToken>,
    player_id: &str,
    game_id: &str,
    round_number: u32,
) -> bool {
    tokens.values().any(|t| {
        t.is_active && t.player_id == player_id && t.game_id == game_id && t.round_number == round_number
    })
}

/// Players without an active team who hold no active token for `round_number`
pub fn eliminated_player_ids(
    teams: &HashMap<TeamId, Team>,
    players: &HashMap<PlayerId, Player>,
    tokens: &HashMap<TokenId, SupporterToken>,
    game_id: &str,
    round_number: u32,
) -> Vec<PlayerId> {
    let mut eliminated: Vec<&Player> = players
        .values()
        .filter(|p| p.game_id == game_id)
        .filter(|p| {
            let on_active_team = p
                .team_id
                .as_ref()
                .and_then(|id| teams.get(id))
                .is_some_and(|t| t.is_active);
            !on_active_team && !has_active_token(tokens, &p.id, game_id, round_number)
        })
        .collect();
    eliminated.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    eliminated.into_iter().map(|p| p.id.clone()).collect()
}

/// Hand a token to every eliminated player that lacks one. Returns how many were issued.
pub(crate) fn issue_tokens_locked(
    tokens: &mut HashMap<TokenId, SupporterToken>,
    teams: &HashMap<TeamId, Team>,
    players: &HashMap<PlayerId, Player>,
    game_id: &str,
    round_number: u32,
    now: DateTime<Utc>,
) -> usize {
    let eligible = eliminated_player_ids(teams, players, tokens, game_id, round_number);
    for player_id in &eligible {
        let token = SupporterToken {
            id: new_id(),
            player_id: player_id.clone(),
            game_id: game_id.to_string(),
            round_number,
            is_active: true,
            predicted_number: None,
            predicted_team_id: None,
            is_prediction_correct: None,
            used_at: None,
            created_at: now,
            updated_at: now,
        };
        tokens.insert(token.id.clone(), token);
    }
    eligible.len()
}

/// Judge every active token of the round. A missing winner (tie) makes every prediction wrong.
pub(crate) fn evaluate_tokens_locked(
    tokens: &mut HashMap<TokenId, SupporterToken>,
    game_id: &str,
    round_number: u32,
    winner_team_id: Option<&str>,
    winning_number: Option<u32>,
    now: DateTime<Utc>,
) -> EvaluationSummary {
    let mut summary = EvaluationSummary {
        round_number,
        ..Default::default()
    };

    for token in tokens
        .values_mut()
        .filter(|t| t.is_active && t.game_id == game_id && t.round_number == round_number)
    {
        let correct = match (winner_team_id, winning_number) {
            (Some(team_id), Some(number)) => {
                token.predicted_team_id.as_deref() == Some(team_id)
                    && token.predicted_number == Some(number)
            }
            _ => false,
        };
        token.is_prediction_correct = Some(correct);
        token.is_active = false;
        token.updated_at = now;

        summary.total += 1;
        if correct {
            summary.correct += 1;
            summary.winners.push(token.clone());
        }
    }
    summary
        .winners
        .sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    if summary.total > 0 {
        tracing::info!(
            "Evaluated {} supporter predictions for round {}, {} correct",
            summary.total,
            round_number,
            summary.correct
        );
    }
    summary
}

impl AppState {
    /// Issue tokens for the round's eliminated players, then list the round's active tokens
    pub async fn issue_supporter_tokens(
        &self,
        game_id: &str,
        round_number: u32,
    ) -> GameResult<Vec<SupporterToken>> {
        let games = self.games.read().await;
        let teams = self.teams.read().await;
        let players = self.players.read().await;
        let mut tokens = self.tokens.write().await;
        active_game(&games, game_id)?;

        let issued = issue_tokens_locked(
            &mut tokens,
            &teams,
            &players,
            game_id,
            round_number,
            self.now(),
        );
        if issued > 0 {
            tracing::info!("Issued {} supporter tokens for round {}", issued, round_number);
        }

        let mut active: Vec<SupporterToken> = tokens
            .values()
            .filter(|t| t.is_active && t.game_id == game_id && t.round_number == round_number)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(active)
    }

    pub async fn get_token(&self, token_id: &str) -> GameResult<SupporterToken> {
        self.tokens
            .read()
            .await
            .get(token_id)
            .cloned()
            .ok_or_else(|| GameError::not_found("Supporter token"))
    }

    /// The player's newest token that can still take a prediction
    pub async fn active_token_for_player(&self, player_id: &str) -> Option<SupporterToken> {
        self.tokens
            .read()
            .await
            .values()
            .filter(|t| t.is_active && t.player_id == player_id)
            .max_by_key(|t| t.round_number)
            .cloned()
    }

    /// Correct, unused tokens the player can redeem
    pub async fn redeemable_tokens_for_player(&self, player_id: &str) -> Vec<SupporterToken> {
        self.tokens
            .read()
            .await
            .values()
            .filter(|t| {
                t.player_id == player_id
                    && t.is_prediction_correct == Some(true)
                    && t.used_at.is_none()
            })
            .cloned()
            .collect()
    }

    /// Record or overwrite a prediction on an active token
    pub async fn predict(
        &self,
        token_id: &str,
        number: u32,
        team_id: &str,
    ) -> GameResult<SupporterToken> {
        let settings = self.settings.read().await;
        let teams = self.teams.read().await;
        let mut tokens = self.tokens.write().await;

        let token = tokens
            .get_mut(token_id)
            .ok_or_else(|| GameError::not_found("Supporter token"))?;
        if !token.is_active {
            return Err(GameError::InvalidTokenState(
                "Token has already been evaluated".to_string(),
            ));
        }

        let settings = settings_for(&settings, &token.game_id);
        if !settings.contains_number(number) {
            let (min, max) = settings.effective_number_range();
            return Err(GameError::validation(format!(
                "Number must be between {} and {}",
                min, max
            )));
        }
        let team = teams
            .get(team_id)
            .filter(|t| t.game_id == token.game_id)
            .ok_or_else(|| GameError::not_found("Team"))?;
        if !team.is_active {
            return Err(GameError::validation(format!(
                "Team '{}' is no longer in the game",
                team.name
            )));
        }

        token.predicted_number = Some(number);
        token.predicted_team_id = Some(team_id.to_string());
        token.updated_at = self.now();

        tracing::info!(
            "Supporter {} predicts {} for '{}'",
            token.player_id,
            number,
            team.name
        );
        Ok(token.clone())
    }

    /// Evaluate all pending predictions of a round against its outcome
    pub async fn evaluate_predictions(
        &self,
        game_id: &str,
        round_number: u32,
        winner_team_id: Option<&str>,
        winning_number: Option<u32>,
    ) -> GameResult<EvaluationSummary> {
        let games = self.games.read().await;
        let mut tokens = self.tokens.write().await;
        active_game(&games, game_id)?;

        Ok(evaluate_tokens_locked(
            &mut tokens,
            game_id,
            round_number,
            winner_team_id,
            winning_number,
            self.now(),
        ))
    }

    /// Spend a correct token: the player rejoins the smallest active team
    pub async fn redeem_token(&self, token_id: &str) -> GameResult<RejoinOutcome> {
        let outcome = {
            let games = self.games.read().await;
            let mut teams = self.teams.write().await;
            let mut players = self.players.write().await;
            let mut tokens = self.tokens.write().await;

            let token = tokens
                .get_mut(token_id)
                .ok_or_else(|| GameError::not_found("Supporter token"))?;
            if token.is_prediction_correct != Some(true) {
                return Err(GameError::InvalidTokenState(
                    "Only a correct prediction can be redeemed".to_string(),
                ));
            }
            if token.used_at.is_some() {
                return Err(GameError::InvalidTokenState(
                    "Token has already been redeemed".to_string(),
                ));
            }
            active_game(&games, &token.game_id)?;

            let sizes = active_team_sizes(&teams, &players, &token.game_id);
            let team_id = smallest_team(&sizes)
                .map(|s| s.team_id.clone())
                .ok_or_else(|| GameError::validation("No active team left to join"))?;

            let player = players
                .get_mut(&token.player_id)
                .ok_or_else(|| GameError::not_found("Player"))?;
            let previous_team_id = player.team_id.replace(team_id.clone());
            player.is_active = true;
            let player = player.clone();

            if let Some(previous) = previous_team_id.filter(|id| *id != team_id) {
                retire_if_empty(&mut teams, &players, &previous);
            }

            let now = self.now();
            token.used_at = Some(now);
            token.updated_at = now;

            RejoinOutcome {
                player,
                team: teams[&team_id].clone(),
                token: token.clone(),
            }
        };

        let description = format!(
            "{} rejoined as a supporter in '{}'",
            outcome.player.nickname, outcome.team.name
        );
        tracing::info!("{}", description);
        self.record_action(&outcome.token.game_id, "supporter_rejoin", description)
            .await;
        Ok(outcome)
    }
}
