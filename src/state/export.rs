//! State export/import for quick and dirty state restoration.
//!
//! This module provides serializable snapshots of the full application state
//! for backup and restoration during the reception.

use super::AppState;
use crate::error::{GameError, GameResult};
use crate::settings::GameSettings;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Schema version for export format compatibility
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// A serializable snapshot of the entire game state.
///
/// Excludes runtime-only components:
/// - Broadcast channels (recreated at startup)
/// - Clock and default settings (reconstructed from config)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStateExport {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    pub current_game_id: Option<GameId>,
    pub games: HashMap<GameId, Game>,
    /// Settings per game
    pub settings: HashMap<GameId, GameSettings>,
    pub rounds: HashMap<RoundId, Round>,
    pub teams: HashMap<TeamId, Team>,
    pub players: HashMap<PlayerId, Player>,
    pub votes: HashMap<VoteId, Vote>,
    pub tokens: HashMap<TokenId, SupporterToken>,
    /// Quiz pool (persists across games)
    #[serde(default)]
    pub quiz_questions: Vec<QuizQuestion>,
    #[serde(default)]
    pub actions: Vec<ModeratorAction>,
}

impl GameStateExport {
    /// Validate the export before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }

        if let Some(ref game_id) = self.current_game_id {
            if !self.games.contains_key(game_id) {
                return Err(format!(
                    "current_game_id '{}' not found in export",
                    game_id
                ));
            }
        }

        for game in self.games.values() {
            if let Some(ref round_id) = game.current_round_id {
                if !self.rounds.contains_key(round_id) {
                    return Err(format!(
                        "Game '{}' references current_round_id '{}' but round not found in export",
                        game.id, round_id
                    ));
                }
            }
        }

        for (round_id, round) in &self.rounds {
            if !self.games.contains_key(&round.game_id) {
                return Err(format!(
                    "Round '{}' references game '{}' which doesn't exist",
                    round_id, round.game_id
                ));
            }
        }

        for (team_id, team) in &self.teams {
            if !self.games.contains_key(&team.game_id) {
                return Err(format!(
                    "Team '{}' references game '{}' which doesn't exist",
                    team_id, team.game_id
                ));
            }
        }

        for (player_id, player) in &self.players {
            if !self.games.contains_key(&player.game_id) {
                return Err(format!(
                    "Player '{}' references game '{}' which doesn't exist",
                    player_id, player.game_id
                ));
            }
            if let Some(ref team_id) = player.team_id {
                if !self.teams.contains_key(team_id) {
                    return Err(format!(
                        "Player '{}' references team '{}' which doesn't exist",
                        player_id, team_id
                    ));
                }
            }
        }

        for (vote_id, vote) in &self.votes {
            if !self.rounds.contains_key(&vote.round_id) {
                return Err(format!(
                    "Vote '{}' references round '{}' which doesn't exist",
                    vote_id, vote.round_id
                ));
            }
            if !self.players.contains_key(&vote.player_id) {
                return Err(format!(
                    "Vote '{}' references player '{}' which doesn't exist",
                    vote_id, vote.player_id
                ));
            }
        }

        for (token_id, token) in &self.tokens {
            if !self.players.contains_key(&token.player_id) {
                return Err(format!(
                    "Token '{}' references player '{}' which doesn't exist",
                    token_id, token.player_id
                ));
            }
        }

        Ok(())
    }
}

impl AppState {
    /// Snapshot everything
    pub async fn export_state(&self) -> GameStateExport {
        let current_game_id = self.current_game_id.read().await.clone();
        let games = self.games.read().await.clone();
        let settings = self.settings.read().await.clone();
        let rounds = self.rounds.read().await.clone();
        let teams = self.teams.read().await.clone();
        let players = self.players.read().await.clone();
        let votes = self.votes.read().await.clone();
        let tokens = self.tokens.read().await.clone();
        let quiz_questions = self.quiz_questions.read().await.clone();
        let actions = self.actions.read().await.clone();

        GameStateExport {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: self.now(),
            current_game_id,
            games,
            settings,
            rounds,
            teams,
            players,
            votes,
            tokens,
            quiz_questions,
            actions,
        }
    }

    /// Replace all state with the snapshot
    pub async fn import_state(&self, export: GameStateExport) -> Result<(), String> {
        export.validate()?;

        let mut current_game_id = self.current_game_id.write().await;
        let mut games = self.games.write().await;
        let mut settings = self.settings.write().await;
        let mut rounds = self.rounds.write().await;
        let mut teams = self.teams.write().await;
        let mut players = self.players.write().await;
        let mut votes = self.votes.write().await;
        let mut tokens = self.tokens.write().await;
        let mut quiz_questions = self.quiz_questions.write().await;
        let mut actions = self.actions.write().await;

        *current_game_id = export.current_game_id;
        *games = export.games;
        *settings = export.settings;
        *rounds = export.rounds;
        *teams = export.teams;
        *players = export.players;
        *votes = export.votes;
        *tokens = export.tokens;
        *quiz_questions = export.quiz_questions;
        *actions = export.actions;

        tracing::info!(
            "Imported state: {} games, {} teams, {} players",
            games.len(),
            teams.len(),
            players.len()
        );
        Ok(())
    }

    /// Write the snapshot as JSON, via a temp file so a crash never leaves half a file
    pub async fn save_snapshot(&self, path: &Path) -> GameResult<()> {
        let export = self.export_state().await;
        let json = serde_json::to_vec_pretty(&export)
            .map_err(|e| GameError::validation(format!("Failed to serialize snapshot: {}", e)))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| GameError::validation(format!("Failed to write snapshot: {}", e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| GameError::validation(format!("Failed to move snapshot: {}", e)))?;
        Ok(())
    }

    /// Load a snapshot file if it exists. Returns whether anything was imported.
    pub async fn load_snapshot(&self, path: &Path) -> GameResult<bool> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(GameError::validation(format!(
                    "Failed to read snapshot: {}",
                    e
                )))
            }
        };
        let export: GameStateExport = serde_json::from_slice(&data)
            .map_err(|e| GameError::validation(format!("Invalid snapshot: {}", e)))?;
        self.import_state(export).await.map_err(GameError::Validation)?;
        Ok(true)
    }
}
