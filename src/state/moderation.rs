use super::{active_game, active_team_sizes, AppState};
use crate::error::GameResult;
use crate::types::*;
use serde::{Deserialize, Serialize};

const RECENT_ACTIONS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStats {
    pub active_players: usize,
    pub active_teams: usize,
    pub current_round: u32,
    pub state: GameState,
    pub is_paused: bool,
    /// Active supporter tokens still waiting for evaluation
    pub unused_tokens: usize,
    pub recent_actions: Vec<ModeratorAction>,
}

impl AppState {
    /// Append an entry to the moderator log
    pub async fn record_action(&self, game_id: &str, action_type: &str, description: String) {
        let action = ModeratorAction {
            id: new_id(),
            game_id: game_id.to_string(),
            action_type: action_type.to_string(),
            description,
            created_at: self.now(),
        };
        self.actions.write().await.push(action);
    }

    /// Newest first
    pub async fn recent_actions(&self, game_id: &str, limit: usize) -> Vec<ModeratorAction> {
        self.actions
            .read()
            .await
            .iter()
            .rev()
            .filter(|a| a.game_id == game_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn stats(&self, game_id: &str) -> GameResult<GameStats> {
        let (state, is_paused, current_round) = {
            let games = self.games.read().await;
            let game = active_game(&games, game_id)?;
            (game.state, game.is_paused, game.current_round)
        };

        let (active_players, active_teams) = {
            let teams = self.teams.read().await;
            let players = self.players.read().await;
            let sizes = active_team_sizes(&teams, &players, game_id);
            (sizes.iter().map(|s| s.members).sum(), sizes.len())
        };

        let unused_tokens = self
            .tokens
            .read()
            .await
            .values()
            .filter(|t| t.game_id == game_id && t.is_active)
            .count();

        Ok(GameStats {
            active_players,
            active_teams,
            current_round,
            state,
            is_paused,
            unused_tokens,
            recent_actions: self.recent_actions(game_id, RECENT_ACTIONS).await,
        })
    }
}
