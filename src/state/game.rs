use super::{active_game_mut, active_team_sizes, AppState};
use crate::error::{GameError, GameResult};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DRINK_BREAK_MESSAGE: &str = "Drink break! 🍻";
pub const DEFAULT_DRINK_BREAK_SECONDS: u32 = 60;
pub const MAX_DRINK_BREAK_SECONDS: u32 = 30 * 60;

/// An announced pause, with how many guests were told about it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrinkBreak {
    pub message: String,
    pub duration_seconds: u32,
    pub started_at: DateTime<Utc>,
    pub teams_notified: usize,
    pub players_notified: usize,
}

impl AppState {
    /// Initialize a new game and make it the current one
    pub async fn create_game(&self) -> Game {
        let game = Game {
            id: new_id(),
            version: 1,
            state: GameState::Registration,
            current_round: 0,
            current_round_id: None,
            is_paused: false,
            is_active: true,
            protections: Vec::new(),
            created_at: self.now(),
        };

        let mut current = self.current_game_id.write().await;
        self.games
            .write()
            .await
            .insert(game.id.clone(), game.clone());
        self.settings
            .write()
            .await
            .insert(game.id.clone(), self.default_settings.clone());
        *current = Some(game.id.clone());

        tracing::info!("Created game {}", game.id);
        game
    }

    pub async fn get_game(&self, game_id: &str) -> GameResult<Game> {
        self.games
            .read()
            .await
            .get(game_id)
            .cloned()
            .ok_or_else(|| GameError::not_found("Game"))
    }

    /// Get the game clients currently join, if any
    pub async fn get_current_game(&self) -> Option<Game> {
        let game_id = self.current_game_id.read().await.clone()?;
        self.games.read().await.get(&game_id).cloned()
    }

    /// Check if a game state transition is valid
    fn is_valid_state_transition(from: GameState, to: GameState) -> bool {
        use GameState::*;

        match (from, to) {
            (Registration, Pairing) => true,
            (Registration, Playing) | (Pairing, Playing) => true,
            (Playing, Quiz) | (Quiz, Playing) => true,
            (_, Finished) => from != Finished,
            _ => false,
        }
    }

    /// Apply a state transition to an already locked game
    pub(crate) fn transition_locked(game: &mut Game, to: GameState) -> GameResult<()> {
        if game.state == to {
            return Ok(());
        }
        if !Self::is_valid_state_transition(game.state, to) {
            return Err(GameError::validation(format!(
                "Invalid game state transition from {:?} to {:?}",
                game.state, to
            )));
        }
        game.state = to;
        game.version += 1;
        Ok(())
    }

    /// Registration -> pairing
    pub async fn start_pairing(&self, game_id: &str) -> GameResult<Game> {
        let mut games = self.games.write().await;
        let game = active_game_mut(&mut games, game_id)?;
        Self::transition_locked(game, GameState::Pairing)?;
        tracing::info!("Game {} entered pairing", game_id);
        Ok(game.clone())
    }

    /// Start playing and open round 1
    pub async fn start_playing(&self, game_id: &str) -> GameResult<Round> {
        let round = self.open_round(game_id, true).await?;
        tracing::info!("Game {} started playing", game_id);
        Ok(round)
    }

    /// Toggle the pause flag, returning the new value
    pub async fn toggle_pause(&self, game_id: &str) -> GameResult<bool> {
        let is_paused = {
            let mut games = self.games.write().await;
            let game = active_game_mut(&mut games, game_id)?;
            game.is_paused = !game.is_paused;
            game.version += 1;
            game.is_paused
        };

        let (action, description) = if is_paused {
            ("pause_game", "Game paused")
        } else {
            ("resume_game", "Game resumed")
        };
        self.record_action(game_id, action, description.to_string())
            .await;
        tracing::info!("Game {} paused={}", game_id, is_paused);
        Ok(is_paused)
    }

    /// Pause the game for an announced drink break
    pub async fn drink_break(
        &self,
        game_id: &str,
        message: Option<&str>,
        duration_seconds: Option<u32>,
    ) -> GameResult<DrinkBreak> {
        let message = match message.map(str::trim) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => DEFAULT_DRINK_BREAK_MESSAGE.to_string(),
        };
        let duration_seconds = duration_seconds.unwrap_or(DEFAULT_DRINK_BREAK_SECONDS);
        if !(1..=MAX_DRINK_BREAK_SECONDS).contains(&duration_seconds) {
            return Err(GameError::validation(format!(
                "Drink break must last between 1 and {} seconds",
                MAX_DRINK_BREAK_SECONDS
            )));
        }

        let drink_break = {
            let mut games = self.games.write().await;
            let teams = self.teams.read().await;
            let players = self.players.read().await;

            let game = active_game_mut(&mut games, game_id)?;
            if game.state == GameState::Finished {
                return Err(GameError::validation("Game is already finished"));
            }
            game.is_paused = true;
            game.version += 1;

            let sizes = active_team_sizes(&teams, &players, game_id);
            DrinkBreak {
                message,
                duration_seconds,
                started_at: self.now(),
                teams_notified: sizes.len(),
                players_notified: sizes.iter().map(|s| s.members).sum(),
            }
        };

        tracing::info!(
            "Drink break in game {} for {}s: {}",
            game_id,
            drink_break.duration_seconds,
            drink_break.message
        );
        self.record_action(
            game_id,
            "drink_break",
            format!("{} ({}s)", drink_break.message, drink_break.duration_seconds),
        )
        .await;
        Ok(drink_break)
    }

    /// Lift a pause, e.g. after a drink break
    pub async fn resume_game(&self, game_id: &str) -> GameResult<Game> {
        let game = {
            let mut games = self.games.write().await;
            let game = active_game_mut(&mut games, game_id)?;
            if !game.is_paused {
                return Err(GameError::validation("Game is not paused"));
            }
            game.is_paused = false;
            game.version += 1;
            game.clone()
        };

        self.record_action(game_id, "resume_game", "Game resumed after break".to_string())
            .await;
        tracing::info!("Game {} resumed", game_id);
        Ok(game)
    }

    pub async fn end_game(&self, game_id: &str) -> GameResult<Game> {
        let mut games = self.games.write().await;
        let game = active_game_mut(&mut games, game_id)?;
        Self::transition_locked(game, GameState::Finished)?;
        tracing::info!("Game {} finished", game_id);
        Ok(game.clone())
    }

    /// Deactivate the current game with its teams and players, then start a fresh one
    pub async fn reset_game(&self) -> Game {
        if let Some(old_id) = self.current_game_id.read().await.clone() {
            let mut games = self.games.write().await;
            let mut teams = self.teams.write().await;
            let mut players = self.players.write().await;

            if let Some(game) = games.get_mut(&old_id) {
                game.is_active = false;
                game.version += 1;
            }
            for team in teams.values_mut().filter(|t| t.game_id == old_id) {
                team.is_active = false;
            }
            for player in players.values_mut().filter(|p| p.game_id == old_id) {
                player.is_active = false;
            }
            tracing::info!("Reset game {}", old_id);
        }

        let game = self.create_game().await;
        self.record_action(&game.id, "reset_game", "Game reset".to_string())
            .await;
        game
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::fixture;
    use super::*;

    #[tokio::test]
    async fn test_start_pairing() {
        let fx = fixture().await;
        let game = fx.state.start_pairing(&fx.game_id).await.unwrap();
        assert_eq!(game.state, GameState::Pairing);

        // Not again from pairing
        let result = fx.state.start_pairing(&fx.game_id).await;
        assert!(result.is_ok(), "same-state transition is a no-op");
    }

    #[tokio::test]
    async fn test_start_playing_requires_team() {
        let fx = fixture().await;
        let result = fx.state.start_playing(&fx.game_id).await;
        assert!(matches!(result, Err(GameError::Validation(_))));
    }

    #[tokio::test]
    async fn test_start_playing_opens_round_one() {
        let fx = fixture().await;
        fx.teams(&[2]).await;
        let round = fx.state.start_playing(&fx.game_id).await.unwrap();
        assert_eq!(round.number, 1);
        assert_eq!(round.state, RoundState::Voting);

        let game = fx.state.get_game(&fx.game_id).await.unwrap();
        assert_eq!(game.state, GameState::Playing);
        assert_eq!(game.current_round, 1);
        assert_eq!(game.current_round_id, Some(round.id));
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let fx = fixture().await;
        fx.teams(&[2]).await;
        fx.state.start_playing(&fx.game_id).await.unwrap();

        let result = fx.state.start_pairing(&fx.game_id).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid game state transition"));
    }

    #[tokio::test]
    async fn test_toggle_pause_logs_action() {
        let fx = fixture().await;
        assert!(fx.state.toggle_pause(&fx.game_id).await.unwrap());
        assert!(!fx.state.toggle_pause(&fx.game_id).await.unwrap());

        let actions = fx.state.recent_actions(&fx.game_id, 5).await;
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action_type, "resume_game");
        assert_eq!(actions[1].action_type, "pause_game");
    }

    #[tokio::test]
    async fn test_end_game() {
        let fx = fixture().await;
        let game = fx.state.end_game(&fx.game_id).await.unwrap();
        assert_eq!(game.state, GameState::Finished);
        assert!(fx.state.end_game(&fx.game_id).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_game_deactivates_everything() {
        let fx = fixture().await;
        let teams = fx.teams(&[2, 2]).await;

        let new_game = fx.state.reset_game().await;
        assert_ne!(new_game.id, fx.game_id);
        assert_eq!(fx.state.current_game_id().await.unwrap(), new_game.id);

        let old = fx.state.get_game(&fx.game_id).await.unwrap();
        assert!(!old.is_active);

        let team_map = fx.state.teams.read().await;
        assert!(teams.iter().all(|(id, _)| !team_map[id].is_active));
        let players = fx.state.players.read().await;
        assert!(players.values().all(|p| !p.is_active));
        drop(players);
        drop(team_map);

        // Old game refuses further actions
        let result = fx.state.toggle_pause(&fx.game_id).await;
        assert!(matches!(result, Err(GameError::Validation(_))));
    }

    #[tokio::test]
    async fn test_drink_break_pauses_and_counts_guests() {
        let fx = fixture().await;
        fx.teams(&[3, 2]).await;

        let drink = fx
            .state
            .drink_break(&fx.game_id, Some("  Cheers to the couple! "), Some(90))
            .await
            .unwrap();
        assert_eq!(drink.message, "Cheers to the couple!");
        assert_eq!(drink.duration_seconds, 90);
        assert_eq!(drink.teams_notified, 2);
        assert_eq!(drink.players_notified, 5);

        let game = fx.state.get_game(&fx.game_id).await.unwrap();
        assert!(game.is_paused);
        let actions = fx.state.recent_actions(&fx.game_id, 1).await;
        assert_eq!(actions[0].action_type, "drink_break");
        assert_eq!(actions[0].description, "Cheers to the couple! (90s)");
    }

    #[tokio::test]
    async fn test_drink_break_defaults_and_limits() {
        let fx = fixture().await;
        let result = fx.state.drink_break(&fx.game_id, None, Some(0)).await;
        assert!(matches!(result, Err(GameError::Validation(_))));
        let game = fx.state.get_game(&fx.game_id).await.unwrap();
        assert!(!game.is_paused);

        let drink = fx.state.drink_break(&fx.game_id, Some(" "), None).await.unwrap();
        assert_eq!(drink.message, DEFAULT_DRINK_BREAK_MESSAGE);
        assert_eq!(drink.duration_seconds, DEFAULT_DRINK_BREAK_SECONDS);
        assert_eq!(drink.teams_notified, 0);
    }

    #[tokio::test]
    async fn test_resume_after_drink_break() {
        let fx = fixture().await;
        fx.teams(&[2]).await;
        fx.state.start_playing(&fx.game_id).await.unwrap();

        let result = fx.state.resume_game(&fx.game_id).await;
        assert!(matches!(result, Err(GameError::Validation(_))));

        fx.state.drink_break(&fx.game_id, None, None).await.unwrap();
        let game = fx.state.resume_game(&fx.game_id).await.unwrap();
        assert!(!game.is_paused);
        assert_eq!(game.state, GameState::Playing);

        let actions = fx.state.recent_actions(&fx.game_id, 2).await;
        assert_eq!(actions[0].action_type, "resume_game");
        assert_eq!(actions[1].action_type, "drink_break");
    }

    #[tokio::test]
    async fn test_drink_break_refused_after_end() {
        let fx = fixture().await;
        fx.state.end_game(&fx.game_id).await.unwrap();
        let result = fx.state.drink_break(&fx.game_id, None, None).await;
        assert!(matches!(result, Err(GameError::Validation(_))));
    }
}
