use super::{active_game, AppState};
use crate::error::{GameError, GameResult};
use crate::names::{pick_unused, TEAM_NAMES, WEDDING_NICKNAMES};
use crate::types::*;
use rand::Rng;
use std::collections::HashMap;

/// Safe character set for session tokens (excludes 0/O, 1/I/L to avoid confusion)
const TOKEN_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const TOKEN_LENGTH: usize = 6;

fn generate_session_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_CHARS[rng.random_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

impl AppState {
    /// Register a guest for the game, assigning a nickname and session token
    pub async fn register_player(&self, game_id: &str, name: &str) -> GameResult<Player> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::validation("Name must not be empty"));
        }

        let games = self.games.read().await;
        let game = active_game(&games, game_id)?;
        if game.state == GameState::Finished {
            return Err(GameError::validation("Game has already finished"));
        }

        let mut players = self.players.write().await;
        let used: Vec<String> = players
            .values()
            .filter(|p| p.game_id == game_id)
            .map(|p| p.nickname.clone())
            .collect();

        let token = loop {
            let code = generate_session_token();
            if !players.values().any(|p| p.token == code) {
                break code;
            }
        };

        let player = Player {
            id: new_id(),
            game_id: game_id.to_string(),
            name: name.to_string(),
            nickname: pick_unused(WEDDING_NICKNAMES, &used),
            token,
            team_id: None,
            is_active: true,
            created_at: self.now(),
        };
        players.insert(player.id.clone(), player.clone());

        tracing::info!(
            "Registered player {} as '{}' ({})",
            player.id,
            player.name,
            player.nickname
        );
        Ok(player)
    }

    pub async fn get_player(&self, player_id: &str) -> GameResult<Player> {
        self.players
            .read()
            .await
            .get(player_id)
            .cloned()
            .ok_or_else(|| GameError::not_found("Player"))
    }

    /// Get player by session token
    pub async fn get_player_by_token(&self, token: &str) -> Option<Player> {
        self.players
            .read()
            .await
            .values()
            .find(|p| p.token == token)
            .cloned()
    }

    /// All players of a game, oldest first
    pub async fn list_players(&self, game_id: &str) -> Vec<Player> {
        let players = self.players.read().await;
        let mut list: Vec<Player> = players
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        list
    }

    /// Pair two unattached players into a new team
    pub async fn pair_players(
        &self,
        game_id: &str,
        player1_id: &str,
        player2_id: &str,
    ) -> GameResult<Team> {
        if player1_id == player2_id {
            return Err(GameError::validation("Cannot pair a player with themselves"));
        }

        let games = self.games.read().await;
        let game = active_game(&games, game_id)?;
        if !matches!(game.state, GameState::Registration | GameState::Pairing) {
            return Err(GameError::validation(format!(
                "Cannot pair players while game is {:?}",
                game.state
            )));
        }

        let mut teams = self.teams.write().await;
        let mut players = self.players.write().await;
        let members = [player1_id.to_string(), player2_id.to_string()];
        let team = self.insert_team_locked(game_id, &members, &mut teams, &mut players)?;

        tracing::info!(
            "Paired {} and {} into team '{}'",
            player1_id,
            player2_id,
            team.name
        );
        Ok(team)
    }

    /// Create a team from arbitrary unattached players (any size)
    pub(crate) async fn create_team(&self, game_id: &str, members: &[PlayerId]) -> GameResult<Team> {
        let games = self.games.read().await;
        active_game(&games, game_id)?;

        let mut teams = self.teams.write().await;
        let mut players = self.players.write().await;
        self.insert_team_locked(game_id, members, &mut teams, &mut players)
    }

    fn insert_team_locked(
        &self,
        game_id: &str,
        members: &[PlayerId],
        teams: &mut HashMap<TeamId, Team>,
        players: &mut HashMap<PlayerId, Player>,
    ) -> GameResult<Team> {
        for player_id in members {
            let player = players
                .get(player_id)
                .filter(|p| p.game_id == game_id)
                .ok_or_else(|| GameError::not_found("Player"))?;
            if !player.is_active {
                return Err(GameError::validation(format!(
                    "Player {} is not active",
                    player.nickname
                )));
            }
            if player.team_id.is_some() {
                return Err(GameError::conflict(format!(
                    "Player {} already has a team",
                    player.nickname
                )));
            }
        }

        let in_game: Vec<&Team> = teams.values().filter(|t| t.game_id == game_id).collect();
        let used: Vec<String> = in_game.iter().map(|t| t.name.clone()).collect();
        let team = Team {
            id: new_id(),
            game_id: game_id.to_string(),
            name: pick_unused(TEAM_NAMES, &used),
            position: in_game.len() as u32,
            score: 0,
            is_active: true,
            created_at: self.now(),
        };

        for player_id in members {
            if let Some(player) = players.get_mut(player_id) {
                player.team_id = Some(team.id.clone());
            }
        }
        teams.insert(team.id.clone(), team.clone());
        Ok(team)
    }
}
