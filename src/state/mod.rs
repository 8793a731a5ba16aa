pub mod export;
mod game;
mod moderation;
mod player;
mod round;
mod settings;
mod supporter;
mod team;
mod vote;

pub use game::DrinkBreak;
pub use moderation::GameStats;
pub use round::{resolve_round, QuizOutcome, RoundOutcome, RoundResult, RoundStatus};
pub use supporter::{eliminated_player_ids, EvaluationSummary, RejoinOutcome};
pub use team::{
    active_member_count, active_team_sizes, BalanceReport, MoveOutcome, PlayerMove,
    RebalanceOutcome, StealOutcome, TeamSize,
};
pub use vote::{aggregate_member_votes, MemberVote, TeamVoteSummary, TeamVotingStatus, VoteReceipt};

use crate::clock::{Clock, SystemClock};
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::settings::GameSettings;
use crate::types::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Shared application state.
///
/// Multi-collection actions take their locks in this order and release them
/// together, so every action commits fully or not at all:
/// `current_game_id`, `games`, `settings`, `rounds`, `teams`, `players`,
/// `votes`, `tokens`, `quiz_questions`, `actions`.
#[derive(Clone)]
pub struct AppState {
    pub current_game_id: Arc<RwLock<Option<GameId>>>,
    pub games: Arc<RwLock<HashMap<GameId, Game>>>,
    pub settings: Arc<RwLock<HashMap<GameId, GameSettings>>>,
    pub rounds: Arc<RwLock<HashMap<RoundId, Round>>>,
    pub teams: Arc<RwLock<HashMap<TeamId, Team>>>,
    pub players: Arc<RwLock<HashMap<PlayerId, Player>>>,
    pub votes: Arc<RwLock<HashMap<VoteId, Vote>>>,
    pub tokens: Arc<RwLock<HashMap<TokenId, SupporterToken>>>,
    pub quiz_questions: Arc<RwLock<Vec<QuizQuestion>>>,
    pub actions: Arc<RwLock<Vec<ModeratorAction>>>,
    /// Settings handed to every newly created game
    pub default_settings: GameSettings,
    pub clock: Arc<dyn Clock>,
    /// Broadcast channel for all connected clients
    pub broadcast: broadcast::Sender<ServerMessage>,
    /// Broadcast channel for moderator clients
    pub moderator_broadcast: broadcast::Sender<ServerMessage>,
    /// Broadcast channel for big-screen clients
    pub screen_broadcast: broadcast::Sender<ServerMessage>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (tx, _rx) = broadcast::channel(100);
        let (moderator_tx, _moderator_rx) = broadcast::channel(100);
        let (screen_tx, _screen_rx) = broadcast::channel(100);
        Self {
            current_game_id: Arc::new(RwLock::new(None)),
            games: Arc::new(RwLock::new(HashMap::new())),
            settings: Arc::new(RwLock::new(HashMap::new())),
            rounds: Arc::new(RwLock::new(HashMap::new())),
            teams: Arc::new(RwLock::new(HashMap::new())),
            players: Arc::new(RwLock::new(HashMap::new())),
            votes: Arc::new(RwLock::new(HashMap::new())),
            tokens: Arc::new(RwLock::new(HashMap::new())),
            quiz_questions: Arc::new(RwLock::new(Vec::new())),
            actions: Arc::new(RwLock::new(Vec::new())),
            default_settings: GameSettings::default(),
            clock,
            broadcast: tx,
            moderator_broadcast: moderator_tx,
            screen_broadcast: screen_tx,
        }
    }

    /// Use `settings` for every game created from now on
    pub fn with_default_settings(mut self, settings: GameSettings) -> Self {
        self.default_settings = settings;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// ID of the game clients currently join
    pub async fn current_game_id(&self) -> GameResult<GameId> {
        self.current_game_id
            .read()
            .await
            .clone()
            .ok_or_else(|| GameError::not_found("Active game"))
    }

    /// Broadcast a message to all connected clients
    pub fn broadcast_to_all(&self, msg: ServerMessage) {
        // No receivers connected is fine
        let _ = self.broadcast.send(msg);
    }

    pub fn broadcast_to_moderator(&self, msg: ServerMessage) {
        let _ = self.moderator_broadcast.send(msg);
    }

    pub fn broadcast_to_screens(&self, msg: ServerMessage) {
        let _ = self.screen_broadcast.send(msg);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up a game and make sure it has not been reset away
pub(crate) fn active_game<'a>(
    games: &'a HashMap<GameId, Game>,
    game_id: &str,
) -> GameResult<&'a Game> {
    match games.get(game_id) {
        Some(game) if game.is_active => Ok(game),
        Some(_) => Err(GameError::validation("Game is no longer active")),
        None => Err(GameError::not_found("Game")),
    }
}

pub(crate) fn active_game_mut<'a>(
    games: &'a mut HashMap<GameId, Game>,
    game_id: &str,
) -> GameResult<&'a mut Game> {
    match games.get_mut(game_id) {
        Some(game) if game.is_active => Ok(game),
        Some(_) => Err(GameError::validation("Game is no longer active")),
        None => Err(GameError::not_found("Game")),
    }
}

pub(crate) fn settings_for(
    settings: &HashMap<GameId, GameSettings>,
    game_id: &str,
) -> GameSettings {
    settings.get(game_id).cloned().unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::test_support::fixture;
    use super::*;

    #[tokio::test]
    async fn test_create_game_sets_current() {
        let fx = fixture().await;
        assert_eq!(fx.state.current_game_id().await.unwrap(), fx.game_id);
        let game = fx.state.get_game(&fx.game_id).await.unwrap();
        assert_eq!(game.state, GameState::Registration);
        assert_eq!(game.current_round, 0);
    }

    #[tokio::test]
    async fn test_current_game_missing() {
        let state = AppState::new();
        let result = state.current_game_id().await;
        assert!(matches!(result, Err(GameError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fixture_builds_teams() {
        let fx = fixture().await;
        let teams = fx.teams(&[3, 2]).await;
        let players = fx.state.players.read().await;
        assert_eq!(active_member_count(&players, &teams[0].0), 3);
        assert_eq!(active_member_count(&players, &teams[1].0), 2);
    }
}
