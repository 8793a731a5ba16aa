use super::{active_game, active_game_mut, settings_for, AppState};
use crate::error::{GameError, GameResult};
use crate::types::*;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Gap between largest and smallest team above which the moderator is warned
const BALANCE_WARNING_GAP: usize = 2;
/// Auto-balance stops once the gap is at most this
const BALANCE_TARGET_GAP: usize = 1;
const MAX_BALANCE_MOVES: usize = 3;
/// A team larger than this multiple of the mean size is snowballing
const SNOWBALL_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamSize {
    pub team_id: TeamId,
    pub name: String,
    pub position: u32,
    pub members: usize,
}

/// Count the active players pointing at `team_id`
pub fn active_member_count(players: &HashMap<PlayerId, Player>, team_id: &str) -> usize {
    players
        .values()
        .filter(|p| p.is_active && p.team_id.as_deref() == Some(team_id))
        .count()
}

/// Active teams of a game with recomputed member counts, by position
pub fn active_team_sizes(
    teams: &HashMap<TeamId, Team>,
    players: &HashMap<PlayerId, Player>,
    game_id: &str,
) -> Vec<TeamSize> {
    let mut sizes: Vec<TeamSize> = teams
        .values()
        .filter(|t| t.game_id == game_id && t.is_active)
        .map(|t| TeamSize {
            team_id: t.id.clone(),
            name: t.name.clone(),
            position: t.position,
            members: active_member_count(players, &t.id),
        })
        .collect();
    sizes.sort_by_key(|s| s.position);
    sizes
}

/// Fewest active members wins, earlier position breaks ties
pub(crate) fn smallest_team(sizes: &[TeamSize]) -> Option<&TeamSize> {
    sizes.iter().min_by_key(|s| (s.members, s.position))
}

fn largest_team(sizes: &[TeamSize]) -> Option<&TeamSize> {
    sizes.iter().max_by_key(|s| (s.members, Reverse(s.position)))
}

/// Deactivate `team_id` if nobody active is left in it. Returns whether it happened.
pub(crate) fn retire_if_empty(
    teams: &mut HashMap<TeamId, Team>,
    players: &HashMap<PlayerId, Player>,
    team_id: &str,
) -> bool {
    if active_member_count(players, team_id) > 0 {
        return false;
    }
    match teams.get_mut(team_id) {
        Some(team) if team.is_active => {
            team.is_active = false;
            tracing::info!("Team '{}' has no members left and is out", team.name);
            true
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StealOutcome {
    pub player: Player,
    pub source_team: Team,
    pub target_team: Team,
    /// Source team was knocked out by this steal
    pub source_eliminated: bool,
    /// Last member of the source team, eliminated along with it
    pub eliminated_player_id: Option<PlayerId>,
    pub protected_until_round: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub player: Player,
    pub previous_team: Option<Team>,
    pub team: Team,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerMove {
    pub player_id: PlayerId,
    pub nickname: String,
    pub from_team_id: TeamId,
    pub to_team_id: TeamId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceOutcome {
    pub moves_made: usize,
    pub moves: Vec<PlayerMove>,
    pub teams: Vec<TeamSize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceReport {
    pub needs_balance: bool,
    pub difference: usize,
    pub largest_team_id: Option<TeamId>,
    pub smallest_team_id: Option<TeamId>,
    /// Teams larger than 1.5x the mean size
    pub snowball_team_ids: Vec<TeamId>,
    pub teams: Vec<TeamSize>,
}

fn team_in_game<'a>(
    teams: &'a HashMap<TeamId, Team>,
    game_id: &str,
    team_id: &str,
) -> GameResult<&'a Team> {
    teams
        .get(team_id)
        .filter(|t| t.game_id == game_id)
        .ok_or_else(|| GameError::not_found("Team"))
}

impl AppState {
    pub async fn get_team(&self, team_id: &str) -> GameResult<Team> {
        self.teams
            .read()
            .await
            .get(team_id)
            .cloned()
            .ok_or_else(|| GameError::not_found("Team"))
    }

    /// All teams of a game (active or not), by position
    pub async fn list_teams(&self, game_id: &str) -> Vec<Team> {
        let teams = self.teams.read().await;
        let mut list: Vec<Team> = teams
            .values()
            .filter(|t| t.game_id == game_id)
            .cloned()
            .collect();
        list.sort_by_key(|t| t.position);
        list
    }

    /// Move a player from `source_team_id` into `target_team_id`.
    ///
    /// A source team left without members is knocked out. With rescue off, a
    /// source team left with a single member is knocked out too and takes that
    /// member with it.
    pub async fn steal_player(
        &self,
        game_id: &str,
        source_team_id: &str,
        target_team_id: &str,
        player_id: &str,
    ) -> GameResult<StealOutcome> {
        let outcome = {
            let mut games = self.games.write().await;
            let settings = settings_for(&*self.settings.read().await, game_id);
            let mut teams = self.teams.write().await;
            let mut players = self.players.write().await;

            let game = active_game_mut(&mut games, game_id)?;
            if !matches!(game.state, GameState::Playing | GameState::Quiz) {
                return Err(GameError::validation(format!(
                    "Cannot steal while game is {:?}",
                    game.state
                )));
            }
            if source_team_id == target_team_id {
                return Err(GameError::conflict("Cannot steal into the same team"));
            }

            let source = team_in_game(&teams, game_id, source_team_id)?;
            let target = team_in_game(&teams, game_id, target_team_id)?;
            if !source.is_active || !target.is_active {
                return Err(GameError::validation("Both teams must be active"));
            }

            let player = players
                .get(player_id)
                .filter(|p| p.game_id == game_id)
                .ok_or_else(|| GameError::not_found("Player"))?;
            if player.team_id.as_deref() == Some(target_team_id) {
                return Err(GameError::conflict(format!(
                    "{} is already in team '{}'",
                    player.nickname, target.name
                )));
            }
            if player.team_id.as_deref() != Some(source_team_id) || !player.is_active {
                return Err(GameError::validation(format!(
                    "{} is not an active member of team '{}'",
                    player.nickname, source.name
                )));
            }

            if !settings.immediate_steal_back_allowed() {
                let protected = game.protections.iter().find(|p| {
                    p.team_id == source_team_id && game.current_round <= p.until_round
                });
                if let Some(protection) = protected {
                    return Err(GameError::conflict(format!(
                        "Team '{}' is protected until round {} has passed",
                        source.name, protection.until_round
                    )));
                }
            }

            // Validation done, apply
            if let Some(player) = players.get_mut(player_id) {
                player.team_id = Some(target_team_id.to_string());
            }

            let remaining: Vec<PlayerId> = players
                .values()
                .filter(|p| p.is_active && p.team_id.as_deref() == Some(source_team_id))
                .map(|p| p.id.clone())
                .collect();

            let mut eliminated_player_id = None;
            let source_eliminated = match remaining.as_slice() {
                [] => true,
                [last] if settings.single_team_elimination_allowed() => {
                    if let Some(last) = players.get_mut(last) {
                        last.is_active = false;
                        tracing::info!("{} was the last of their team and is eliminated", last.nickname);
                    }
                    eliminated_player_id = Some(last.clone());
                    true
                }
                _ => false,
            };
            if source_eliminated {
                if let Some(team) = teams.get_mut(source_team_id) {
                    team.is_active = false;
                }
            }

            let protected_until_round = if !settings.immediate_steal_back_allowed() {
                let until_round = game.current_round + 1;
                let current_round = game.current_round;
                game.protections
                    .retain(|p| p.team_id != target_team_id && current_round <= p.until_round);
                game.protections.push(StealProtection {
                    team_id: target_team_id.to_string(),
                    until_round,
                });
                Some(until_round)
            } else {
                None
            };
            game.version += 1;

            StealOutcome {
                player: players[player_id].clone(),
                source_team: teams[source_team_id].clone(),
                target_team: teams[target_team_id].clone(),
                source_eliminated,
                eliminated_player_id,
                protected_until_round,
            }
        };

        let description = format!(
            "'{}' stole {} from '{}'",
            outcome.target_team.name, outcome.player.nickname, outcome.source_team.name
        );
        tracing::info!("{}", description);
        self.record_action(game_id, "steal_player", description).await;
        Ok(outcome)
    }

    /// Moderator override: put a player into any active team
    pub async fn move_player(
        &self,
        game_id: &str,
        player_id: &str,
        target_team_id: &str,
    ) -> GameResult<MoveOutcome> {
        let outcome = {
            let games = self.games.read().await;
            let mut teams = self.teams.write().await;
            let mut players = self.players.write().await;

            active_game(&games, game_id)?;
            let target = team_in_game(&teams, game_id, target_team_id)?;
            if !target.is_active {
                return Err(GameError::validation(format!(
                    "Team '{}' is not active",
                    target.name
                )));
            }
            let player = players
                .get_mut(player_id)
                .filter(|p| p.game_id == game_id)
                .ok_or_else(|| GameError::not_found("Player"))?;
            if player.team_id.as_deref() == Some(target_team_id) && player.is_active {
                return Err(GameError::conflict(format!(
                    "{} is already in team '{}'",
                    player.nickname, target.name
                )));
            }

            let previous_team_id = player.team_id.replace(target_team_id.to_string());
            player.is_active = true;
            let player = player.clone();

            if let Some(previous) = previous_team_id.as_deref().filter(|id| *id != target_team_id) {
                retire_if_empty(&mut teams, &players, previous);
            }

            MoveOutcome {
                player,
                previous_team: previous_team_id.and_then(|id| teams.get(&id).cloned()),
                team: teams[target_team_id].clone(),
            }
        };

        let description = format!(
            "Moved {} to '{}'",
            outcome.player.nickname, outcome.team.name
        );
        tracing::info!("{}", description);
        self.record_action(game_id, "move_player", description).await;
        Ok(outcome)
    }

    /// Advisory balance signals, recomputed from current membership
    pub async fn check_balance(&self, game_id: &str) -> GameResult<BalanceReport> {
        let games = self.games.read().await;
        let teams = self.teams.read().await;
        let players = self.players.read().await;
        active_game(&games, game_id)?;

        let sizes = active_team_sizes(&teams, &players, game_id);
        let largest = largest_team(&sizes);
        let smallest = smallest_team(&sizes);
        let difference = match (largest, smallest) {
            (Some(l), Some(s)) => l.members - s.members,
            _ => 0,
        };

        let snowball_team_ids = if sizes.is_empty() {
            Vec::new()
        } else {
            let total: usize = sizes.iter().map(|s| s.members).sum();
            let mean = total as f64 / sizes.len() as f64;
            sizes
                .iter()
                .filter(|s| s.members as f64 > mean * SNOWBALL_FACTOR)
                .map(|s| s.team_id.clone())
                .collect()
        };

        Ok(BalanceReport {
            needs_balance: difference > BALANCE_WARNING_GAP,
            difference,
            largest_team_id: largest.map(|s| s.team_id.clone()),
            smallest_team_id: smallest.map(|s| s.team_id.clone()),
            snowball_team_ids,
            teams: sizes,
        })
    }

    /// Even out team sizes, at most three moves per call
    pub async fn auto_balance(&self, game_id: &str) -> GameResult<RebalanceOutcome> {
        let outcome = {
            let games = self.games.read().await;
            let teams = self.teams.read().await;
            let mut players = self.players.write().await;
            active_game(&games, game_id)?;

            if active_team_sizes(&teams, &players, game_id).len() < 2 {
                return Err(GameError::validation("Need at least two active teams to balance"));
            }

            let mut rng = rand::rng();
            let mut moves = Vec::new();
            while moves.len() < MAX_BALANCE_MOVES {
                let sizes = active_team_sizes(&teams, &players, game_id);
                let (Some(largest), Some(smallest)) = (largest_team(&sizes), smallest_team(&sizes))
                else {
                    break;
                };
                if largest.members - smallest.members <= BALANCE_TARGET_GAP {
                    break;
                }

                let candidates: Vec<PlayerId> = players
                    .values()
                    .filter(|p| p.is_active && p.team_id.as_deref() == Some(largest.team_id.as_str()))
                    .map(|p| p.id.clone())
                    .collect();
                let Some(player) = candidates
                    .choose(&mut rng)
                    .and_then(|id| players.get_mut(id))
                else {
                    break;
                };

                player.team_id = Some(smallest.team_id.clone());
                moves.push(PlayerMove {
                    player_id: player.id.clone(),
                    nickname: player.nickname.clone(),
                    from_team_id: largest.team_id.clone(),
                    to_team_id: smallest.team_id.clone(),
                });
            }

            RebalanceOutcome {
                moves_made: moves.len(),
                moves,
                teams: active_team_sizes(&teams, &players, game_id),
            }
        };

        if outcome.moves_made > 0 {
            let description = format!("Auto-balance moved {} players", outcome.moves_made);
            tracing::info!("{}", description);
            self.record_action(game_id, "auto_balance", description).await;
        }
        Ok(outcome)
    }
}
