use super::{active_game, settings_for, AppState};
use crate::clock::{seconds_remaining, voting_window_open};
use crate::error::{GameError, GameResult};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One member's latest vote in a round, `None` if they have not voted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberVote {
    pub player_id: PlayerId,
    pub nickname: String,
    pub number: Option<u32>,
}

/// A team's aggregated decision for one round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamVoteSummary {
    pub team_id: TeamId,
    pub team_name: String,
    pub final_number: u32,
    pub is_unanimous: bool,
    pub member_votes: Vec<MemberVote>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamVotingStatus {
    pub team_id: TeamId,
    pub round_id: RoundId,
    pub member_votes: Vec<MemberVote>,
    pub votes_count: usize,
    pub total_members: usize,
    pub final_number: u32,
    pub is_unanimous: bool,
    pub seconds_remaining: f64,
}

/// Returned to the voter after a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub number: u32,
    pub team_status: TeamVotingStatus,
    pub seconds_remaining: f64,
}

/// Fold the members' votes into the team's number.
///
/// Members without a vote count as `fallback`. Identical values are
/// unanimous; anything else resolves to the minimum.
pub fn aggregate_member_votes(votes: &[Option<u32>], fallback: u32) -> (u32, bool) {
    let values: Vec<u32> = votes.iter().map(|v| v.unwrap_or(fallback)).collect();
    let Some(&first) = values.first() else {
        return (fallback, false);
    };

    if values.iter().all(|&v| v == first) {
        (first, true)
    } else {
        (values.iter().copied().min().unwrap_or(fallback), false)
    }
}

/// Latest vote per player for `round_id`
fn latest_votes<'a>(
    votes: &'a HashMap<VoteId, Vote>,
    round_id: &str,
) -> HashMap<&'a str, &'a Vote> {
    let mut latest: HashMap<&str, &Vote> = HashMap::new();
    for vote in votes.values().filter(|v| v.round_id == round_id) {
        latest
            .entry(vote.player_id.as_str())
            .and_modify(|existing| {
                if vote.updated_at > existing.updated_at {
                    *existing = vote;
                }
            })
            .or_insert(vote);
    }
    latest
}

/// Active members of a team with their latest vote, oldest member first
fn member_votes(
    team_id: &str,
    players: &HashMap<PlayerId, Player>,
    latest: &HashMap<&str, &Vote>,
) -> Vec<MemberVote> {
    let mut members: Vec<&Player> = players
        .values()
        .filter(|p| p.is_active && p.team_id.as_deref() == Some(team_id))
        .collect();
    members.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    members
        .into_iter()
        .map(|p| MemberVote {
            player_id: p.id.clone(),
            nickname: p.nickname.clone(),
            number: latest.get(p.id.as_str()).map(|v| v.number),
        })
        .collect()
}

fn summarize_team(
    team: &Team,
    players: &HashMap<PlayerId, Player>,
    latest: &HashMap<&str, &Vote>,
    fallback: u32,
) -> TeamVoteSummary {
    let member_votes = member_votes(&team.id, players, latest);
    let numbers: Vec<Option<u32>> = member_votes.iter().map(|m| m.number).collect();
    let (final_number, is_unanimous) = aggregate_member_votes(&numbers, fallback);

    TeamVoteSummary {
        team_id: team.id.clone(),
        team_name: team.name.clone(),
        final_number,
        is_unanimous,
        member_votes,
    }
}

/// Summaries for every active team with at least one active member, by position
pub(crate) fn team_vote_summaries(
    teams: &HashMap<TeamId, Team>,
    players: &HashMap<PlayerId, Player>,
    votes: &HashMap<VoteId, Vote>,
    game_id: &str,
    round_id: &str,
    fallback: u32,
) -> Vec<TeamVoteSummary> {
    let latest = latest_votes(votes, round_id);
    let mut eligible: Vec<&Team> = teams
        .values()
        .filter(|t| t.game_id == game_id && t.is_active)
        .collect();
    eligible.sort_by_key(|t| t.position);

    eligible
        .into_iter()
        .map(|team| summarize_team(team, players, &latest, fallback))
        .filter(|summary| !summary.member_votes.is_empty())
        .collect()
}

fn voting_status(
    team: &Team,
    round: &Round,
    players: &HashMap<PlayerId, Player>,
    votes: &HashMap<VoteId, Vote>,
    fallback: u32,
    now: chrono::DateTime<chrono::Utc>,
) -> TeamVotingStatus {
    let latest = latest_votes(votes, &round.id);
    let summary = summarize_team(team, players, &latest, fallback);
    let remaining = if round.state == RoundState::Voting {
        seconds_remaining(round.voting_start_time, round.voting_duration_seconds, now)
    } else {
        0.0
    };

    TeamVotingStatus {
        team_id: team.id.clone(),
        round_id: round.id.clone(),
        votes_count: summary.member_votes.iter().filter(|m| m.number.is_some()).count(),
        total_members: summary.member_votes.len(),
        member_votes: summary.member_votes,
        final_number: summary.final_number,
        is_unanimous: summary.is_unanimous,
        seconds_remaining: remaining,
    }
}

impl AppState {
    /// Insert or revise a player's vote for the round currently voting
    pub async fn submit_vote(
        &self,
        game_id: &str,
        player_id: &str,
        number: u32,
    ) -> GameResult<VoteReceipt> {
        let games = self.games.read().await;
        let game = active_game(&games, game_id)?;
        let settings = settings_for(&*self.settings.read().await, game_id);
        let rounds = self.rounds.read().await;
        let teams = self.teams.read().await;
        let players = self.players.read().await;
        let mut votes = self.votes.write().await;

        if !settings.contains_number(number) {
            let (min, max) = settings.effective_number_range();
            return Err(GameError::validation(format!(
                "Number must be between {} and {}",
                min, max
            )));
        }

        let round = game
            .current_round_id
            .as_ref()
            .and_then(|id| rounds.get(id))
            .ok_or_else(|| GameError::validation("No round is open"))?;
        if round.state != RoundState::Voting {
            return Err(GameError::validation("Round is not accepting votes"));
        }
        let now = self.now();
        if !voting_window_open(round.voting_start_time, round.voting_duration_seconds, now) {
            return Err(GameError::validation("Voting window has closed"));
        }

        let player = players
            .get(player_id)
            .filter(|p| p.game_id == game_id)
            .ok_or_else(|| GameError::not_found("Player"))?;
        let team = player
            .team_id
            .as_ref()
            .and_then(|id| teams.get(id))
            .filter(|t| player.is_active && t.is_active)
            .ok_or_else(|| GameError::validation("Player is not on an active team"))?;

        let existing = votes
            .values_mut()
            .find(|v| v.round_id == round.id && v.player_id == player_id);
        match existing {
            Some(vote) => {
                vote.number = number;
                vote.team_id = Some(team.id.clone());
                vote.updated_at = now;
            }
            None => {
                let vote = Vote {
                    id: new_id(),
                    round_id: round.id.clone(),
                    player_id: player_id.to_string(),
                    team_id: Some(team.id.clone()),
                    number,
                    created_at: now,
                    updated_at: now,
                };
                votes.insert(vote.id.clone(), vote);
            }
        }

        tracing::info!(
            "Player {} voted {} in round {}",
            player.nickname,
            number,
            round.number
        );

        let team_status = voting_status(
            team,
            round,
            &players,
            &votes,
            settings.number_range_max,
            now,
        );
        Ok(VoteReceipt {
            number,
            seconds_remaining: team_status.seconds_remaining,
            team_status,
        })
    }

    /// Per-member vote state of one team in one round
    pub async fn team_voting_status(
        &self,
        team_id: &str,
        round_id: &str,
    ) -> GameResult<TeamVotingStatus> {
        let settings = self.settings.read().await;
        let rounds = self.rounds.read().await;
        let teams = self.teams.read().await;
        let players = self.players.read().await;
        let votes = self.votes.read().await;

        let round = rounds
            .get(round_id)
            .ok_or_else(|| GameError::not_found("Round"))?;
        let team = teams
            .get(team_id)
            .filter(|t| t.game_id == round.game_id)
            .ok_or_else(|| GameError::not_found("Team"))?;
        let fallback = settings_for(&settings, &round.game_id).number_range_max;

        Ok(voting_status(
            team,
            round,
            &players,
            &votes,
            fallback,
            self.now(),
        ))
    }

    /// Voting status for every eligible team in the round
    pub async fn all_team_voting_status(&self, round_id: &str) -> GameResult<Vec<TeamVotingStatus>> {
        let settings = self.settings.read().await;
        let rounds = self.rounds.read().await;
        let teams = self.teams.read().await;
        let players = self.players.read().await;
        let votes = self.votes.read().await;

        let round = rounds
            .get(round_id)
            .ok_or_else(|| GameError::not_found("Round"))?;
        let fallback = settings_for(&settings, &round.game_id).number_range_max;
        let now = self.now();

        let mut eligible: Vec<&Team> = teams
            .values()
            .filter(|t| t.game_id == round.game_id && t.is_active)
            .collect();
        eligible.sort_by_key(|t| t.position);

        Ok(eligible
            .into_iter()
            .map(|team| voting_status(team, round, &players, &votes, fallback, now))
            .filter(|status| status.total_members > 0)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::fixture;
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_aggregate_unanimous() {
        assert_eq!(aggregate_member_votes(&[Some(7), Some(7)], 20), (7, true));
    }

    #[test]
    fn test_aggregate_dissent_takes_minimum() {
        assert_eq!(
            aggregate_member_votes(&[Some(7), Some(4), Some(7)], 20),
            (4, false)
        );
    }

    #[test]
    fn test_aggregate_non_voter_counts_as_fallback() {
        assert_eq!(aggregate_member_votes(&[Some(12), None], 20), (12, false));
        assert_eq!(aggregate_member_votes(&[None, None], 20), (20, true));
        assert_eq!(aggregate_member_votes(&[Some(20), None], 20), (20, true));
    }

    #[test]
    fn test_aggregate_empty_team() {
        assert_eq!(aggregate_member_votes(&[], 25), (25, false));
    }

    #[tokio::test]
    async fn test_submit_vote_upserts() {
        let fx = fixture().await;
        let (teams, round) = fx.playing(&[2]).await;
        let player_id = &teams[0].1[0];

        fx.state.submit_vote(&fx.game_id, player_id, 5).await.unwrap();
        fx.clock.advance(Duration::seconds(1));
        let receipt = fx.state.submit_vote(&fx.game_id, player_id, 9).await.unwrap();
        assert_eq!(receipt.number, 9);

        let votes = fx.state.votes.read().await;
        let mine: Vec<&Vote> = votes
            .values()
            .filter(|v| v.round_id == round.id && &v.player_id == player_id)
            .collect();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].number, 9);
        assert!(mine[0].updated_at > mine[0].created_at);
    }

    #[tokio::test]
    async fn test_submit_vote_reports_team_status() {
        let fx = fixture().await;
        let (teams, _) = fx.playing(&[3]).await;

        fx.state.submit_vote(&fx.game_id, &teams[0].1[0], 6).await.unwrap();
        let receipt = fx
            .state
            .submit_vote(&fx.game_id, &teams[0].1[1], 6)
            .await
            .unwrap();

        let status = receipt.team_status;
        assert_eq!(status.votes_count, 2);
        assert_eq!(status.total_members, 3);
        // Third member has not voted and counts as 20
        assert_eq!(status.final_number, 6);
        assert!(!status.is_unanimous);
        assert!((receipt.seconds_remaining - 20.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_submit_vote_out_of_range() {
        let fx = fixture().await;
        let (teams, _) = fx.playing(&[2]).await;
        for number in [0, 21] {
            let result = fx.state.submit_vote(&fx.game_id, &teams[0].1[0], number).await;
            assert!(matches!(result, Err(GameError::Validation(_))));
        }
        assert!(fx.state.votes.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_voting_window_grace() {
        let fx = fixture().await;
        let (teams, _) = fx.playing(&[2]).await;
        let player_id = &teams[0].1[0];

        fx.clock.advance(Duration::milliseconds(20_250));
        assert!(fx.state.submit_vote(&fx.game_id, player_id, 3).await.is_ok());

        fx.clock.advance(Duration::milliseconds(60));
        let result = fx.state.submit_vote(&fx.game_id, player_id, 4).await;
        assert!(matches!(result, Err(GameError::Validation(_))));
    }

    #[tokio::test]
    async fn test_vote_rejected_after_finalize() {
        let fx = fixture().await;
        let (teams, round) = fx.playing(&[2]).await;
        fx.state.finalize_round(&fx.game_id, &round.id).await.unwrap();

        let result = fx.state.submit_vote(&fx.game_id, &teams[0].1[0], 3).await;
        assert!(matches!(result, Err(GameError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unattached_player_cannot_vote() {
        let fx = fixture().await;
        fx.playing(&[2]).await;
        let loner = fx.state.register_player(&fx.game_id, "Loner").await.unwrap();

        let result = fx.state.submit_vote(&fx.game_id, &loner.id, 3).await;
        assert!(matches!(result, Err(GameError::Validation(_))));
        let result = fx.state.submit_vote(&fx.game_id, "missing", 3).await;
        assert!(matches!(result, Err(GameError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_all_team_voting_status_skips_empty_teams() {
        let fx = fixture().await;
        let (teams, round) = fx.playing(&[2, 2]).await;
        {
            let mut players = fx.state.players.write().await;
            for id in &teams[1].1 {
                players.get_mut(id).unwrap().is_active = false;
            }
        }

        let statuses = fx.state.all_team_voting_status(&round.id).await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].team_id, teams[0].0);
    }
}
