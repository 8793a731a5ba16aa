use super::supporter::{evaluate_tokens_locked, issue_tokens_locked};
use super::vote::team_vote_summaries;
use super::{
    active_game, active_game_mut, active_team_sizes, settings_for, AppState, EvaluationSummary,
    TeamVoteSummary, TeamVotingStatus,
};
use crate::error::{GameError, GameResult};
use crate::types::*;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    Winner { team_id: TeamId, winning_number: u32 },
    Tie,
}

/// Lowest unique number wins.
///
/// Every team's final number is tallied; the smallest number held by exactly
/// one team decides the round. No unique number means a tie.
pub fn resolve_round(teams: &[TeamVoteSummary]) -> RoundOutcome {
    let mut holders: BTreeMap<u32, Vec<&TeamId>> = BTreeMap::new();
    for team in teams {
        holders.entry(team.final_number).or_default().push(&team.team_id);
    }

    holders
        .into_iter()
        .find(|(_, teams)| teams.len() == 1)
        .map(|(number, teams)| RoundOutcome::Winner {
            team_id: teams[0].clone(),
            winning_number: number,
        })
        .unwrap_or(RoundOutcome::Tie)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    pub round_id: RoundId,
    pub round_number: u32,
    pub winner_team_id: Option<TeamId>,
    pub winner_team_name: Option<String>,
    pub winning_number: Option<u32>,
    pub is_tie: bool,
    pub teams: Vec<TeamVoteSummary>,
    pub quiz_question: Option<String>,
    pub predictions: EvaluationSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizOutcome {
    pub round: Round,
    pub team: Team,
    /// The winning team answered correctly and may now steal a player
    pub can_steal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundStatus {
    pub round: Option<Round>,
    pub teams: Vec<TeamVotingStatus>,
    pub seconds_remaining: f64,
}

impl AppState {
    /// Open the next round of a running game
    pub async fn start_round(&self, game_id: &str) -> GameResult<Round> {
        self.open_round(game_id, false).await
    }

    /// Open a round. With `first`, the game leaves setup and starts playing.
    pub(crate) async fn open_round(&self, game_id: &str, first: bool) -> GameResult<Round> {
        let mut games = self.games.write().await;
        let settings = settings_for(&*self.settings.read().await, game_id);
        let mut rounds = self.rounds.write().await;
        let teams = self.teams.read().await;
        let players = self.players.read().await;
        let mut tokens = self.tokens.write().await;

        let game = active_game_mut(&mut games, game_id)?;
        if game.is_paused {
            return Err(GameError::validation("Game is paused"));
        }
        if first {
            if !matches!(game.state, GameState::Registration | GameState::Pairing) {
                return Err(GameError::validation(format!(
                    "Cannot start playing from {:?}",
                    game.state
                )));
            }
            if active_team_sizes(&teams, &players, game_id).is_empty() {
                return Err(GameError::validation(
                    "At least one team is required to start the game",
                ));
            }
        } else if !matches!(game.state, GameState::Playing | GameState::Quiz) {
            return Err(GameError::validation(format!(
                "Cannot start a round while game is {:?}",
                game.state
            )));
        }

        if let Some(previous) = game.current_round_id.as_ref().and_then(|id| rounds.get(id)) {
            if matches!(previous.state, RoundState::Voting | RoundState::Calculating) {
                return Err(GameError::validation(format!(
                    "Round {} is still in progress",
                    previous.number
                )));
            }
        }

        // Validation done, apply
        if let Some(previous) = game
            .current_round_id
            .as_ref()
            .and_then(|id| rounds.get_mut(id))
        {
            if previous.state == RoundState::Quiz {
                previous.state = RoundState::Completed;
            }
        }
        Self::transition_locked(game, GameState::Playing)?;

        let now = self.now();
        let round = Round {
            id: new_id(),
            game_id: game_id.to_string(),
            number: game.current_round + 1,
            state: RoundState::Voting,
            voting_start_time: now,
            voting_end_time: None,
            voting_duration_seconds: settings.effective_voting_duration(),
            winner_team_id: None,
            winning_number: None,
            quiz_question: None,
            quiz_answer: None,
            quiz_correct: None,
        };
        game.current_round = round.number;
        game.current_round_id = Some(round.id.clone());
        game.version += 1;
        rounds.insert(round.id.clone(), round.clone());

        let issued = issue_tokens_locked(&mut tokens, &teams, &players, game_id, round.number, now);

        tracing::info!(
            "Started round {} ({}s, {} supporter tokens issued)",
            round.number,
            round.voting_duration_seconds,
            issued
        );
        Ok(round)
    }

    pub async fn get_round(&self, round_id: &str) -> GameResult<Round> {
        self.rounds
            .read()
            .await
            .get(round_id)
            .cloned()
            .ok_or_else(|| GameError::not_found("Round"))
    }

    /// The round the game currently points at, if any
    pub async fn get_current_round(&self, game_id: &str) -> Option<Round> {
        let round_id = self.games.read().await.get(game_id)?.current_round_id.clone()?;
        self.rounds.read().await.get(&round_id).cloned()
    }

    /// Close voting, pick the winner and evaluate supporter predictions.
    ///
    /// Holds the round's write lock for the whole computation, so it only sees
    /// votes committed before it started and later votes find the round closed.
    pub async fn finalize_round(&self, game_id: &str, round_id: &str) -> GameResult<RoundResult> {
        let mut games = self.games.write().await;
        let settings = settings_for(&*self.settings.read().await, game_id);
        let mut rounds = self.rounds.write().await;
        let teams = self.teams.read().await;
        let players = self.players.read().await;
        let votes = self.votes.read().await;
        let mut tokens = self.tokens.write().await;
        let questions = self.quiz_questions.read().await;

        let game = active_game_mut(&mut games, game_id)?;
        let round = rounds
            .get_mut(round_id)
            .filter(|r| r.game_id == game_id)
            .ok_or_else(|| GameError::not_found("Round"))?;
        if round.state != RoundState::Voting {
            return Err(GameError::validation(format!(
                "Round {} is not in voting",
                round.number
            )));
        }

        if !matches!(game.state, GameState::Playing | GameState::Quiz) {
            return Err(GameError::validation(format!(
                "Cannot finalize a round while game is {:?}",
                game.state
            )));
        }

        // Validation done, compute the outcome before touching any record
        let summaries = team_vote_summaries(
            &teams,
            &players,
            &votes,
            game_id,
            round_id,
            settings.number_range_max,
        );
        let outcome = resolve_round(&summaries);
        let now = self.now();

        let (winner_team_id, winning_number) = match &outcome {
            RoundOutcome::Winner {
                team_id,
                winning_number,
            } => (Some(team_id.clone()), Some(*winning_number)),
            RoundOutcome::Tie => (None, None),
        };

        let quiz = winner_team_id.as_ref().map(|_| {
            let active: Vec<&QuizQuestion> = questions.iter().filter(|q| q.is_active).collect();
            let mut rng = rand::rng();
            match active.choose(&mut rng) {
                Some(q) => (q.question.clone(), q.answer.clone()),
                None => DEFAULT_QUIZ_QUESTIONS
                    .choose(&mut rng)
                    .map(|(q, a)| (q.to_string(), a.to_string()))
                    .unwrap_or_default(),
            }
        });
        if quiz.is_some() {
            Self::transition_locked(game, GameState::Quiz)?;
        }

        round.voting_end_time = Some(now);
        match quiz {
            Some((question, answer)) => {
                round.state = RoundState::Quiz;
                round.quiz_question = Some(question);
                round.quiz_answer = Some(answer);
            }
            None => round.state = RoundState::Completed,
        }
        round.winner_team_id = winner_team_id.clone();
        round.winning_number = winning_number;
        game.version += 1;

        let predictions = evaluate_tokens_locked(
            &mut tokens,
            game_id,
            round.number,
            winner_team_id.as_deref(),
            winning_number,
            now,
        );

        let winner_team_name = winner_team_id
            .as_ref()
            .and_then(|id| teams.get(id))
            .map(|t| t.name.clone());
        match &winner_team_name {
            Some(name) => tracing::info!(
                "Round {} won by '{}' with {}",
                round.number,
                name,
                winning_number.unwrap_or_default()
            ),
            None => tracing::info!("Round {} ended in a tie", round.number),
        }

        Ok(RoundResult {
            round_id: round.id.clone(),
            round_number: round.number,
            is_tie: winner_team_id.is_none(),
            winner_team_id,
            winner_team_name,
            winning_number,
            teams: summaries,
            quiz_question: round.quiz_question.clone(),
            predictions,
        })
    }

    /// Record the moderator's verdict on the winning team's quiz answer
    pub async fn answer_quiz(
        &self,
        game_id: &str,
        is_correct: bool,
        answer: Option<String>,
    ) -> GameResult<QuizOutcome> {
        let mut games = self.games.write().await;
        let mut rounds = self.rounds.write().await;
        let mut teams = self.teams.write().await;

        let game = active_game_mut(&mut games, game_id)?;
        let round = game
            .current_round_id
            .as_ref()
            .and_then(|id| rounds.get_mut(id))
            .filter(|r| r.state == RoundState::Quiz)
            .ok_or_else(|| GameError::validation("No quiz is waiting for an answer"))?;
        let team = round
            .winner_team_id
            .as_ref()
            .and_then(|id| teams.get_mut(id))
            .ok_or_else(|| GameError::not_found("Team"))?;

        Self::transition_locked(game, GameState::Playing)?;
        round.state = RoundState::Completed;
        round.quiz_correct = Some(is_correct);
        if let Some(answer) = answer.filter(|a| !a.trim().is_empty()) {
            round.quiz_answer = Some(answer);
        }
        if is_correct {
            team.score += 1;
        }

        tracing::info!(
            "Quiz for round {} answered {} by '{}'",
            round.number,
            if is_correct { "correctly" } else { "incorrectly" },
            team.name
        );
        Ok(QuizOutcome {
            round: round.clone(),
            team: team.clone(),
            can_steal: is_correct,
        })
    }

    pub async fn add_quiz_question(
        &self,
        question: &str,
        answer: &str,
        category: &str,
    ) -> GameResult<QuizQuestion> {
        let (question, answer) = (question.trim(), answer.trim());
        if question.is_empty() || answer.is_empty() {
            return Err(GameError::validation("Question and answer must not be empty"));
        }
        let category = match category.trim() {
            "" => "general",
            other => other,
        };

        let entry = QuizQuestion {
            id: new_id(),
            question: question.to_string(),
            answer: answer.to_string(),
            category: category.to_string(),
            is_active: true,
        };
        self.quiz_questions.write().await.push(entry.clone());
        Ok(entry)
    }

    /// Current round with per-team voting progress
    pub async fn round_status(&self, game_id: &str) -> GameResult<RoundStatus> {
        {
            let games = self.games.read().await;
            active_game(&games, game_id)?;
        }

        let Some(round) = self.get_current_round(game_id).await else {
            return Ok(RoundStatus {
                round: None,
                teams: Vec::new(),
                seconds_remaining: 0.0,
            });
        };

        let teams = self.all_team_voting_status(&round.id).await?;
        let seconds_remaining = if round.state == RoundState::Voting {
            crate::clock::seconds_remaining(
                round.voting_start_time,
                round.voting_duration_seconds,
                self.now(),
            )
        } else {
            0.0
        };
        Ok(RoundStatus {
            round: Some(round),
            teams,
            seconds_remaining,
        })
    }
}
