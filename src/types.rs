use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type GameId = String;
pub type RoundId = String;
pub type TeamId = String;
pub type PlayerId = String;
pub type VoteId = String;
pub type TokenId = String;
pub type QuizQuestionId = String;
pub type ActionId = String;

pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    Registration,
    Pairing,
    Playing,
    Quiz,
    Finished,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundState {
    Voting,
    Calculating,
    Quiz,
    Completed,
}

/// A team that just stole cannot be stolen from until `until_round` has passed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StealProtection {
    pub team_id: TeamId,
    pub until_round: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub version: u64,
    pub state: GameState,
    pub current_round: u32,
    pub current_round_id: Option<RoundId>,
    pub is_paused: bool,
    pub is_active: bool,
    /// One entry per stealing team still inside its window
    #[serde(default)]
    pub protections: Vec<StealProtection>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub game_id: GameId,
    pub name: String,
    pub nickname: String,
    /// Session token the phone keeps for reconnects
    pub token: String,
    pub team_id: Option<TeamId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub game_id: GameId,
    pub name: String,
    /// Insertion order within the game, used for stable tie-breaks
    pub position: u32,
    pub score: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub game_id: GameId,
    pub number: u32,
    pub state: RoundState,
    pub voting_start_time: DateTime<Utc>,
    pub voting_end_time: Option<DateTime<Utc>>,
    pub voting_duration_seconds: u32,
    pub winner_team_id: Option<TeamId>,
    pub winning_number: Option<u32>,
    pub quiz_question: Option<String>,
    pub quiz_answer: Option<String>,
    pub quiz_correct: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub round_id: RoundId,
    pub player_id: PlayerId,
    /// Team at submission time
    pub team_id: Option<TeamId>,
    pub number: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupporterToken {
    pub id: TokenId,
    pub player_id: PlayerId,
    pub game_id: GameId,
    /// Round in which the token was handed out
    pub round_number: u32,
    pub is_active: bool,
    pub predicted_number: Option<u32>,
    pub predicted_team_id: Option<TeamId>,
    pub is_prediction_correct: Option<bool>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: QuizQuestionId,
    pub question: String,
    pub answer: String,
    pub category: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorAction {
    pub id: ActionId,
    pub game_id: GameId,
    pub action_type: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Moderator,
    Player,
    Screen,
}

/// Questions used when no quiz question has been loaded
pub const DEFAULT_QUIZ_QUESTIONS: &[(&str, &str)] = &[
    ("Where was the couple's first date?", "Ask the couple"),
    ("Who said 'I love you' first?", "Ask the couple"),
    ("What is the couple's favourite show to watch together?", "Ask the couple"),
    ("How many children are they planning?", "Ask the couple"),
    ("Which of them is messier at home?", "Ask the couple"),
];
