use crate::error::GameError;
use crate::settings::{GameSettings, Preset, SettingsUpdate};
use crate::state::{
    BalanceReport, DrinkBreak, EvaluationSummary, GameStats, MoveOutcome, QuizOutcome, RebalanceOutcome,
    RejoinOutcome, RoundResult, StealOutcome, TeamVotingStatus, VoteReceipt,
};
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    RegisterPlayer {
        name: String,
    },
    SubmitVote {
        player_token: String,
        number: u32,
    },
    /// Eliminated player guesses the round's winner and number
    SupporterPredict {
        player_token: String,
        token_id: TokenId,
        number: u32,
        team_id: TeamId,
    },
    RedeemToken {
        player_token: String,
        token_id: TokenId,
    },
    GetSettings,
    GetGameState,
    GetRoundStatus,
    // Moderator-only messages
    ModPairPlayers {
        player1_id: PlayerId,
        player2_id: PlayerId,
    },
    ModStartPairing,
    ModStartPlaying,
    ModStartRound,
    ModFinalizeRound,
    ModAnswerQuiz {
        is_correct: bool,
        #[serde(default)]
        answer: Option<String>,
    },
    ModStealPlayer {
        source_team_id: TeamId,
        target_team_id: TeamId,
        player_id: PlayerId,
    },
    ModMovePlayer {
        player_id: PlayerId,
        team_id: TeamId,
    },
    ModAutoBalance,
    ModCheckBalance,
    ModTogglePause,
    /// Pause with an announcement; defaults apply to missing fields
    ModDrinkBreak {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        duration_seconds: Option<u32>,
    },
    ModResumeGame,
    /// Defaults to the current round
    ModIssueTokens {
        #[serde(default)]
        round_number: Option<u32>,
    },
    ModEvaluatePredictions {
        round_number: u32,
        winner_team_id: Option<TeamId>,
        winning_number: Option<u32>,
    },
    ModUpdateSettings {
        update: SettingsUpdate,
    },
    ModApplyPreset {
        preset: Preset,
    },
    ModResetGame,
    ModEndGame,
    ModStats,
    ModAddQuizQuestion {
        question: String,
        answer: String,
        #[serde(default)]
        category: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        game: Option<Game>,
        server_now: String,
    },
    /// Sent only to the registering phone; carries the session token
    PlayerRegistered {
        player: Player,
    },
    /// Moderator/screen notice that somebody joined
    PlayerJoined {
        player_id: PlayerId,
        nickname: String,
    },
    /// Sent to players on reconnect with their current state
    PlayerState {
        player: Player,
        team: Option<TeamInfo>,
        active_token: Option<SupporterToken>,
        redeemable_tokens: Vec<SupporterToken>,
    },
    GameState {
        game: Game,
        teams: Vec<TeamInfo>,
    },
    Settings {
        settings: GameSettings,
    },
    TeamCreated {
        team: TeamInfo,
    },
    RoundStarted {
        round: Round,
    },
    VoteAccepted {
        receipt: VoteReceipt,
    },
    /// Live voting progress for screens and the moderator
    VoteStatus {
        round_id: RoundId,
        teams: Vec<TeamVotingStatus>,
        seconds_remaining: f64,
    },
    RoundResult {
        result: RoundResult,
    },
    QuizAnswered {
        outcome: QuizOutcome,
    },
    PlayerStolen {
        outcome: StealOutcome,
    },
    PlayerMoved {
        outcome: MoveOutcome,
    },
    Balance {
        report: BalanceReport,
    },
    Rebalanced {
        outcome: RebalanceOutcome,
    },
    PauseUpdate {
        is_paused: bool,
    },
    DrinkBreak {
        drink_break: DrinkBreak,
    },
    /// Active tokens of a round (moderator)
    SupporterTokens {
        round_number: u32,
        tokens: Vec<SupporterToken>,
    },
    SupporterToken {
        token: SupporterToken,
    },
    PredictionsEvaluated {
        summary: EvaluationSummary,
    },
    SupporterRejoined {
        outcome: RejoinOutcome,
    },
    Stats {
        stats: GameStats,
    },
    QuizQuestionAdded {
        question: QuizQuestion,
    },
    GameReset {
        game: Game,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl From<GameError> for ServerMessage {
    fn from(e: GameError) -> Self {
        ServerMessage::Error {
            code: e.code().to_string(),
            msg: e.to_string(),
        }
    }
}

/// Public view of a team member (no session token)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberInfo {
    pub id: PlayerId,
    pub name: String,
    pub nickname: String,
}

impl From<&Player> for MemberInfo {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            nickname: p.nickname.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamInfo {
    pub id: TeamId,
    pub name: String,
    pub position: u32,
    pub score: u32,
    pub is_active: bool,
    pub members: Vec<MemberInfo>,
}

impl TeamInfo {
    /// Build the view from the team and the active players pointing at it
    pub fn build<'a>(team: &Team, players: impl IntoIterator<Item = &'a Player>) -> Self {
        let mut members: Vec<&Player> = players
            .into_iter()
            .filter(|p| p.is_active && p.team_id.as_deref() == Some(team.id.as_str()))
            .collect();
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Self {
            id: team.id.clone(),
            name: team.name.clone(),
            position: team.position,
            score: team.score,
            is_active: team.is_active,
            members: members.into_iter().map(MemberInfo::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_tags() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"t":"submit_vote","player_token":"ABC234","number":7}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::SubmitVote { number: 7, .. }));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"t":"mod_apply_preset","preset":"sprint"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::ModApplyPreset {
                preset: Preset::Sprint
            }
        ));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"t":"mod_update_settings","update":{"number_range_max":30}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::ModUpdateSettings { update } => {
                assert_eq!(update.number_range_max, Some(30));
                assert!(update.voting_duration_seconds.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_from_game_error() {
        let msg: ServerMessage = GameError::not_found("Team").into();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["t"], "error");
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["msg"], "Team not found");
    }

    #[test]
    fn test_team_info_hides_tokens_and_inactive() {
        let now = chrono::Utc::now();
        let team = Team {
            id: "t1".into(),
            game_id: "g".into(),
            name: "Cake Squad".into(),
            position: 0,
            score: 2,
            is_active: true,
            created_at: now,
        };
        let player = |id: &str, active: bool| Player {
            id: id.into(),
            game_id: "g".into(),
            name: id.to_uppercase(),
            nickname: "Best Man".into(),
            token: "SECRET".into(),
            team_id: Some("t1".into()),
            is_active: active,
            created_at: now,
        };
        let players = [player("a", true), player("b", false)];

        let info = TeamInfo::build(&team, &players);
        assert_eq!(info.members.len(), 1);
        assert_eq!(info.members[0].id, "a");
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("SECRET"));
    }
}
