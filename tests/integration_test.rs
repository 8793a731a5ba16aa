use std::sync::Arc;
use wedding_quiz::broadcast::finalize_expired_round;
use wedding_quiz::clock::ManualClock;
use wedding_quiz::protocol::{ClientMessage, ServerMessage};
use wedding_quiz::state::AppState;
use wedding_quiz::types::{GameState, Player, RoundState, Role};
use wedding_quiz::ws::handlers::{handle_message, player_state_message};

const MODERATOR: Role = Role::Moderator;
const PLAYER: Role = Role::Player;

async fn send(state: &Arc<AppState>, role: &Role, msg: ClientMessage) -> ServerMessage {
    handle_message(msg, role, state)
        .await
        .expect("every message gets a reply")
}

async fn register(state: &Arc<AppState>, name: &str) -> Player {
    match send(
        state,
        &PLAYER,
        ClientMessage::RegisterPlayer {
            name: name.to_string(),
        },
    )
    .await
    {
        ServerMessage::PlayerRegistered { player } => player,
        other => panic!("Expected PlayerRegistered, got {:?}", other),
    }
}

async fn pair(state: &Arc<AppState>, a: &Player, b: &Player) -> String {
    match send(
        state,
        &MODERATOR,
        ClientMessage::ModPairPlayers {
            player1_id: a.id.clone(),
            player2_id: b.id.clone(),
        },
    )
    .await
    {
        ServerMessage::TeamCreated { team } => {
            assert_eq!(team.members.len(), 2);
            team.id
        }
        other => panic!("Expected TeamCreated, got {:?}", other),
    }
}

async fn vote(state: &Arc<AppState>, player: &Player, number: u32) {
    match send(
        state,
        &PLAYER,
        ClientMessage::SubmitVote {
            player_token: player.token.clone(),
            number,
        },
    )
    .await
    {
        ServerMessage::VoteAccepted { receipt } => assert_eq!(receipt.number, number),
        other => panic!("Expected VoteAccepted, got {:?}", other),
    }
}

fn error_code(msg: &ServerMessage) -> &str {
    match msg {
        ServerMessage::Error { code, .. } => code,
        other => panic!("Expected Error, got {:?}", other),
    }
}

/// End-to-end integration test for a complete game flow
#[tokio::test]
async fn test_full_game_flow() {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let state = Arc::new(AppState::with_clock(clock.clone()));
    let game = state.create_game().await;

    // 1. Guests register from their phones
    let mut guests = Vec::new();
    for name in ["Anna", "Ben", "Clara", "David", "Emma", "Felix", "Greta"] {
        guests.push(register(&state, name).await);
    }
    assert!(guests.iter().all(|p| p.token.len() == 6));

    // 2. Players cannot drive the game
    let denied = send(&state, &PLAYER, ClientMessage::ModStartPairing).await;
    assert_eq!(error_code(&denied), "UNAUTHORIZED");

    // 3. Moderator pairs three teams, Greta stays unpaired
    match send(&state, &MODERATOR, ClientMessage::ModStartPairing).await {
        ServerMessage::GameState { game, .. } => assert_eq!(game.state, GameState::Pairing),
        other => panic!("Expected GameState, got {:?}", other),
    }
    let mut broadcasts = state.broadcast.subscribe();
    let team_a = pair(&state, &guests[0], &guests[1]).await;
    let team_b = pair(&state, &guests[2], &guests[3]).await;
    let _team_c = pair(&state, &guests[4], &guests[5]).await;
    assert!(matches!(
        broadcasts.recv().await.unwrap(),
        ServerMessage::TeamCreated { .. }
    ));

    // 4. Round 1 opens
    let round = match send(&state, &MODERATOR, ClientMessage::ModStartPlaying).await {
        ServerMessage::RoundStarted { round } => round,
        other => panic!("Expected RoundStarted, got {:?}", other),
    };
    assert_eq!(round.number, 1);
    assert_eq!(round.state, RoundState::Voting);

    // 5. Greta has no team, so she received a supporter token
    let tokens = match send(
        &state,
        &MODERATOR,
        ClientMessage::ModIssueTokens { round_number: None },
    )
    .await
    {
        ServerMessage::SupporterTokens {
            round_number,
            tokens,
        } => {
            assert_eq!(round_number, 1);
            tokens
        }
        other => panic!("Expected SupporterTokens, got {:?}", other),
    };
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].player_id, guests[6].id);
    let greta_token = tokens[0].id.clone();

    // Someone else's token cannot be used
    let stolen = send(
        &state,
        &PLAYER,
        ClientMessage::SupporterPredict {
            player_token: guests[0].token.clone(),
            token_id: greta_token.clone(),
            number: 5,
            team_id: team_a.clone(),
        },
    )
    .await;
    assert_eq!(error_code(&stolen), "UNAUTHORIZED");

    match send(
        &state,
        &PLAYER,
        ClientMessage::SupporterPredict {
            player_token: guests[6].token.clone(),
            token_id: greta_token.clone(),
            number: 5,
            team_id: team_a.clone(),
        },
    )
    .await
    {
        ServerMessage::SupporterToken { token } => {
            assert_eq!(token.predicted_number, Some(5));
            assert_eq!(token.predicted_team_id.as_deref(), Some(team_a.as_str()));
        }
        other => panic!("Expected SupporterToken, got {:?}", other),
    }

    // 6. Voting: 3 is taken twice, 5 is the lowest unique number
    let out_of_range = send(
        &state,
        &PLAYER,
        ClientMessage::SubmitVote {
            player_token: guests[0].token.clone(),
            number: 999,
        },
    )
    .await;
    assert_eq!(error_code(&out_of_range), "VALIDATION_ERROR");

    vote(&state, &guests[0], 5).await;
    vote(&state, &guests[1], 5).await;
    vote(&state, &guests[2], 3).await;
    vote(&state, &guests[3], 3).await;
    vote(&state, &guests[4], 3).await;
    vote(&state, &guests[5], 3).await;

    match send(&state, &PLAYER, ClientMessage::GetRoundStatus).await {
        ServerMessage::VoteStatus { round_id, teams, .. } => {
            assert_eq!(round_id, round.id);
            assert_eq!(teams.len(), 3);
            assert!(teams.iter().all(|t| t.votes_count == 2 && t.is_unanimous));
        }
        other => panic!("Expected VoteStatus, got {:?}", other),
    }

    // 7. Finalize: team A wins, Greta guessed right
    let result = match send(&state, &MODERATOR, ClientMessage::ModFinalizeRound).await {
        ServerMessage::RoundResult { result } => result,
        other => panic!("Expected RoundResult, got {:?}", other),
    };
    assert!(!result.is_tie);
    assert_eq!(result.winner_team_id.as_deref(), Some(team_a.as_str()));
    assert_eq!(result.winning_number, Some(5));
    assert!(result.quiz_question.is_some());
    assert_eq!(result.predictions.total, 1);
    assert_eq!(result.predictions.correct, 1);

    let late = send(
        &state,
        &PLAYER,
        ClientMessage::SubmitVote {
            player_token: guests[0].token.clone(),
            number: 4,
        },
    )
    .await;
    assert_eq!(error_code(&late), "VALIDATION_ERROR");

    // 8. Quiz answered correctly, team A may steal
    match send(
        &state,
        &MODERATOR,
        ClientMessage::ModAnswerQuiz {
            is_correct: true,
            answer: Some("Paris".to_string()),
        },
    )
    .await
    {
        ServerMessage::QuizAnswered { outcome } => {
            assert!(outcome.can_steal);
            assert_eq!(outcome.team.id, team_a);
            assert_eq!(outcome.team.score, 1);
        }
        other => panic!("Expected QuizAnswered, got {:?}", other),
    }

    match send(
        &state,
        &MODERATOR,
        ClientMessage::ModStealPlayer {
            source_team_id: team_b.clone(),
            target_team_id: team_a.clone(),
            player_id: guests[2].id.clone(),
        },
    )
    .await
    {
        ServerMessage::PlayerStolen { outcome } => {
            assert_eq!(outcome.player.id, guests[2].id);
            assert_eq!(outcome.target_team.id, team_a);
        }
        other => panic!("Expected PlayerStolen, got {:?}", other),
    }

    // 9. Greta spends her correct token and rejoins the smallest team
    match send(
        &state,
        &PLAYER,
        ClientMessage::RedeemToken {
            player_token: guests[6].token.clone(),
            token_id: greta_token.clone(),
        },
    )
    .await
    {
        ServerMessage::SupporterRejoined { outcome } => {
            assert_eq!(outcome.player.id, guests[6].id);
            assert_ne!(outcome.team.id, team_a);
            assert!(outcome.token.used_at.is_some());
        }
        other => panic!("Expected SupporterRejoined, got {:?}", other),
    }

    let twice = send(
        &state,
        &PLAYER,
        ClientMessage::RedeemToken {
            player_token: guests[6].token.clone(),
            token_id: greta_token,
        },
    )
    .await;
    assert_eq!(error_code(&twice), "INVALID_TOKEN_STATE");

    // Reconnecting restores her team
    match player_state_message(&state, &guests[6].token).await.unwrap() {
        ServerMessage::PlayerState { player, team, .. } => {
            assert!(player.is_active);
            let team = team.expect("rejoined player has a team");
            assert!(team.members.iter().any(|m| m.id == guests[6].id));
        }
        other => panic!("Expected PlayerState, got {:?}", other),
    }

    // 10. Round 2 runs out on its own
    let round2 = match send(&state, &MODERATOR, ClientMessage::ModStartRound).await {
        ServerMessage::RoundStarted { round } => round,
        other => panic!("Expected RoundStarted, got {:?}", other),
    };
    assert_eq!(round2.number, 2);

    clock.advance(chrono::Duration::seconds(
        round2.voting_duration_seconds as i64 + 1,
    ));
    assert!(finalize_expired_round(&state).await);
    let round2 = state.get_round(&round2.id).await.unwrap();
    assert_ne!(round2.state, RoundState::Voting);

    // 11. Stats reflect the moderator log
    match send(&state, &MODERATOR, ClientMessage::ModStats).await {
        ServerMessage::Stats { stats } => {
            assert_eq!(stats.current_round, 2);
            assert!(stats
                .recent_actions
                .iter()
                .any(|a| a.action_type == "steal_player"));
            assert!(stats
                .recent_actions
                .iter()
                .any(|a| a.action_type == "supporter_rejoin"));
        }
        other => panic!("Expected Stats, got {:?}", other),
    }

    assert_eq!(state.current_game_id().await.unwrap(), game.id);
}

#[tokio::test]
async fn test_pause_blocks_rounds_and_reset_starts_over() {
    let state = Arc::new(AppState::new());
    let old_game = state.create_game().await;

    let guests = [
        register(&state, "Hanna").await,
        register(&state, "Ivo").await,
    ];
    pair(&state, &guests[0], &guests[1]).await;
    send(&state, &MODERATOR, ClientMessage::ModStartPlaying).await;
    send(&state, &MODERATOR, ClientMessage::ModFinalizeRound).await;

    match send(&state, &MODERATOR, ClientMessage::ModTogglePause).await {
        ServerMessage::PauseUpdate { is_paused } => assert!(is_paused),
        other => panic!("Expected PauseUpdate, got {:?}", other),
    }
    let blocked = send(&state, &MODERATOR, ClientMessage::ModStartRound).await;
    assert_eq!(error_code(&blocked), "VALIDATION_ERROR");

    let new_game = match send(&state, &MODERATOR, ClientMessage::ModResetGame).await {
        ServerMessage::GameReset { game } => game,
        other => panic!("Expected GameReset, got {:?}", other),
    };
    assert_ne!(new_game.id, old_game.id);
    assert_eq!(new_game.state, GameState::Registration);

    match send(&state, &PLAYER, ClientMessage::GetGameState).await {
        ServerMessage::GameState { game, teams } => {
            assert_eq!(game.id, new_game.id);
            assert!(teams.is_empty());
        }
        other => panic!("Expected GameState, got {:?}", other),
    }

    // Old session tokens no longer count as active players
    match player_state_message(&state, &guests[0].token).await.unwrap() {
        ServerMessage::PlayerState { player, team, .. } => {
            assert!(!player.is_active);
            assert!(team.is_none());
        }
        other => panic!("Expected PlayerState, got {:?}", other),
    }
}

#[tokio::test]
async fn test_drink_break_pauses_and_resumes() {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let state = Arc::new(AppState::with_clock(clock.clone()));
    let game = state.create_game().await;

    let guests = [
        register(&state, "Jana").await,
        register(&state, "Karl").await,
    ];
    pair(&state, &guests[0], &guests[1]).await;
    send(&state, &MODERATOR, ClientMessage::ModStartPlaying).await;

    let denied = send(
        &state,
        &PLAYER,
        ClientMessage::ModDrinkBreak {
            message: None,
            duration_seconds: None,
        },
    )
    .await;
    assert_eq!(error_code(&denied), "UNAUTHORIZED");

    let mut rx = state.broadcast.subscribe();
    match send(
        &state,
        &MODERATOR,
        ClientMessage::ModDrinkBreak {
            message: Some("To the newlyweds!".to_string()),
            duration_seconds: Some(120),
        },
    )
    .await
    {
        ServerMessage::DrinkBreak { drink_break } => {
            assert_eq!(drink_break.message, "To the newlyweds!");
            assert_eq!(drink_break.duration_seconds, 120);
            assert_eq!(drink_break.teams_notified, 1);
            assert_eq!(drink_break.players_notified, 2);
        }
        other => panic!("Expected DrinkBreak, got {:?}", other),
    }
    assert!(matches!(
        rx.recv().await.unwrap(),
        ServerMessage::DrinkBreak { .. }
    ));
    assert!(state.get_game(&game.id).await.unwrap().is_paused);

    // The break holds the voting deadline
    clock.advance(chrono::Duration::seconds(600));
    assert!(!finalize_expired_round(&state).await);

    match send(&state, &MODERATOR, ClientMessage::ModResumeGame).await {
        ServerMessage::PauseUpdate { is_paused } => assert!(!is_paused),
        other => panic!("Expected PauseUpdate, got {:?}", other),
    }
    assert!(matches!(
        rx.recv().await.unwrap(),
        ServerMessage::PauseUpdate { is_paused: false }
    ));

    let again = send(&state, &MODERATOR, ClientMessage::ModResumeGame).await;
    assert_eq!(error_code(&again), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_settings_changes() {
    let state = Arc::new(AppState::new());
    state.create_game().await;

    let denied = send(
        &state,
        &PLAYER,
        ClientMessage::ModApplyPreset {
            preset: wedding_quiz::settings::Preset::Sprint,
        },
    )
    .await;
    assert_eq!(error_code(&denied), "UNAUTHORIZED");

    match send(
        &state,
        &MODERATOR,
        ClientMessage::ModApplyPreset {
            preset: wedding_quiz::settings::Preset::Sprint,
        },
    )
    .await
    {
        ServerMessage::Settings { settings } => {
            assert!(settings.is_sprint_mode);
            assert_eq!(settings.effective_voting_duration(), 15);
        }
        other => panic!("Expected Settings, got {:?}", other),
    }

    let invalid: ClientMessage = serde_json::from_str(
        r#"{"t":"mod_update_settings","update":{"number_range_max":500}}"#,
    )
    .unwrap();
    let rejected = send(&state, &MODERATOR, invalid).await;
    assert_eq!(error_code(&rejected), "VALIDATION_ERROR");

    match send(&state, &PLAYER, ClientMessage::GetSettings).await {
        ServerMessage::Settings { settings } => {
            assert!(settings.is_sprint_mode);
            assert_ne!(settings.number_range_max, 500);
        }
        other => panic!("Expected Settings, got {:?}", other),
    }
}
