use crate::clock::voting_window_open;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{GameState, RoundState};
use crate::ws::moderator::finalize_and_announce;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEADLINE_POLL: Duration = Duration::from_millis(250);
const VOTE_STATUS_INTERVAL: Duration = Duration::from_millis(500);

/// Finalize the current round if its voting window has run out.
///
/// Returns true when a round was finalized. Paused and finished games are left alone.
pub async fn finalize_expired_round(state: &Arc<AppState>) -> bool {
    let Some(game) = state.get_current_game().await else {
        return false;
    };
    if game.is_paused || game.state == GameState::Finished {
        return false;
    }
    let Some(round) = state.get_current_round(&game.id).await else {
        return false;
    };
    if round.state != RoundState::Voting
        || voting_window_open(
            round.voting_start_time,
            round.voting_duration_seconds,
            state.now(),
        )
    {
        return false;
    }

    tracing::info!("Voting deadline reached for round {}, finalizing", round.number);
    match finalize_and_announce(state, &game.id, &round.id).await {
        Ok(_) => true,
        Err(e) => {
            // The moderator may have finalized in the meantime
            tracing::debug!("Auto-finalize of round {} skipped: {}", round.number, e);
            false
        }
    }
}

/// Spawn a background task that closes voting once the deadline has passed
pub fn spawn_voting_deadline_watcher(state: Arc<AppState>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(DEADLINE_POLL).await;
            finalize_expired_round(&state).await;
        }
    });
}

/// Spawn a background task that broadcasts per-team vote progress to screens
/// and the moderator while a round is voting
pub fn spawn_vote_status_broadcaster(state: Arc<AppState>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(VOTE_STATUS_INTERVAL).await;

            let Some(game) = state.get_current_game().await else {
                continue;
            };
            let Ok(status) = state.round_status(&game.id).await else {
                continue;
            };
            let Some(round) = status.round else {
                continue;
            };
            if round.state != RoundState::Voting {
                continue;
            }

            let msg = ServerMessage::VoteStatus {
                round_id: round.id,
                teams: status.teams,
                seconds_remaining: status.seconds_remaining,
            };
            state.broadcast_to_moderator(msg.clone());
            state.broadcast_to_screens(msg);
        }
    });
}

/// Spawn a background task that writes the state snapshot every `interval`
pub fn spawn_snapshot_writer(state: Arc<AppState>, path: PathBuf, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = state.save_snapshot(&path).await {
                tracing::warn!("Failed to write snapshot to {}: {}", path.display(), e);
            }
        }
    });
}
