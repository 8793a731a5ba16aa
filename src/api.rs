//! HTTP API endpoints.
//!
//! Read-only game info for displays, plus snapshot export/import for the
//! moderator (HTTP Basic Auth).

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{self, AuthConfig};
use crate::error::GameResult;
use crate::protocol::TeamInfo;
use crate::settings::{GameSettings, Preset};
use crate::state::export::GameStateExport;
use crate::state::AppState;
use crate::types::Game;
use crate::ws::handlers::{broadcast_game_state, team_infos};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetInfo {
    pub preset: Preset,
    pub name: String,
    pub description: String,
    pub settings: GameSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOverview {
    pub game: Game,
    pub settings: GameSettings,
    pub teams: Vec<TeamInfo>,
}

/// All routes under `/api`
pub fn routes(auth_config: Arc<AuthConfig>) -> Router<Arc<AppState>> {
    let moderator_routes = Router::new()
        .route("/api/state/export", get(export_state))
        .route("/api/state/import", post(import_state))
        .layer(middleware::from_fn_with_state(
            auth_config,
            auth::moderator_auth_middleware,
        ));

    Router::new()
        .route("/api/settings/presets", get(list_presets))
        .route("/api/game", get(current_game))
        .merge(moderator_routes)
}

/// List the settings presets.
///
/// GET /api/settings/presets
pub async fn list_presets() -> Json<Vec<PresetInfo>> {
    Json(
        Preset::ALL
            .iter()
            .map(|preset| PresetInfo {
                preset: *preset,
                name: preset.name().to_string(),
                description: preset.description().to_string(),
                settings: preset.settings(),
            })
            .collect(),
    )
}

/// Current game with its settings and active teams.
///
/// GET /api/game
pub async fn current_game(State(state): State<Arc<AppState>>) -> GameResult<Json<GameOverview>> {
    let game_id = state.current_game_id().await?;
    let game = state.get_game(&game_id).await?;
    let settings = state.get_settings(&game_id).await?;
    let teams = team_infos(&state, &game_id).await;
    Ok(Json(GameOverview {
        game,
        settings,
        teams,
    }))
}

/// Export the entire game state as JSON.
///
/// GET /api/state/export
pub async fn export_state(State(state): State<Arc<AppState>>) -> Json<GameStateExport> {
    let export = state.export_state().await;
    Json(export)
}

/// Import a game state snapshot.
///
/// POST /api/state/import
///
/// Replaces all current state with the imported data.
/// Broadcasts state refresh to all connected clients.
pub async fn import_state(
    State(state): State<Arc<AppState>>,
    Json(export): Json<GameStateExport>,
) -> Response {
    match state.import_state(export).await {
        Ok(()) => {
            broadcast_game_state(&state).await;
            (StatusCode::OK, "State imported successfully").into_response()
        }
        Err(e) => {
            tracing::error!("State import failed: {}", e);
            (StatusCode::BAD_REQUEST, format!("Import failed: {}", e)).into_response()
        }
    }
}
