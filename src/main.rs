use axum::{routing::get, Extension, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wedding_quiz::{api, auth, broadcast, config::ServerConfig, state::AppState, ws};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wedding_quiz=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting wedding quiz...");

    let config = ServerConfig::from_env();
    let auth_config = Arc::new(auth::AuthConfig::from_env());

    let state = Arc::new(AppState::new().with_default_settings(config.default_settings()));

    // Restore the last snapshot, if any
    if let Some(path) = &config.snapshot_path {
        match state.load_snapshot(path).await {
            Ok(true) => tracing::info!("Restored snapshot from {}", path.display()),
            Ok(false) => tracing::info!("No snapshot at {}, starting fresh", path.display()),
            Err(e) => tracing::warn!("Ignoring snapshot {}: {}", path.display(), e),
        }
    }
    if state.get_current_game().await.is_none() {
        state.create_game().await;
    }

    broadcast::spawn_voting_deadline_watcher(state.clone());
    broadcast::spawn_vote_status_broadcaster(state.clone());
    if let Some(path) = config.snapshot_path.clone() {
        broadcast::spawn_snapshot_writer(state.clone(), path, config.snapshot_interval);
    }

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(api::routes(auth_config.clone()))
        .fallback_service(ServeDir::new("static"))
        .layer(Extension(auth_config))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await
}
