use super::{active_game, AppState};
use crate::error::GameResult;
use crate::settings::{GameSettings, Preset, SettingsUpdate};

impl AppState {
    pub async fn get_settings(&self, game_id: &str) -> GameResult<GameSettings> {
        let games = self.games.read().await;
        active_game(&games, game_id)?;
        Ok(super::settings_for(&*self.settings.read().await, game_id))
    }

    /// Validate and apply a partial update as one unit
    pub async fn update_settings(
        &self,
        game_id: &str,
        update: SettingsUpdate,
    ) -> GameResult<GameSettings> {
        let updated = {
            let games = self.games.read().await;
            let mut settings = self.settings.write().await;
            active_game(&games, game_id)?;

            let mut next = super::settings_for(&settings, game_id);
            next.apply(&update)?;
            next.updated_at = Some(self.now().to_rfc3339());
            settings.insert(game_id.to_string(), next.clone());
            next
        };

        let description = format!(
            "Settings updated: {}s voting, sprint {}, protection {}, rescue {}, numbers 1-{}",
            updated.voting_duration_seconds,
            updated.is_sprint_mode,
            updated.protection_enabled,
            updated.rescue_round_enabled,
            updated.number_range_max
        );
        tracing::info!("{}", description);
        self.record_action(game_id, "update_settings", description)
            .await;
        Ok(updated)
    }

    /// Replace all tunable fields with a named preset
    pub async fn apply_preset(&self, game_id: &str, preset: Preset) -> GameResult<GameSettings> {
        let updated = {
            let games = self.games.read().await;
            let mut settings = self.settings.write().await;
            active_game(&games, game_id)?;

            let mut next = preset.settings();
            next.updated_at = Some(self.now().to_rfc3339());
            settings.insert(game_id.to_string(), next.clone());
            next
        };

        tracing::info!("Applied preset '{}' to game {}", preset.name(), game_id);
        self.record_action(
            game_id,
            "apply_preset",
            format!("Preset '{}' applied", preset.name()),
        )
        .await;
        Ok(updated)
    }
}
