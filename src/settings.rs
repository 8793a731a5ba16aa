//! Game-speed parameters the moderator can tune between rounds.

use crate::error::{GameError, GameResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Voting duration used whenever sprint mode is on
pub const SPRINT_VOTING_SECONDS: u32 = 15;

pub const MIN_VOTING_SECONDS: u32 = 10;
pub const MAX_VOTING_SECONDS: u32 = 60;
pub const MIN_NUMBER_RANGE_MAX: u32 = 15;
pub const MAX_NUMBER_RANGE_MAX: u32 = 50;

/// Lowest number a player may vote for
pub const NUMBER_RANGE_MIN: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSettings {
    pub voting_duration_seconds: u32,
    pub is_sprint_mode: bool,
    /// Blocks stealing straight back from the team that just stole
    pub protection_enabled: bool,
    /// Keeps a team alive when it is stolen down to one member
    pub rescue_round_enabled: bool,
    pub number_range_max: u32,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Preset::Normal.settings()
    }
}

impl GameSettings {
    pub fn effective_voting_duration(&self) -> u32 {
        if self.is_sprint_mode {
            SPRINT_VOTING_SECONDS
        } else {
            self.voting_duration_seconds
        }
    }

    pub fn effective_number_range(&self) -> (u32, u32) {
        (NUMBER_RANGE_MIN, self.number_range_max)
    }

    pub fn single_team_elimination_allowed(&self) -> bool {
        !self.rescue_round_enabled
    }

    pub fn immediate_steal_back_allowed(&self) -> bool {
        !self.protection_enabled
    }

    pub fn contains_number(&self, number: u32) -> bool {
        let (min, max) = self.effective_number_range();
        (min..=max).contains(&number)
    }

    /// Apply a partial update. Either every field is applied or none is.
    pub fn apply(&mut self, update: &SettingsUpdate) -> GameResult<()> {
        if let Some(duration) = update.voting_duration_seconds {
            if !(MIN_VOTING_SECONDS..=MAX_VOTING_SECONDS).contains(&duration) {
                return Err(GameError::validation(format!(
                    "voting_duration_seconds must be between {} and {}",
                    MIN_VOTING_SECONDS, MAX_VOTING_SECONDS
                )));
            }
        }
        if let Some(max) = update.number_range_max {
            if !(MIN_NUMBER_RANGE_MAX..=MAX_NUMBER_RANGE_MAX).contains(&max) {
                return Err(GameError::validation(format!(
                    "number_range_max must be between {} and {}",
                    MIN_NUMBER_RANGE_MAX, MAX_NUMBER_RANGE_MAX
                )));
            }
        }

        if let Some(duration) = update.voting_duration_seconds {
            self.voting_duration_seconds = duration;
        }
        if let Some(sprint) = update.is_sprint_mode {
            self.is_sprint_mode = sprint;
        }
        if let Some(protection) = update.protection_enabled {
            self.protection_enabled = protection;
        }
        if let Some(rescue) = update.rescue_round_enabled {
            self.rescue_round_enabled = rescue;
        }
        if let Some(max) = update.number_range_max {
            self.number_range_max = max;
        }
        Ok(())
    }
}

/// Partial settings change sent by the moderator
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub voting_duration_seconds: Option<u32>,
    #[serde(default)]
    pub is_sprint_mode: Option<bool>,
    #[serde(default)]
    pub protection_enabled: Option<bool>,
    #[serde(default)]
    pub rescue_round_enabled: Option<bool>,
    #[serde(default)]
    pub number_range_max: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Normal,
    Sprint,
    Fast,
    Casual,
}

impl Preset {
    pub const ALL: [Preset; 4] = [Preset::Normal, Preset::Sprint, Preset::Fast, Preset::Casual];

    pub fn settings(self) -> GameSettings {
        let (voting_duration_seconds, is_sprint_mode, protection_enabled, rescue_round_enabled, number_range_max) =
            match self {
                Preset::Normal => (20, false, true, true, 20),
                Preset::Sprint => (20, true, false, false, 25),
                Preset::Fast => (20, false, false, true, 25),
                Preset::Casual => (25, false, true, true, 20),
            };
        GameSettings {
            voting_duration_seconds,
            is_sprint_mode,
            protection_enabled,
            rescue_round_enabled,
            number_range_max,
            updated_at: None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Preset::Normal => "normal",
            Preset::Sprint => "sprint",
            Preset::Fast => "fast",
            Preset::Casual => "casual",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Preset::Normal => "20s voting, protection on, rescue on, numbers 1-20",
            Preset::Sprint => "15s voting, protection off, rescue off, numbers 1-25",
            Preset::Fast => "20s voting, protection off, rescue on, numbers 1-25",
            Preset::Casual => "25s voting, protection on, rescue on, numbers 1-20",
        }
    }
}

impl FromStr for Preset {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GameError::validation(format!("Unknown preset '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_normal_preset() {
        let settings = GameSettings::default();
        assert_eq!(settings.voting_duration_seconds, 20);
        assert_eq!(settings.number_range_max, 20);
        assert!(settings.protection_enabled);
        assert!(settings.rescue_round_enabled);
        assert!(!settings.is_sprint_mode);
    }

    #[test]
    fn test_sprint_mode_overrides_duration() {
        let mut settings = GameSettings::default();
        settings.voting_duration_seconds = 40;
        assert_eq!(settings.effective_voting_duration(), 40);
        settings.is_sprint_mode = true;
        assert_eq!(settings.effective_voting_duration(), 15);
    }

    #[test]
    fn test_derived_flags() {
        let settings = Preset::Sprint.settings();
        assert!(settings.single_team_elimination_allowed());
        assert!(settings.immediate_steal_back_allowed());

        let settings = Preset::Normal.settings();
        assert!(!settings.single_team_elimination_allowed());
        assert!(!settings.immediate_steal_back_allowed());
    }

    #[test]
    fn test_number_range() {
        let settings = Preset::Fast.settings();
        assert_eq!(settings.effective_number_range(), (1, 25));
        assert!(settings.contains_number(1));
        assert!(settings.contains_number(25));
        assert!(!settings.contains_number(0));
        assert!(!settings.contains_number(26));
    }

    #[test]
    fn test_apply_rejects_out_of_range_atomically() {
        let mut settings = GameSettings::default();
        let update = SettingsUpdate {
            is_sprint_mode: Some(true),
            voting_duration_seconds: Some(61),
            ..Default::default()
        };
        let result = settings.apply(&update);
        assert!(matches!(result, Err(GameError::Validation(_))));
        // Nothing applied, not even the valid sprint flag
        assert_eq!(settings, GameSettings::default());

        let update = SettingsUpdate {
            number_range_max: Some(14),
            ..Default::default()
        };
        assert!(settings.apply(&update).is_err());
    }

    #[test]
    fn test_apply_accepts_bounds() {
        let mut settings = GameSettings::default();
        let update = SettingsUpdate {
            voting_duration_seconds: Some(10),
            number_range_max: Some(50),
            rescue_round_enabled: Some(false),
            ..Default::default()
        };
        settings.apply(&update).unwrap();
        assert_eq!(settings.voting_duration_seconds, 10);
        assert_eq!(settings.number_range_max, 50);
        assert!(!settings.rescue_round_enabled);
    }

    #[test]
    fn test_preset_parsing() {
        assert_eq!("casual".parse::<Preset>().unwrap(), Preset::Casual);
        assert_eq!(" SPRINT ".parse::<Preset>().unwrap(), Preset::Sprint);
        assert!("turbo".parse::<Preset>().is_err());
    }

    #[test]
    fn test_casual_preset() {
        let settings = Preset::Casual.settings();
        assert_eq!(settings.effective_voting_duration(), 25);
        assert_eq!(settings.number_range_max, 20);
    }
}
