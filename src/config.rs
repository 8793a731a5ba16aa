//! Server configuration loaded from the environment

use crate::settings::{GameSettings, Preset};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// JSON snapshot file; snapshots are disabled when unset
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_interval: Duration,
    /// Preset applied to every newly created game
    pub default_preset: Option<Preset>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            snapshot_path: None,
            snapshot_interval: Duration::from_secs(DEFAULT_SNAPSHOT_INTERVAL_SECS),
            default_preset: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment variables.
    ///
    /// Unparseable values are logged and replaced by their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = match std::env::var("BIND_ADDR") {
            Ok(v) => v.parse().unwrap_or_else(|e| {
                tracing::warn!("Invalid BIND_ADDR {:?} ({}), using {}", v, e, DEFAULT_BIND_ADDR);
                defaults.bind_addr
            }),
            Err(_) => defaults.bind_addr,
        };

        let snapshot_path = std::env::var("SNAPSHOT_PATH")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let snapshot_interval = match std::env::var("SNAPSHOT_INTERVAL_SECS") {
            Ok(v) => match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    tracing::warn!(
                        "Invalid SNAPSHOT_INTERVAL_SECS {:?}, using {}",
                        v,
                        DEFAULT_SNAPSHOT_INTERVAL_SECS
                    );
                    defaults.snapshot_interval
                }
            },
            Err(_) => defaults.snapshot_interval,
        };

        let default_preset = match std::env::var("DEFAULT_PRESET") {
            Ok(v) if !v.trim().is_empty() => match v.trim().parse::<Preset>() {
                Ok(preset) => Some(preset),
                Err(e) => {
                    tracing::warn!("Ignoring DEFAULT_PRESET: {}", e);
                    None
                }
            },
            _ => None,
        };

        Self {
            bind_addr,
            snapshot_path,
            snapshot_interval,
            default_preset,
        }
    }

    /// Settings every new game starts with
    pub fn default_settings(&self) -> GameSettings {
        self.default_preset
            .map(Preset::settings)
            .unwrap_or_default()
    }
}
