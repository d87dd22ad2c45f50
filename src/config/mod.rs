//! # Configuration
//!
//! TOML configuration for the server, the sled store, the combat rules and logging.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:4000"
//! max_sessions = 64
//! welcome = "Welcome to the realm."
//!
//! [storage]
//! data_dir = "./data"
//! # seed_file = "creatures.json"
//!
//! [game]
//! tick_interval_ms = 1000
//! notice_delay_secs = 5
//! start_room = "town_square"
//! creature_flee_chance = 30
//! skill_improve_chance = 20
//! fumble_chance = 2
//! respawn_creatures = true
//!
//! [logging]
//! level = "info"
//! file = "mudcore.log"
//! ```
//!
//! Sections other than `[server]` and `[storage]` may be omitted and fall back to
//! their defaults. Call [`Config::validate`] after loading.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::mud::seed::START_ROOM_ID;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default)]
    pub welcome: String,
}

fn default_max_sessions() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Optional JSON array of creature templates imported by `init`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<String>,
}

impl StorageConfig {
    /// Location of the sled database.
    pub fn world_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("world")
    }
}

/// Combat and world-tick tunables. All chances are percentages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// How long a creature must have been in a room before it notices anyone.
    #[serde(default = "default_notice_delay_secs")]
    pub notice_delay_secs: u64,
    /// Where new characters appear and where defeated characters without a
    /// home room wake up.
    #[serde(default = "default_start_room")]
    pub start_room: String,
    #[serde(default = "default_creature_flee_chance")]
    pub creature_flee_chance: i32,
    #[serde(default = "default_skill_improve_chance")]
    pub skill_improve_chance: i32,
    #[serde(default = "default_fumble_chance")]
    pub fumble_chance: i32,
    #[serde(default = "default_respawn_creatures")]
    pub respawn_creatures: bool,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_notice_delay_secs() -> u64 {
    5
}

fn default_start_room() -> String {
    START_ROOM_ID.to_string()
}

fn default_creature_flee_chance() -> i32 {
    30
}

fn default_skill_improve_chance() -> i32 {
    20
}

fn default_fumble_chance() -> i32 {
    2
}

fn default_respawn_creatures() -> bool {
    true
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            notice_delay_secs: default_notice_delay_secs(),
            start_room: default_start_room(),
            creature_flee_chance: default_creature_flee_chance(),
            skill_improve_chance: default_skill_improve_chance(),
            fumble_chance: default_fumble_chance(),
            respawn_creatures: default_respawn_creatures(),
        }
    }
}

impl GameConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn notice_delay(&self) -> Duration {
        Duration::from_secs(self.notice_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            return Err(anyhow!("server.bind must not be empty"));
        }
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        if self.game.tick_interval_ms == 0 {
            return Err(anyhow!("game.tick_interval_ms must be greater than zero"));
        }
        if self.game.start_room.trim().is_empty() {
            return Err(anyhow!("game.start_room must not be empty"));
        }
        for (name, value) in [
            ("creature_flee_chance", self.game.creature_flee_chance),
            ("skill_improve_chance", self.game.skill_improve_chance),
            ("fumble_chance", self.game.fumble_chance),
        ] {
            if !(0..=100).contains(&value) {
                return Err(anyhow!("game.{} must be between 0 and 100, got {}", name, value));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                bind: "127.0.0.1:4000".to_string(),
                max_sessions: default_max_sessions(),
                welcome: "Welcome to the realm. What is your name?".to_string(),
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                seed_file: None,
            },
            game: GameConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("mudcore.log".to_string()),
            },
        }
    }
}
