//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub border: BorderConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub food: FoodConfig,
    #[serde(default)]
    pub virus: VirusConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            Self::load_from(path)
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// Server networking and scheduling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Maximum concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Capacity of each session's outbound buffer.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
    /// Capacity of the register/unregister/broadcast queues.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long the loop waits to hand INIT to a new session.
    #[serde(default = "default_init_timeout")]
    pub init_timeout_ms: u64,
    /// Keep-alive ping period in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Display names are truncated to this many characters.
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
}

impl ServerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            tick_interval_ms: default_tick_interval(),
            max_connections: default_max_connections(),
            outbound_capacity: default_outbound_capacity(),
            queue_capacity: default_queue_capacity(),
            init_timeout_ms: default_init_timeout(),
            ping_interval_secs: default_ping_interval(),
            max_name_length: default_max_name_length(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_tick_interval() -> u64 {
    50
}
fn default_max_connections() -> usize {
    100
}
fn default_outbound_capacity() -> usize {
    256
}
fn default_queue_capacity() -> usize {
    1000
}
fn default_init_timeout() -> u64 {
    1000
}
fn default_ping_interval() -> u64 {
    10
}
fn default_max_name_length() -> usize {
    20
}

/// World border configuration. The world is a square `[0, size]` on both axes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BorderConfig {
    #[serde(default = "default_border_size")]
    pub size: f64,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self {
            size: default_border_size(),
        }
    }
}

fn default_border_size() -> f64 {
    10000.0
}

/// Player configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_start_mass")]
    pub start_mass: f64,
    #[serde(default = "default_player_min_mass")]
    pub min_mass: f64,
    #[serde(default = "default_player_max_mass")]
    pub max_mass: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            start_mass: default_player_start_mass(),
            min_mass: default_player_min_mass(),
            max_mass: default_player_max_mass(),
        }
    }
}

fn default_player_start_mass() -> f64 {
    10.0
}
fn default_player_min_mass() -> f64 {
    5.0
}
fn default_player_max_mass() -> f64 {
    10000.0
}

/// Food configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FoodConfig {
    /// Food spawned when the world is created.
    #[serde(default = "default_food_initial_amount")]
    pub initial_amount: usize,
    /// Low-water mark that triggers replenishment.
    #[serde(default = "default_food_min_amount")]
    pub min_amount: usize,
    /// Batch size spawned per tick while below the mark.
    #[serde(default = "default_food_spawn_amount")]
    pub spawn_amount: usize,
    #[serde(default = "default_food_mass")]
    pub mass: f64,
}

impl Default for FoodConfig {
    fn default() -> Self {
        Self {
            initial_amount: default_food_initial_amount(),
            min_amount: default_food_min_amount(),
            spawn_amount: default_food_spawn_amount(),
            mass: default_food_mass(),
        }
    }
}

fn default_food_initial_amount() -> usize {
    200
}
fn default_food_min_amount() -> usize {
    100
}
fn default_food_spawn_amount() -> usize {
    10
}
fn default_food_mass() -> f64 {
    5.0
}

/// Virus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VirusConfig {
    /// Target virus count.
    #[serde(default = "default_virus_amount")]
    pub amount: usize,
    #[serde(default = "default_virus_mass")]
    pub mass: f64,
}

impl Default for VirusConfig {
    fn default() -> Self {
        Self {
            amount: default_virus_amount(),
            mass: default_virus_mass(),
        }
    }
}

fn default_virus_amount() -> usize {
    10
}
fn default_virus_mass() -> f64 {
    20.0
}
