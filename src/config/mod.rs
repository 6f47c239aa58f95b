//! Configuration module - environment variable parsing

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::util::time::{DEFAULT_SIMULATION_TPS, DEFAULT_SNAPSHOT_TPS, MAX_TPS};

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,

    /// Fixed simulation steps per second
    pub simulation_tps: u32,
    /// Snapshot broadcasts per second
    pub snapshot_tps: u32,
    /// Join cap per room
    pub max_players_per_room: usize,
    /// Spawn-point RNG seed (random when unset)
    pub room_seed: Option<u64>,

    /// Optional JSON file overriding the built-in ability table
    pub ability_config_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let simulation_tps = parse_var("SIMULATION_TPS", DEFAULT_SIMULATION_TPS)?;
        let snapshot_tps = parse_var("SNAPSHOT_TPS", DEFAULT_SNAPSHOT_TPS)?;
        check_rates(simulation_tps, snapshot_tps)?;

        let room_seed = match env::var("ROOM_SEED") {
            Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid("ROOM_SEED"))?),
            Err(_) => None,
        };

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            simulation_tps,
            snapshot_tps,
            max_players_per_room: parse_var("MAX_PLAYERS_PER_ROOM", 8)?,
            room_seed,
            ability_config_path: env::var("ABILITY_CONFIG").ok().map(PathBuf::from),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            simulation_tps: DEFAULT_SIMULATION_TPS,
            snapshot_tps: DEFAULT_SNAPSHOT_TPS,
            max_players_per_room: 8,
            room_seed: None,
            ability_config_path: None,
        }
    }
}

/// Both rates in `1..=MAX_TPS`, snapshots no faster than the simulation
fn check_rates(simulation_tps: u32, snapshot_tps: u32) -> Result<(), ConfigError> {
    if !(1..=MAX_TPS).contains(&simulation_tps) {
        return Err(ConfigError::Invalid("SIMULATION_TPS"));
    }
    if !(1..=MAX_TPS).contains(&snapshot_tps) || snapshot_tps > simulation_tps {
        return Err(ConfigError::Invalid("SNAPSHOT_TPS"));
    }
    Ok(())
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Failed to read ability config {path}: {source}")]
    AbilityFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed ability config: {0}")]
    AbilityFormat(#[from] serde_json::Error),
}
