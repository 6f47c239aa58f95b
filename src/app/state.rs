//! Application state shared by every room

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::config::{Config, ConfigError};
use crate::game::abilities::config::load_ability_configs;
use crate::game::abilities::{AbilityError, AbilityRegistry};
use crate::game::physics::SimplePhysics;
use crate::game::{ArenaLayout, GameRoom, RoomHandle, RoomRegistry, RoomSettings};

/// Startup errors
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid ability config: {0}")]
    Ability(#[from] AbilityError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub abilities: Arc<AbilityRegistry>,
    pub rooms: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, StateError> {
        let mut abilities = AbilityRegistry::with_defaults();
        if let Some(path) = &config.ability_config_path {
            for ability in load_ability_configs(path)? {
                abilities.register(ability)?;
            }
        }

        Ok(Self {
            config: Arc::new(config),
            abilities: Arc::new(abilities),
            rooms: Arc::new(RoomRegistry::new()),
        })
    }

    /// Start a room task and register it until it stops
    pub fn open_room(&self) -> RoomHandle {
        let id = Uuid::new_v4();
        let settings = RoomSettings::from_config(&self.config);
        let (room, handle) = GameRoom::new(
            id,
            &settings,
            self.abilities.clone(),
            Box::new(SimplePhysics::new()),
            ArenaLayout::default(),
        );
        self.rooms.insert(handle.clone());
        info!(room_id = %id, seed = settings.seed, max_players = settings.max_players, "Room opened");

        let rooms = self.rooms.clone();
        tokio::spawn(async move {
            room.run().await;
            rooms.remove(&id);
        });

        handle
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::game::abilities::{AbilityKind, AbilityParams};
    use crate::game::abilities::config::default_ability_configs;

    #[test]
    fn defaults_without_a_config_file() {
        let state = AppState::new(Config::default()).unwrap();
        assert_eq!(state.abilities.len(), AbilityKind::ALL.len());
        assert_eq!(state.rooms.active_rooms(), 0);
    }

    #[test]
    fn config_file_overrides_builtin_entries() {
        let mut configs = default_ability_configs();
        for config in configs.iter_mut() {
            if let AbilityParams::Cannon(params) = &mut config.params {
                params.damage = 4.0;
                config.cooldown_ms = 900;
            }
        }
        let path = std::env::temp_dir().join(format!("abilities-{}.json", Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(serde_json::to_string(&configs).unwrap().as_bytes())
            .unwrap();

        let config = Config {
            ability_config_path: Some(path.clone()),
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();
        let cannon = state
            .abilities
            .list_metadata()
            .into_iter()
            .find(|m| m.id == AbilityKind::Cannon)
            .unwrap();
        assert_eq!(cannon.cooldown_ms, 900);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_config_file_fails_startup() {
        let config = Config {
            ability_config_path: Some("/nonexistent/abilities.json".into()),
            ..Config::default()
        };
        assert!(matches!(
            AppState::new(config),
            Err(StateError::Config(ConfigError::AbilityFile { .. }))
        ));
    }

    #[tokio::test]
    async fn opened_rooms_are_registered() {
        let state = AppState::new(Config {
            room_seed: Some(3),
            ..Config::default()
        })
        .unwrap();
        let handle = state.open_room();
        assert!(state.rooms.get(&handle.id).is_some());
        assert_eq!(state.rooms.total_players(), 0);
    }
}
