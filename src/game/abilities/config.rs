//! Ability configuration table

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::anchor::{Anchor, AnchorParams};
use super::cannon::{Cannon, CannonParams};
use super::charge::ChargeConfig;
use super::charged_shot::{ChargedShot, ChargedShotParams};
use super::focus::{Focus, FocusParams};
use super::ghost::{Ghost, GhostParams};
use super::portal::{PortalGun, PortalParams};
use super::trap::{TrapLayer, TrapParams};
use super::AbilityKind;
use crate::config::ConfigError;

/// One row of the ability table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityConfig {
    pub id: AbilityKind,
    pub name: String,
    pub cooldown_ms: u64,
    pub duration_ms: u64,
    #[serde(default)]
    pub charge: Option<ChargeConfig>,
    pub params: AbilityParams,
}

impl AbilityConfig {
    pub fn uses_charge_system(&self) -> bool {
        self.charge.is_some()
    }
}

/// Kind-specific tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbilityParams {
    Cannon(CannonParams),
    Trap(TrapParams),
    Portal(PortalParams),
    Ghost(GhostParams),
    Anchor(AnchorParams),
    Focus(FocusParams),
    ChargedShot(ChargedShotParams),
}

impl AbilityParams {
    pub fn kind(&self) -> AbilityKind {
        match self {
            AbilityParams::Cannon(_) => AbilityKind::Cannon,
            AbilityParams::Trap(_) => AbilityKind::Trap,
            AbilityParams::Portal(_) => AbilityKind::Portal,
            AbilityParams::Ghost(_) => AbilityKind::Ghost,
            AbilityParams::Anchor(_) => AbilityKind::Anchor,
            AbilityParams::Focus(_) => AbilityKind::Focus,
            AbilityParams::ChargedShot(_) => AbilityKind::ChargedShot,
        }
    }
}

/// Built-in table, one entry per kind
pub fn default_ability_configs() -> Vec<AbilityConfig> {
    vec![
        Cannon::default_config(),
        TrapLayer::default_config(),
        PortalGun::default_config(),
        Ghost::default_config(),
        Anchor::default_config(),
        Focus::default_config(),
        ChargedShot::default_config(),
    ]
}

/// Load a JSON array of ability configs
pub fn load_ability_configs(path: &Path) -> Result<Vec<AbilityConfig>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::AbilityFile {
        path: path.to_path_buf(),
        source,
    })?;
    let configs: Vec<AbilityConfig> = serde_json::from_str(&raw)?;
    info!(path = %path.display(), count = configs.len(), "Loaded ability configs");
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_kind_once() {
        let configs = default_ability_configs();
        let mut kinds: Vec<_> = configs.iter().map(|c| c.id).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), AbilityKind::ALL.len());
        for config in &configs {
            assert_eq!(config.id, config.params.kind());
        }
    }

    #[test]
    fn charge_kinds_are_exactly_the_charge_gated_ones() {
        for config in default_ability_configs() {
            let expected = matches!(
                config.id,
                AbilityKind::Anchor | AbilityKind::Focus | AbilityKind::ChargedShot
            );
            assert_eq!(config.uses_charge_system(), expected, "{}", config.id);
        }
    }

    #[test]
    fn table_round_trips_through_json() {
        let configs = default_ability_configs();
        let json = serde_json::to_string(&configs).unwrap();
        let parsed: Vec<AbilityConfig> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, configs);
    }

    #[test]
    fn parses_hand_written_entry() {
        let json = r#"{
            "id": "trap",
            "name": "Caltrops",
            "cooldown_ms": 1000,
            "duration_ms": 5000,
            "params": {
                "kind": "trap",
                "damage": 2.0,
                "radius": 10.0,
                "spawn_offset": 5.0,
                "max_active": 1,
                "hit_cooldown_ms": 500
            }
        }"#;
        let config: AbilityConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.id, AbilityKind::Trap);
        assert!(config.charge.is_none());
        assert_eq!(config.params.kind(), AbilityKind::Trap);
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let err = load_ability_configs(Path::new("/nonexistent/abilities.json")).unwrap_err();
        assert!(matches!(err, ConfigError::AbilityFile { .. }));
    }
}
