//! Ability registry: kind -> constructor + config

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::anchor::Anchor;
use super::cannon::Cannon;
use super::charged_shot::ChargedShot;
use super::config::default_ability_configs;
use super::focus::Focus;
use super::ghost::Ghost;
use super::portal::PortalGun;
use super::trap::TrapLayer;
use super::{Ability, AbilityConfig, AbilityError, AbilityKind, AbilityMetadata};

type Constructor = fn(&AbilityConfig) -> Result<Ability, AbilityError>;

fn constructor_for(kind: AbilityKind) -> Constructor {
    match kind {
        AbilityKind::Cannon => Cannon::build,
        AbilityKind::Trap => TrapLayer::build,
        AbilityKind::Portal => PortalGun::build,
        AbilityKind::Ghost => Ghost::build,
        AbilityKind::Anchor => Anchor::build,
        AbilityKind::Focus => Focus::build,
        AbilityKind::ChargedShot => ChargedShot::build,
    }
}

/// Registered ability templates, shared read-only by every room
#[derive(Debug, Clone, Default)]
pub struct AbilityRegistry {
    abilities: BTreeMap<AbilityKind, Ability>,
}

impl AbilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in table
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for config in default_ability_configs() {
            // Built-in configs always match their kind
            if let Err(e) = registry.register(config) {
                warn!(error = %e, "Skipping built-in ability");
            }
        }
        registry
    }

    /// Validate and register a config, replacing any previous entry for its kind
    pub fn register(&mut self, config: AbilityConfig) -> Result<(), AbilityError> {
        let ability = constructor_for(config.id)(&config)?;
        debug!(ability = %config.id, name = %config.name, "Registered ability");
        self.abilities.insert(config.id, ability);
        Ok(())
    }

    /// Fresh template for `kind`
    pub fn create(&self, kind: AbilityKind) -> Result<Ability, AbilityError> {
        self.abilities.get(&kind).cloned().ok_or_else(|| {
            warn!(ability = %kind, "Ability not registered");
            AbilityError::NotFound(kind.to_string())
        })
    }

    /// Look up by wire id
    pub fn create_by_name(&self, id: &str) -> Result<Ability, AbilityError> {
        let kind: AbilityKind = id.parse().map_err(|e| {
            warn!(ability = %id, "Unknown ability id");
            e
        })?;
        self.create(kind)
    }

    pub fn has(&self, kind: AbilityKind) -> bool {
        self.abilities.contains_key(&kind)
    }

    pub fn list_metadata(&self) -> Vec<AbilityMetadata> {
        self.abilities.values().map(Ability::metadata).collect()
    }

    pub fn len(&self) -> usize {
        self.abilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abilities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::abilities::cannon::CannonParams;
    use crate::game::abilities::AbilityParams;

    #[test]
    fn defaults_register_every_kind() {
        let registry = AbilityRegistry::with_defaults();
        assert_eq!(registry.len(), AbilityKind::ALL.len());
        for kind in AbilityKind::ALL {
            assert!(registry.has(kind));
            assert_eq!(registry.create(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn unknown_names_are_not_found() {
        let registry = AbilityRegistry::with_defaults();
        assert!(matches!(
            registry.create_by_name("laser"),
            Err(AbilityError::NotFound(_))
        ));
        assert!(registry.create_by_name("ghost").is_ok());
        assert!(matches!(
            AbilityRegistry::new().create(AbilityKind::Ghost),
            Err(AbilityError::NotFound(_))
        ));
    }

    #[test]
    fn mismatched_params_are_rejected() {
        let mut registry = AbilityRegistry::new();
        let mut config = TrapLayer::default_config();
        config.params = AbilityParams::Cannon(CannonParams {
            damage: 1.0,
            projectile_speed: 1.0,
            projectile_radius: 1.0,
            spawn_offset: 0.0,
            max_active: 1,
            hit_cooldown_ms: 0,
        });
        assert!(matches!(
            registry.register(config),
            Err(AbilityError::KindMismatch {
                kind: AbilityKind::Trap,
                params: AbilityKind::Cannon
            })
        ));
        assert!(!registry.has(AbilityKind::Trap));
    }

    #[test]
    fn charge_kinds_require_charge_config() {
        let mut registry = AbilityRegistry::new();
        let mut config = Focus::default_config();
        config.charge = None;
        assert!(matches!(
            registry.register(config),
            Err(AbilityError::MissingCharge(AbilityKind::Focus))
        ));
    }

    #[test]
    fn metadata_reports_charge_and_trigger() {
        let registry = AbilityRegistry::with_defaults();
        let meta = registry.list_metadata();
        let anchor = meta.iter().find(|m| m.id == AbilityKind::Anchor).unwrap();
        assert!(anchor.uses_charge_system);
        assert_eq!(anchor.max_charge, Some(100.0));
        let cannon = meta.iter().find(|m| m.id == AbilityKind::Cannon).unwrap();
        assert!(!cannon.uses_charge_system);
        assert_eq!(cannon.cooldown_ms, 1500);
    }
}
