//! Ghost: brief phase-out, only walls still collide

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Ability, AbilityConfig, AbilityContext, AbilityEffect, AbilityError, AbilityKind, AbilityMeta,
    AbilityParams, AbilityState, ActivationResult, ActiveWindow,
};
use crate::game::actor::{Car, PropertyOverride, StatusTimer};
use crate::game::physics::CollisionFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostParams {
    /// Filter applied to the car while ghosted
    pub filter: CollisionFilter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ghost {
    pub meta: AbilityMeta,
    pub params: GhostParams,
}

impl Ghost {
    pub fn build(config: &AbilityConfig) -> Result<Ability, AbilityError> {
        match &config.params {
            AbilityParams::Ghost(params) => Ok(Ability::Ghost(Self {
                meta: AbilityMeta::from_config(config),
                params: params.clone(),
            })),
            other => Err(AbilityError::KindMismatch {
                kind: config.id,
                params: other.kind(),
            }),
        }
    }

    pub fn default_config() -> AbilityConfig {
        AbilityConfig {
            id: AbilityKind::Ghost,
            name: "Ghost".to_string(),
            cooldown_ms: 12_000,
            duration_ms: 3000,
            charge: None,
            params: AbilityParams::Ghost(GhostParams {
                filter: CollisionFilter::ghost(),
            }),
        }
    }

    pub fn activate(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>) -> ActivationResult {
        let kind = self.meta.kind;
        if let Err(reason) = self.meta.gate(state, car, ctx.now) {
            return ActivationResult::failure(kind, reason, car.position, ctx.now);
        }

        let until = ctx.now + self.meta.duration_ms;
        car.push_override(kind, PropertyOverride::Filter(self.params.filter), ctx.physics);
        car.status.ghost = Some(StatusTimer {
            since: ctx.now,
            until: Some(until),
        });
        state.active = Some(ActiveWindow {
            since: ctx.now,
            until: Some(until),
        });
        state.last_used = Some(ctx.now);
        car.abilities_used += 1;

        ActivationResult::success(kind, car.position, ctx.now, AbilityEffect::Status { until: Some(until) })
    }

    pub fn update(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>) {
        if state.active.map_or(false, |w| w.expired(ctx.now)) {
            self.deactivate(state, car, ctx);
        }
    }

    pub fn deactivate(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>) {
        if state.active.take().is_none() {
            return;
        }
        car.clear_overrides(self.meta.kind, ctx.physics);
        car.status.ghost = None;
        debug!(actor_id = %car.id, "Ghost ended");
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{equip, spawn_car};
    use super::super::FailureReason;
    use super::*;
    use crate::game::objects::AbilityObjectPool;
    use crate::game::physics::{PhysicsPort, SimplePhysics, Vec2};

    #[test]
    fn ghost_swaps_filter_and_restores_on_expiry() {
        let mut physics = SimplePhysics::new();
        let mut objects = AbilityObjectPool::new();
        let mut car = spawn_car(&mut physics, Vec2::ZERO);
        let base_filter = car.base_props.filter;
        let mut ghost = equip(AbilityKind::Ghost);

        let mut ctx = AbilityContext {
            now: 1000,
            physics: &mut physics,
            objects: &mut objects,
        };
        assert!(ghost.activate(&mut car, &mut ctx).success);
        assert!(car.status.is_ghost());
        assert_eq!(ctx.physics.collision_filter(car.body), Some(CollisionFilter::ghost()));

        let again = ghost.activate(&mut car, &mut ctx);
        assert_eq!(again.reason, Some(FailureReason::AlreadyActive));

        ctx.now = 3999;
        ghost.update(&mut car, &mut ctx, 0.016);
        assert!(car.status.is_ghost());

        ctx.now = 4000;
        ghost.update(&mut car, &mut ctx, 0.016);
        assert!(!car.status.is_ghost());
        assert_eq!(ctx.physics.collision_filter(car.body), Some(base_filter));
        assert!(car.effects.is_empty());
    }
}
