//! Trap: drops a damaging sensor behind the car

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    Ability, AbilityConfig, AbilityContext, AbilityEffect, AbilityError, AbilityKind, AbilityMeta,
    AbilityParams, AbilityState, ActivationResult, FailureReason,
};
use crate::game::actor::Car;
use crate::game::objects::{ObjectKind, ObjectPayload, SpawnRequest};
use crate::game::physics::Vec2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapParams {
    pub damage: f32,
    pub radius: f32,
    /// Distance behind the hull
    pub spawn_offset: f32,
    pub max_active: usize,
    pub hit_cooldown_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrapLayer {
    pub meta: AbilityMeta,
    pub params: TrapParams,
}

impl TrapLayer {
    pub fn build(config: &AbilityConfig) -> Result<Ability, AbilityError> {
        match &config.params {
            AbilityParams::Trap(params) => Ok(Ability::Trap(Self {
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
            id: AbilityKind::Trap,
            name: "Spike Trap".to_string(),
            cooldown_ms: 2000,
            duration_ms: 30_000,
            charge: None,
            params: AbilityParams::Trap(TrapParams {
                damage: 1.0,
                radius: 14.0,
                spawn_offset: 20.0,
                max_active: 3,
                hit_cooldown_ms: 1000,
            }),
        }
    }

    pub fn activate(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>) -> ActivationResult {
        let kind = self.meta.kind;
        if let Err(reason) = self.meta.gate(state, car, ctx.now) {
            return ActivationResult::failure(kind, reason, car.position, ctx.now);
        }

        let p = &self.params;
        let position = car.muzzle(-(car.stats.radius + p.radius + p.spawn_offset));

        let request = SpawnRequest {
            kind: ObjectKind::Trap,
            owner_id: car.id,
            position,
            velocity: Vec2::ZERO,
            radius: p.radius,
            lifetime_ms: self.meta.duration_ms,
            max_per_owner: Some(p.max_active),
            payload: ObjectPayload::Damage {
                damage: p.damage,
                hit_cooldown_ms: p.hit_cooldown_ms,
            },
        };

        match ctx.objects.spawn(ctx.physics, request, ctx.now) {
            Ok(trap) => {
                state.last_used = Some(ctx.now);
                car.abilities_used += 1;
                ActivationResult::success(
                    kind,
                    position,
                    ctx.now,
                    AbilityEffect::Trap {
                        object_id: trap.id,
                        expires_at: trap.expires_at,
                    },
                )
            }
            Err(e) => {
                warn!(actor_id = %car.id, error = %e, "Trap spawn failed");
                ActivationResult::failure(kind, FailureReason::SpawnFailed, car.position, ctx.now)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{equip, spawn_car};
    use super::*;
    use crate::game::objects::AbilityObjectPool;
    use crate::game::physics::SimplePhysics;

    #[test]
    fn fourth_trap_evicts_the_oldest() {
        let mut physics = SimplePhysics::new();
        let mut objects = AbilityObjectPool::new();
        let mut car = spawn_car(&mut physics, Vec2::ZERO);
        let mut trap = equip(AbilityKind::Trap);
        let cooldown = trap.ability.meta().cooldown_ms;

        let mut ids = Vec::new();
        for i in 0..4u64 {
            let mut ctx = AbilityContext {
                now: i * cooldown,
                physics: &mut physics,
                objects: &mut objects,
            };
            let result = trap.activate(&mut car, &mut ctx);
            assert!(result.success, "trap {} failed: {:?}", i, result.reason);
            match result.effect {
                Some(AbilityEffect::Trap { object_id, .. }) => ids.push(object_id),
                other => panic!("unexpected effect {:?}", other),
            }
        }

        let live: Vec<_> = objects
            .find_by_owner_and_kind(car.id, ObjectKind::Trap)
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(live, ids[1..].to_vec());
        // Car body plus three trap bodies
        assert_eq!(physics.body_count(), 4);
    }

    #[test]
    fn trap_lands_behind_the_car() {
        let mut physics = SimplePhysics::new();
        let mut objects = AbilityObjectPool::new();
        let mut car = spawn_car(&mut physics, Vec2::ZERO);
        car.rotation = 0.0;
        let mut trap = equip(AbilityKind::Trap);
        let mut ctx = AbilityContext {
            now: 0,
            physics: &mut physics,
            objects: &mut objects,
        };
        let result = trap.activate(&mut car, &mut ctx);
        assert!(result.position.x < -car.stats.radius);
    }
}
