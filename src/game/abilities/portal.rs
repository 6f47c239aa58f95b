//! Portal gun: fires a shot that opens a linked portal where it lands

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    Ability, AbilityConfig, AbilityContext, AbilityEffect, AbilityError, AbilityKind, AbilityMeta,
    AbilityParams, AbilityState, ActivationResult, FailureReason,
};
use crate::game::actor::Car;
use crate::game::objects::{ObjectKind, ObjectPayload, PortalSpec, SpawnRequest};
use crate::game::physics::Vec2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalParams {
    pub shot_speed: f32,
    pub shot_radius: f32,
    pub shot_lifetime_ms: u64,
    pub spawn_offset: f32,
    /// Shots in flight per owner
    pub max_shots: usize,
    pub portal_radius: f32,
    pub teleport_cooldown_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortalGun {
    pub meta: AbilityMeta,
    pub params: PortalParams,
}

impl PortalGun {
    pub fn build(config: &AbilityConfig) -> Result<Ability, AbilityError> {
        match &config.params {
            AbilityParams::Portal(params) => Ok(Ability::Portal(Self {
                meta: AbilityMeta::from_config(config),
                params: params.clone(),
            })),
            other => Err(AbilityError::KindMismatch {
                kind: config.id,
                params: other.kind(),
            }),
        }
    }

    /// `duration_ms` is the lifetime of the portal, not the shot
    pub fn default_config() -> AbilityConfig {
        AbilityConfig {
            id: AbilityKind::Portal,
            name: "Portal Gun".to_string(),
            cooldown_ms: 1000,
            duration_ms: 30_000,
            charge: None,
            params: AbilityParams::Portal(PortalParams {
                shot_speed: 600.0,
                shot_radius: 8.0,
                shot_lifetime_ms: 1500,
                spawn_offset: 10.0,
                max_shots: 2,
                portal_radius: 28.0,
                teleport_cooldown_ms: 500,
            }),
        }
    }

    pub fn activate(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>) -> ActivationResult {
        let kind = self.meta.kind;
        if let Err(reason) = self.meta.gate(state, car, ctx.now) {
            return ActivationResult::failure(kind, reason, car.position, ctx.now);
        }

        let p = &self.params;
        let position = car.muzzle(car.stats.radius + p.shot_radius + p.spawn_offset);
        let velocity = Vec2::from_angle(car.rotation) * p.shot_speed;

        let request = SpawnRequest {
            kind: ObjectKind::PortalShot,
            owner_id: car.id,
            position,
            velocity,
            radius: p.shot_radius,
            lifetime_ms: p.shot_lifetime_ms,
            max_per_owner: Some(p.max_shots),
            payload: ObjectPayload::PortalShot {
                portal: PortalSpec {
                    radius: p.portal_radius,
                    lifetime_ms: self.meta.duration_ms,
                    teleport_cooldown_ms: p.teleport_cooldown_ms,
                },
            },
        };

        match ctx.objects.spawn(ctx.physics, request, ctx.now) {
            Ok(shot) => {
                state.last_used = Some(ctx.now);
                car.abilities_used += 1;
                ActivationResult::success(
                    kind,
                    position,
                    ctx.now,
                    AbilityEffect::Projectile {
                        object_id: shot.id,
                        velocity,
                        expires_at: shot.expires_at,
                    },
                )
            }
            Err(e) => {
                warn!(actor_id = %car.id, error = %e, "Portal shot spawn failed");
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
    fn shot_carries_the_portal_spec() {
        let mut physics = SimplePhysics::new();
        let mut objects = AbilityObjectPool::new();
        let mut car = spawn_car(&mut physics, Vec2::ZERO);
        let mut gun = equip(AbilityKind::Portal);

        let mut ctx = AbilityContext {
            now: 5,
            physics: &mut physics,
            objects: &mut objects,
        };
        let result = gun.activate(&mut car, &mut ctx);
        assert!(result.success);

        let shots = objects.find_by_owner_and_kind(car.id, ObjectKind::PortalShot);
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].expires_at, 5 + 1500);
        match &shots[0].payload {
            ObjectPayload::PortalShot { portal } => {
                assert_eq!(portal.lifetime_ms, 30_000);
                assert_eq!(portal.teleport_cooldown_ms, 500);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
