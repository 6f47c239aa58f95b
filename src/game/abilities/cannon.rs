//! Cannon: cooldown-gated multi-hit projectile

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
pub struct CannonParams {
    pub damage: f32,
    pub projectile_speed: f32,
    pub projectile_radius: f32,
    /// Gap between the hull and the spawned ball
    pub spawn_offset: f32,
    pub max_active: usize,
    /// Minimum time between hits on the same target by the same ball
    pub hit_cooldown_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cannon {
    pub meta: AbilityMeta,
    pub params: CannonParams,
}

impl Cannon {
    pub fn build(config: &AbilityConfig) -> Result<Ability, AbilityError> {
        match &config.params {
            AbilityParams::Cannon(params) => Ok(Ability::Cannon(Self {
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
            id: AbilityKind::Cannon,
            name: "Cannon".to_string(),
            cooldown_ms: 1500,
            duration_ms: 3000,
            charge: None,
            params: AbilityParams::Cannon(CannonParams {
                damage: 1.0,
                projectile_speed: 700.0,
                projectile_radius: 6.0,
                spawn_offset: 10.0,
                max_active: 5,
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
        let position = car.muzzle(car.stats.radius + p.projectile_radius + p.spawn_offset);
        let velocity = Vec2::from_angle(car.rotation) * p.projectile_speed + car.velocity;

        let request = SpawnRequest {
            kind: ObjectKind::Cannonball,
            owner_id: car.id,
            position,
            velocity,
            radius: p.projectile_radius,
            lifetime_ms: self.meta.duration_ms,
            max_per_owner: Some(p.max_active),
            payload: ObjectPayload::Damage {
                damage: p.damage,
                hit_cooldown_ms: p.hit_cooldown_ms,
            },
        };

        match ctx.objects.spawn(ctx.physics, request, ctx.now) {
            Ok(ball) => {
                state.last_used = Some(ctx.now);
                car.abilities_used += 1;
                ActivationResult::success(
                    kind,
                    position,
                    ctx.now,
                    AbilityEffect::Projectile {
                        object_id: ball.id,
                        velocity,
                        expires_at: ball.expires_at,
                    },
                )
            }
            Err(e) => {
                warn!(actor_id = %car.id, error = %e, "Cannonball spawn failed");
                ActivationResult::failure(kind, FailureReason::SpawnFailed, car.position, ctx.now)
            }
        }
    }
}
