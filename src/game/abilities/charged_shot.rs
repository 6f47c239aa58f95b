//! Charged shot: hold to charge, release to fire an explosive projectile

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::charge::{calculate_charge_usage, charge_scale, ChargeConfig, ScaleCurve};
use super::{
    Ability, AbilityConfig, AbilityContext, AbilityEffect, AbilityError, AbilityKind, AbilityMeta,
    AbilityParams, AbilityState, ActivationResult, FailureReason,
};
use crate::game::actor::Car;
use crate::game::objects::{ObjectKind, ObjectPayload, SpawnRequest};
use crate::game::physics::Vec2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargedShotParams {
    pub projectile_speed: f32,
    pub projectile_radius: f32,
    pub spawn_offset: f32,
    pub max_active: usize,
    pub base_damage: f32,
    /// Explosion radius at scale curve 1.0
    pub base_radius: f32,
    /// Knockback impulse at the explosion centre
    pub base_force: f32,
    pub damage_curve: ScaleCurve,
    pub radius_curve: ScaleCurve,
    pub force_curve: ScaleCurve,
    /// Lifetime of the visual explosion marker
    pub explosion_visual_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargedShot {
    pub meta: AbilityMeta,
    pub params: ChargedShotParams,
}

/// Scaled payload of one shot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotScaling {
    pub charge_used: f32,
    pub scale: f32,
    pub damage: f32,
    pub radius: f32,
    pub force: f32,
}

impl ChargedShot {
    pub fn build(config: &AbilityConfig) -> Result<Ability, AbilityError> {
        match &config.params {
            AbilityParams::ChargedShot(params) => Ok(Ability::ChargedShot(Self {
                meta: AbilityMeta::charged(config)?,
                params: params.clone(),
            })),
            other => Err(AbilityError::KindMismatch {
                kind: config.id,
                params: other.kind(),
            }),
        }
    }

    /// `duration_ms` is the projectile lifetime
    pub fn default_config() -> AbilityConfig {
        AbilityConfig {
            id: AbilityKind::ChargedShot,
            name: "Charged Shot".to_string(),
            cooldown_ms: 800,
            duration_ms: 2000,
            charge: Some(ChargeConfig {
                max_charge: 100.0,
                base_regen_rate: 15.0,
                min_charge_to_use: 20.0,
                max_charge_to_use: 80.0,
                charge_time_ms: 1500,
                drain_rate: 0.0,
            }),
            params: AbilityParams::ChargedShot(ChargedShotParams {
                projectile_speed: 650.0,
                projectile_radius: 9.0,
                spawn_offset: 10.0,
                max_active: 3,
                base_damage: 2.0,
                base_radius: 80.0,
                base_force: 500.0,
                damage_curve: ScaleCurve::new(0.1, 0.3, 0.9),
                radius_curve: ScaleCurve::new(0.5, 0.3, 0.2),
                force_curve: ScaleCurve::new(0.2, 0.4, 0.6),
                explosion_visual_ms: 400,
            }),
        }
    }

    /// Charge and effect values for a hold of `hold_ms` with `available` charge
    pub fn scaling(&self, config: &ChargeConfig, hold_ms: u64, available: f32) -> ShotScaling {
        let p = &self.params;
        let charge_used = calculate_charge_usage(
            hold_ms,
            config.min_charge_to_use,
            config.max_charge_to_use,
            config.charge_time_ms,
        )
        .min(available);
        let scale = charge_scale(charge_used, config.max_charge_to_use);
        ShotScaling {
            charge_used,
            scale,
            damage: p.damage_curve.apply(p.base_damage, scale),
            radius: p.radius_curve.apply(p.base_radius, scale),
            force: p.force_curve.apply(p.base_force, scale),
        }
    }

    pub fn activate(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>) -> ActivationResult {
        let kind = self.meta.kind;
        if let Err(reason) = self.meta.gate(state, car, ctx.now) {
            return ActivationResult::failure(kind, reason, car.position, ctx.now);
        }
        let (Some(config), Some(charge)) = (self.meta.charge, state.charge) else {
            return ActivationResult::failure(kind, FailureReason::LowCharge, car.position, ctx.now);
        };

        let hold_ms = charge
            .charge_start_time
            .map_or(0, |start| ctx.now.saturating_sub(start));
        let shot = self.scaling(&config, hold_ms, charge.current);

        let p = &self.params;
        let position = car.muzzle(car.stats.radius + p.projectile_radius + p.spawn_offset);
        let velocity = Vec2::from_angle(car.rotation) * p.projectile_speed;

        let request = SpawnRequest {
            kind: ObjectKind::ChargedShot,
            owner_id: car.id,
            position,
            velocity,
            radius: p.projectile_radius,
            lifetime_ms: self.meta.duration_ms,
            max_per_owner: Some(p.max_active),
            payload: ObjectPayload::Explosive {
                damage: shot.damage,
                radius: shot.radius,
                force: shot.force,
                visual_ms: p.explosion_visual_ms,
            },
        };

        match ctx.objects.spawn(ctx.physics, request, ctx.now) {
            Ok(object) => {
                if let Some(charge) = state.charge.as_mut() {
                    charge.consume(shot.charge_used);
                }
                state.last_used = Some(ctx.now);
                car.abilities_used += 1;
                debug!(
                    actor_id = %car.id,
                    hold_ms,
                    charge_used = shot.charge_used,
                    scale = shot.scale,
                    "Charged shot fired"
                );
                ActivationResult::success(
                    kind,
                    position,
                    ctx.now,
                    AbilityEffect::ChargedShot {
                        object_id: object.id,
                        velocity,
                        expires_at: object.expires_at,
                        charge_scale: shot.scale,
                        damage: shot.damage,
                        radius: shot.radius,
                        force: shot.force,
                    },
                )
                .with_charge_used(shot.charge_used)
            }
            Err(e) => {
                warn!(actor_id = %car.id, error = %e, "Charged shot spawn failed");
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

    fn shot() -> ChargedShot {
        match equip(AbilityKind::ChargedShot).ability {
            Ability::ChargedShot(shot) => shot,
            other => panic!("unexpected ability {:?}", other),
        }
    }

    #[test]
    fn full_hold_scales_to_curve_sum() {
        let shot = shot();
        let config = shot.meta.charge.unwrap();
        let full = shot.scaling(&config, 1500, 100.0);
        assert_eq!(full.charge_used, 80.0);
        assert_eq!(full.scale, 1.0);
        assert!((full.damage - 2.6).abs() < 1e-5);
        assert!((full.radius - 80.0).abs() < 1e-4);

        let tap = shot.scaling(&config, 50, 100.0);
        assert_eq!(tap.charge_used, 20.0);
        assert_eq!(tap.scale, 0.25);
        assert!(full.damage > tap.damage * 4.0);
    }

    #[test]
    fn usage_is_capped_by_available_charge() {
        let shot = shot();
        let config = shot.meta.charge.unwrap();
        let partial = shot.scaling(&config, 1500, 30.0);
        assert_eq!(partial.charge_used, 30.0);
        assert_eq!(partial.scale, 30.0 / 80.0);
    }

    #[test]
    fn release_fires_and_consumes_charge() {
        let mut physics = SimplePhysics::new();
        let mut objects = AbilityObjectPool::new();
        let mut car = spawn_car(&mut physics, Vec2::ZERO);
        let mut equipped = equip(AbilityKind::ChargedShot);

        let mut ctx = AbilityContext {
            now: 1000,
            physics: &mut physics,
            objects: &mut objects,
        };
        assert!(equipped.press(&mut car, &mut ctx).is_none());
        assert!(equipped.state.charge.unwrap().is_charging);

        ctx.now = 1750;
        let result = equipped.release(&mut car, &mut ctx).unwrap();
        assert!(result.success);
        assert_eq!(result.charge_used, Some(50.0));
        let charge = equipped.state.charge.unwrap();
        assert_eq!(charge.current, 50.0);
        assert!(!charge.is_charging);
        assert_eq!(ctx.objects.find_by_owner_and_kind(car.id, ObjectKind::ChargedShot).len(), 1);

        // Cooldown gates the next release
        ctx.now = 1800;
        equipped.press(&mut car, &mut ctx);
        let again = equipped.release(&mut car, &mut ctx).unwrap();
        assert_eq!(again.reason, Some(FailureReason::Cooldown));
    }

    #[test]
    fn empty_charge_fails_without_touching_physics() {
        let mut physics = SimplePhysics::new();
        let mut objects = AbilityObjectPool::new();
        let mut car = spawn_car(&mut physics, Vec2::ZERO);
        let mut equipped = equip(AbilityKind::ChargedShot);
        equipped.state.charge.as_mut().unwrap().current = 0.0;
        let mutations = physics.mutation_count();

        let mut ctx = AbilityContext {
            now: 0,
            physics: &mut physics,
            objects: &mut objects,
        };
        equipped.press(&mut car, &mut ctx);
        ctx.now = 1500;
        let result = equipped.release(&mut car, &mut ctx).unwrap();
        assert!(!result.success);
        assert_eq!(result.reason, Some(FailureReason::LowCharge));
        assert!(objects.is_empty());
        assert_eq!(physics.mutation_count(), mutations);
        assert_eq!(equipped.state.charge.unwrap().current, 0.0);
    }
}
