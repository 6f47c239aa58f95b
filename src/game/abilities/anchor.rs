//! Anchor: hold to pin the car in place, draining charge

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::charge::ChargeConfig;
use super::{
    sustain, Ability, AbilityConfig, AbilityContext, AbilityEffect, AbilityError, AbilityKind, AbilityMeta,
    AbilityParams, AbilityState, ActivationResult, ActiveWindow,
};
use crate::game::actor::{Car, PropertyOverride, StatusTimer};
use crate::game::physics::Vec2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorParams {
    pub friction: f32,
    pub friction_air: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub meta: AbilityMeta,
    pub params: AnchorParams,
}

impl Anchor {
    pub fn build(config: &AbilityConfig) -> Result<Ability, AbilityError> {
        match &config.params {
            AbilityParams::Anchor(params) => Ok(Ability::Anchor(Self {
                meta: AbilityMeta::charged(config)?,
                params: params.clone(),
            })),
            other => Err(AbilityError::KindMismatch {
                kind: config.id,
                params: other.kind(),
            }),
        }
    }

    /// `duration_ms` caps a single hold
    pub fn default_config() -> AbilityConfig {
        AbilityConfig {
            id: AbilityKind::Anchor,
            name: "Anchor".to_string(),
            cooldown_ms: 0,
            duration_ms: 6000,
            charge: Some(ChargeConfig {
                max_charge: 100.0,
                base_regen_rate: 12.0,
                min_charge_to_use: 20.0,
                max_charge_to_use: 100.0,
                charge_time_ms: 0,
                drain_rate: 35.0,
            }),
            params: AbilityParams::Anchor(AnchorParams {
                friction: 1.0,
                friction_air: 0.6,
            }),
        }
    }

    pub fn activate(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>) -> ActivationResult {
        let kind = self.meta.kind;
        if let Err(reason) = self.meta.gate(state, car, ctx.now) {
            return ActivationResult::failure(kind, reason, car.position, ctx.now);
        }

        let until = ctx.now + self.meta.duration_ms;
        ctx.physics.set_velocity(car.body, Vec2::ZERO);
        car.velocity = Vec2::ZERO;
        car.push_override(kind, PropertyOverride::Friction(self.params.friction), ctx.physics);
        car.push_override(kind, PropertyOverride::FrictionAir(self.params.friction_air), ctx.physics);
        car.status.anchored = Some(StatusTimer {
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

    pub fn update(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>, dt: f32) {
        if sustain(&self.meta, state, car, ctx.now, dt) {
            self.deactivate(state, car, ctx);
        } else if state.active.is_some() {
            // Collisions may have nudged the body since the last step
            ctx.physics.set_velocity(car.body, Vec2::ZERO);
        }
    }

    pub fn deactivate(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>) {
        if state.active.take().is_none() {
            return;
        }
        car.clear_overrides(self.meta.kind, ctx.physics);
        car.status.anchored = None;
        debug!(actor_id = %car.id, charge = ?state.charge.map(|c| c.current), "Anchor released");
    }
}
