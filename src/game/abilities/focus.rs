//! Focus: hold for extra acceleration and less drag

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::charge::ChargeConfig;
use super::{
    sustain, Ability, AbilityConfig, AbilityContext, AbilityEffect, AbilityError, AbilityKind, AbilityMeta,
    AbilityParams, AbilityState, ActivationResult, ActiveWindow,
};
use crate::game::actor::{Car, PropertyOverride, StatusTimer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusParams {
    pub acceleration_multiplier: f32,
    pub friction_air: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Focus {
    pub meta: AbilityMeta,
    pub params: FocusParams,
}

impl Focus {
    pub fn build(config: &AbilityConfig) -> Result<Ability, AbilityError> {
        match &config.params {
            AbilityParams::Focus(params) => Ok(Ability::Focus(Self {
                meta: AbilityMeta::charged(config)?,
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
            id: AbilityKind::Focus,
            name: "Focus".to_string(),
            cooldown_ms: 0,
            duration_ms: 8000,
            charge: Some(ChargeConfig {
                max_charge: 100.0,
                base_regen_rate: 10.0,
                min_charge_to_use: 15.0,
                max_charge_to_use: 100.0,
                charge_time_ms: 0,
                drain_rate: 25.0,
            }),
            params: AbilityParams::Focus(FocusParams {
                acceleration_multiplier: 1.5,
                friction_air: 0.01,
            }),
        }
    }

    pub fn activate(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>) -> ActivationResult {
        let kind = self.meta.kind;
        if let Err(reason) = self.meta.gate(state, car, ctx.now) {
            return ActivationResult::failure(kind, reason, car.position, ctx.now);
        }

        let until = ctx.now + self.meta.duration_ms;
        let boosted = car.base_props.acceleration * self.params.acceleration_multiplier;
        car.push_override(kind, PropertyOverride::Acceleration(boosted), ctx.physics);
        car.push_override(kind, PropertyOverride::FrictionAir(self.params.friction_air), ctx.physics);
        car.status.focused = Some(StatusTimer {
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
        }
    }

    pub fn deactivate(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>) {
        if state.active.take().is_none() {
            return;
        }
        car.clear_overrides(self.meta.kind, ctx.physics);
        car.status.focused = None;
        debug!(actor_id = %car.id, "Focus ended");
    }
}
