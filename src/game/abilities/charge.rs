//! Charge model: hold duration -> consumed charge -> effect scale

use serde::{Deserialize, Serialize};

/// Holds shorter than this count as a tap
pub const TAP_THRESHOLD_MS: u64 = 200;

/// Charge consumed by an activation held for `hold_ms`.
///
/// Taps consume `min_use`; longer holds scale linearly up to `max_use` at
/// `charge_time_ms`.
pub fn calculate_charge_usage(hold_ms: u64, min_use: f32, max_use: f32, charge_time_ms: u64) -> f32 {
    if hold_ms < TAP_THRESHOLD_MS {
        return min_use;
    }
    if charge_time_ms == 0 {
        return max_use;
    }
    let progress = hold_ms.min(charge_time_ms) as f32 / charge_time_ms as f32;
    min_use + progress * (max_use - min_use)
}

/// Normalized share of the usable range consumed by one activation
pub fn charge_scale(charge_used: f32, max_use: f32) -> f32 {
    if max_use <= 0.0 {
        return 0.0;
    }
    (charge_used / max_use).clamp(0.0, 1.0)
}

/// Quadratic scaling curve `base * (c0 + c1*s + c2*s^2)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleCurve {
    pub c0: f32,
    pub c1: f32,
    pub c2: f32,
}

impl ScaleCurve {
    pub const fn new(c0: f32, c1: f32, c2: f32) -> Self {
        Self { c0, c1, c2 }
    }

    pub fn apply(&self, base: f32, scale: f32) -> f32 {
        base * (self.c0 + self.c1 * scale + self.c2 * scale * scale)
    }
}

/// Charge tunables for a charge-gated ability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChargeConfig {
    pub max_charge: f32,
    /// Charge regained per second while idle
    pub base_regen_rate: f32,
    pub min_charge_to_use: f32,
    pub max_charge_to_use: f32,
    pub charge_time_ms: u64,
    /// Charge drained per second while a sustained effect is active
    #[serde(default)]
    pub drain_rate: f32,
}

/// Per-actor charge resource. `current` always stays within `[0, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChargeState {
    pub current: f32,
    pub max: f32,
    pub regen_rate: f32,
    pub is_charging: bool,
    pub charge_start_time: Option<u64>,
}

impl ChargeState {
    /// Starts full
    pub fn new(config: &ChargeConfig) -> Self {
        Self {
            current: config.max_charge,
            max: config.max_charge,
            regen_rate: config.base_regen_rate,
            is_charging: false,
            charge_start_time: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current <= 0.0
    }

    /// Regenerate for `dt` seconds unless charging
    pub fn regenerate(&mut self, dt: f32) {
        if self.is_charging {
            return;
        }
        self.set(self.current + self.regen_rate * dt);
    }

    /// Remove up to `amount`, returning what was actually taken
    pub fn consume(&mut self, amount: f32) -> f32 {
        let taken = amount.max(0.0).min(self.current);
        self.set(self.current - taken);
        taken
    }

    pub fn begin_charging(&mut self, now: u64) {
        self.is_charging = true;
        self.charge_start_time = Some(now);
    }

    /// Stop charging and return how long the input was held
    pub fn finish_charging(&mut self, now: u64) -> u64 {
        let held = self
            .charge_start_time
            .map_or(0, |start| now.saturating_sub(start));
        self.is_charging = false;
        self.charge_start_time = None;
        held
    }

    fn set(&mut self, value: f32) {
        if value.is_nan() {
            return;
        }
        self.current = value.clamp(0.0, self.max);
    }
}
