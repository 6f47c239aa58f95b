//! Ability framework
//!
//! Every capability is a variant of [`Ability`], a stateless template built
//! from an [`AbilityConfig`]. Mutable per-actor bookkeeping (last use, charge,
//! active window) lives in [`AbilityState`]; the two are paired 1:1 per actor
//! in an [`EquippedAbility`].
//!
//! Gating failures are reported through [`ActivationResult`], never as errors.

pub mod anchor;
pub mod cannon;
pub mod charge;
pub mod charged_shot;
pub mod config;
pub mod focus;
pub mod ghost;
pub mod portal;
pub mod registry;
pub mod trap;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::actor::Car;
use super::objects::AbilityObjectPool;
use super::physics::{PhysicsPort, Vec2};

pub use charge::{calculate_charge_usage, charge_scale, ChargeConfig, ChargeState, ScaleCurve};
pub use config::{AbilityConfig, AbilityParams};
pub use registry::AbilityRegistry;

use anchor::Anchor;
use cannon::Cannon;
use charged_shot::ChargedShot;
use focus::Focus;
use ghost::Ghost;
use portal::PortalGun;
use trap::TrapLayer;

/// Floor for any cooldown after reductions
pub const MIN_COOLDOWN_MS: u64 = 500;

/// Closed set of capability kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityKind {
    Cannon,
    Trap,
    Portal,
    Ghost,
    Anchor,
    Focus,
    ChargedShot,
}

impl AbilityKind {
    pub const ALL: [AbilityKind; 7] = [
        AbilityKind::Cannon,
        AbilityKind::Trap,
        AbilityKind::Portal,
        AbilityKind::Ghost,
        AbilityKind::Anchor,
        AbilityKind::Focus,
        AbilityKind::ChargedShot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AbilityKind::Cannon => "cannon",
            AbilityKind::Trap => "trap",
            AbilityKind::Portal => "portal",
            AbilityKind::Ghost => "ghost",
            AbilityKind::Anchor => "anchor",
            AbilityKind::Focus => "focus",
            AbilityKind::ChargedShot => "charged_shot",
        }
    }

    /// How input edges drive this kind
    pub fn trigger(&self) -> TriggerMode {
        match self {
            AbilityKind::Cannon | AbilityKind::Trap | AbilityKind::Portal | AbilityKind::Ghost => {
                TriggerMode::Press
            }
            AbilityKind::Anchor | AbilityKind::Focus => TriggerMode::Hold,
            AbilityKind::ChargedShot => TriggerMode::HoldRelease,
        }
    }
}

impl fmt::Display for AbilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbilityKind {
    type Err = AbilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AbilityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AbilityError::NotFound(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Activates on the press edge
    Press,
    /// Activates on press, ends when released or out of charge
    Hold,
    /// Charges while held, activates on release
    HoldRelease,
}

/// Why an activation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Cooldown,
    LowCharge,
    AlreadyActive,
    /// The physics engine could not allocate the spawned object
    SpawnFailed,
}

/// Ability errors
#[derive(Debug, thiserror::Error)]
pub enum AbilityError {
    #[error("Unknown ability: {0}")]
    NotFound(String),

    #[error("Ability {kind} configured with parameters for {params}")]
    KindMismatch { kind: AbilityKind, params: AbilityKind },

    #[error("Ability {0} uses the charge system but has no charge config")]
    MissingCharge(AbilityKind),
}

/// Effective cooldown after the actor's reduction stat, floored
pub fn effective_cooldown(base_ms: u64, reduction_ms: u64) -> u64 {
    base_ms.saturating_sub(reduction_ms).max(MIN_COOLDOWN_MS)
}

/// Static (per-kind) part of an ability
#[derive(Debug, Clone, PartialEq)]
pub struct AbilityMeta {
    pub kind: AbilityKind,
    pub name: String,
    pub cooldown_ms: u64,
    pub duration_ms: u64,
    pub charge: Option<ChargeConfig>,
}

impl AbilityMeta {
    pub fn from_config(config: &AbilityConfig) -> Self {
        Self {
            kind: config.id,
            name: config.name.clone(),
            cooldown_ms: config.cooldown_ms,
            duration_ms: config.duration_ms,
            charge: config.charge,
        }
    }

    /// Like [`AbilityMeta::from_config`] but requires a charge config
    pub fn charged(config: &AbilityConfig) -> Result<Self, AbilityError> {
        if config.charge.is_none() {
            return Err(AbilityError::MissingCharge(config.id));
        }
        Ok(Self::from_config(config))
    }

    /// Reject a request without mutating anything
    pub fn gate(&self, state: &AbilityState, car: &Car, now: u64) -> Result<(), FailureReason> {
        if state.active.is_some() {
            return Err(FailureReason::AlreadyActive);
        }
        if !state.can_use(self.cooldown_ms, car.cooldown_reduction_ms, now) {
            return Err(FailureReason::Cooldown);
        }
        if let (Some(config), Some(charge)) = (&self.charge, &state.charge) {
            if charge.current < config.min_charge_to_use {
                return Err(FailureReason::LowCharge);
            }
        }
        Ok(())
    }
}

/// Window during which a sustained or timed effect is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveWindow {
    pub since: u64,
    pub until: Option<u64>,
}

impl ActiveWindow {
    pub fn expired(&self, now: u64) -> bool {
        self.until.map_or(false, |until| now >= until)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityPhase {
    Idle,
    Cooldown,
    Charging,
    Active,
}

/// Per-actor mutable ability state
#[derive(Debug, Clone, PartialEq)]
pub struct AbilityState {
    pub kind: AbilityKind,
    pub last_used: Option<u64>,
    pub charge: Option<ChargeState>,
    pub active: Option<ActiveWindow>,
}

impl AbilityState {
    pub fn new(meta: &AbilityMeta) -> Self {
        Self {
            kind: meta.kind,
            last_used: None,
            charge: meta.charge.as_ref().map(ChargeState::new),
            active: None,
        }
    }

    pub fn can_use(&self, base_cooldown_ms: u64, reduction_ms: u64, now: u64) -> bool {
        match self.last_used {
            None => true,
            Some(last) => now.saturating_sub(last) >= effective_cooldown(base_cooldown_ms, reduction_ms),
        }
    }

    pub fn cooldown_remaining(&self, base_cooldown_ms: u64, reduction_ms: u64, now: u64) -> u64 {
        self.last_used.map_or(0, |last| {
            (last + effective_cooldown(base_cooldown_ms, reduction_ms)).saturating_sub(now)
        })
    }

    pub fn phase(&self, base_cooldown_ms: u64, reduction_ms: u64, now: u64) -> AbilityPhase {
        if self.active.is_some() {
            AbilityPhase::Active
        } else if self.charge.map_or(false, |c| c.is_charging) {
            AbilityPhase::Charging
        } else if !self.can_use(base_cooldown_ms, reduction_ms, now) {
            AbilityPhase::Cooldown
        } else {
            AbilityPhase::Idle
        }
    }

    /// Idle regeneration; sustained effects drain instead
    pub fn regenerate(&mut self, dt: f32) {
        if self.active.is_some() {
            return;
        }
        if let Some(charge) = self.charge.as_mut() {
            charge.regenerate(dt);
        }
    }
}

/// What the simulation lends an ability for one call
pub struct AbilityContext<'a> {
    pub now: u64,
    pub physics: &'a mut dyn PhysicsPort,
    pub objects: &'a mut AbilityObjectPool,
}

/// Kind-specific part of a successful activation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum AbilityEffect {
    Projectile {
        object_id: Uuid,
        velocity: Vec2,
        expires_at: u64,
    },
    Trap {
        object_id: Uuid,
        expires_at: u64,
    },
    Status {
        until: Option<u64>,
    },
    ChargedShot {
        object_id: Uuid,
        velocity: Vec2,
        expires_at: u64,
        charge_scale: f32,
        damage: f32,
        radius: f32,
        force: f32,
    },
}

/// Serializable outcome of `activate`, consumed by the broadcast layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(rename = "type")]
    pub ability: AbilityKind,
    pub position: Vec2,
    pub server_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_used: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<AbilityEffect>,
}

impl ActivationResult {
    pub fn failure(ability: AbilityKind, reason: FailureReason, position: Vec2, now: u64) -> Self {
        Self {
            success: false,
            reason: Some(reason),
            ability,
            position,
            server_time: now,
            charge_used: None,
            effect: None,
        }
    }

    pub fn success(ability: AbilityKind, position: Vec2, now: u64, effect: AbilityEffect) -> Self {
        Self {
            success: true,
            reason: None,
            ability,
            position,
            server_time: now,
            charge_used: None,
            effect: Some(effect),
        }
    }

    pub fn with_charge_used(mut self, used: f32) -> Self {
        self.charge_used = Some(used);
        self
    }
}

/// Per-ability view sent to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbilityClientData {
    pub ability: AbilityKind,
    pub name: String,
    pub phase: AbilityPhase,
    pub cooldown_remaining_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_charge: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_until: Option<u64>,
}

/// Registry-level description of a kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbilityMetadata {
    pub id: AbilityKind,
    pub name: String,
    pub cooldown_ms: u64,
    pub duration_ms: u64,
    pub uses_charge_system: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_charge: Option<f32>,
    pub trigger: TriggerMode,
}

/// Stateless ability template, one variant per kind
#[derive(Debug, Clone, PartialEq)]
pub enum Ability {
    Cannon(Cannon),
    Trap(TrapLayer),
    Portal(PortalGun),
    Ghost(Ghost),
    Anchor(Anchor),
    Focus(Focus),
    ChargedShot(ChargedShot),
}

impl Ability {
    pub fn meta(&self) -> &AbilityMeta {
        match self {
            Ability::Cannon(a) => &a.meta,
            Ability::Trap(a) => &a.meta,
            Ability::Portal(a) => &a.meta,
            Ability::Ghost(a) => &a.meta,
            Ability::Anchor(a) => &a.meta,
            Ability::Focus(a) => &a.meta,
            Ability::ChargedShot(a) => &a.meta,
        }
    }

    pub fn kind(&self) -> AbilityKind {
        self.meta().kind
    }

    pub fn new_state(&self) -> AbilityState {
        AbilityState::new(self.meta())
    }

    pub fn activate(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>) -> ActivationResult {
        match self {
            Ability::Cannon(a) => a.activate(state, car, ctx),
            Ability::Trap(a) => a.activate(state, car, ctx),
            Ability::Portal(a) => a.activate(state, car, ctx),
            Ability::Ghost(a) => a.activate(state, car, ctx),
            Ability::Anchor(a) => a.activate(state, car, ctx),
            Ability::Focus(a) => a.activate(state, car, ctx),
            Ability::ChargedShot(a) => a.activate(state, car, ctx),
        }
    }

    /// Called once per step whether or not the ability is active
    pub fn update(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>, dt: f32) {
        match self {
            Ability::Ghost(a) => a.update(state, car, ctx),
            Ability::Anchor(a) => a.update(state, car, ctx, dt),
            Ability::Focus(a) => a.update(state, car, ctx, dt),
            Ability::Cannon(_) | Ability::Trap(_) | Ability::Portal(_) | Ability::ChargedShot(_) => {
                state.regenerate(dt)
            }
        }
    }

    /// Undo any persistent body/property change made by `activate`
    pub fn deactivate(&self, state: &mut AbilityState, car: &mut Car, ctx: &mut AbilityContext<'_>) {
        match self {
            Ability::Ghost(a) => a.deactivate(state, car, ctx),
            Ability::Anchor(a) => a.deactivate(state, car, ctx),
            Ability::Focus(a) => a.deactivate(state, car, ctx),
            Ability::Cannon(_) | Ability::Trap(_) | Ability::Portal(_) => {}
            Ability::ChargedShot(_) => {
                if let Some(charge) = state.charge.as_mut() {
                    charge.finish_charging(ctx.now);
                }
            }
        }
    }

    pub fn client_data(&self, state: &AbilityState, car: &Car, now: u64) -> AbilityClientData {
        let meta = self.meta();
        AbilityClientData {
            ability: meta.kind,
            name: meta.name.clone(),
            phase: state.phase(meta.cooldown_ms, car.cooldown_reduction_ms, now),
            cooldown_remaining_ms: state.cooldown_remaining(meta.cooldown_ms, car.cooldown_reduction_ms, now),
            charge: state.charge.map(|c| c.current),
            max_charge: state.charge.map(|c| c.max),
            active_until: state.active.and_then(|w| w.until),
        }
    }

    pub fn metadata(&self) -> AbilityMetadata {
        let meta = self.meta();
        AbilityMetadata {
            id: meta.kind,
            name: meta.name.clone(),
            cooldown_ms: meta.cooldown_ms,
            duration_ms: meta.duration_ms,
            uses_charge_system: meta.charge.is_some(),
            max_charge: meta.charge.map(|c| c.max_charge),
            trigger: meta.kind.trigger(),
        }
    }
}

/// An ability template bound to one actor's state
#[derive(Debug, Clone)]
pub struct EquippedAbility {
    pub ability: Ability,
    pub state: AbilityState,
}

impl EquippedAbility {
    pub fn new(ability: Ability) -> Self {
        let state = ability.new_state();
        Self { ability, state }
    }

    pub fn kind(&self) -> AbilityKind {
        self.ability.kind()
    }

    pub fn activate(&mut self, car: &mut Car, ctx: &mut AbilityContext<'_>) -> ActivationResult {
        self.ability.activate(&mut self.state, car, ctx)
    }

    pub fn update(&mut self, car: &mut Car, ctx: &mut AbilityContext<'_>, dt: f32) {
        self.ability.update(&mut self.state, car, ctx, dt)
    }

    pub fn deactivate(&mut self, car: &mut Car, ctx: &mut AbilityContext<'_>) {
        self.ability.deactivate(&mut self.state, car, ctx)
    }

    /// Input pressed: activates or starts charging depending on the trigger
    pub fn press(&mut self, car: &mut Car, ctx: &mut AbilityContext<'_>) -> Option<ActivationResult> {
        match self.kind().trigger() {
            TriggerMode::Press | TriggerMode::Hold => Some(self.activate(car, ctx)),
            TriggerMode::HoldRelease => {
                if let Some(charge) = self.state.charge.as_mut() {
                    if !charge.is_charging {
                        charge.begin_charging(ctx.now);
                    }
                }
                None
            }
        }
    }

    /// Input released: fires charged abilities; sustained ones end in `update`
    pub fn release(&mut self, car: &mut Car, ctx: &mut AbilityContext<'_>) -> Option<ActivationResult> {
        match self.kind().trigger() {
            TriggerMode::HoldRelease => {
                let result = self.activate(car, ctx);
                if let Some(charge) = self.state.charge.as_mut() {
                    charge.finish_charging(ctx.now);
                }
                Some(result)
            }
            TriggerMode::Press | TriggerMode::Hold => None,
        }
    }

    pub fn client_data(&self, car: &Car, now: u64) -> AbilityClientData {
        self.ability.client_data(&self.state, car, now)
    }
}

/// Shared per-step bookkeeping for hold-to-sustain abilities.
///
/// Drains charge while active and returns true when the effect must end:
/// input released, charge empty, duration cap reached, or the car died.
pub(crate) fn sustain(meta: &AbilityMeta, state: &mut AbilityState, car: &Car, now: u64, dt: f32) -> bool {
    let Some(window) = state.active else {
        state.regenerate(dt);
        return false;
    };

    let drain = meta.charge.map_or(0.0, |c| c.drain_rate);
    let empty = match state.charge.as_mut() {
        Some(charge) => {
            charge.consume(drain * dt);
            charge.is_empty()
        }
        None => false,
    };

    empty || window.expired(now) || !car.input.is_held(meta.kind) || !car.alive
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::game::actor::CarStats;
    use crate::game::physics::{BodyRole, BodySpec, BodyTag, SimplePhysics};

    /// A car with a real body in `physics`
    pub fn spawn_car(physics: &mut SimplePhysics, position: Vec2) -> Car {
        let id = Uuid::new_v4();
        let stats = CarStats::default();
        let mut car = Car::new(id, "tester".to_string(), crate::game::physics::BodyHandle(0), stats, position, 0.0);
        let spec = BodySpec::circle(
            BodyTag {
                role: BodyRole::Car,
                entity_id: id,
                owner_id: None,
            },
            position,
            stats.radius,
            car.base_props.filter,
        )
        .with_material(car.base_props.material)
        .with_density(stats.density);
        car.body = physics.spawn_body(spec).unwrap();
        car
    }

    pub fn equip(kind: AbilityKind) -> EquippedAbility {
        let registry = AbilityRegistry::with_defaults();
        EquippedAbility::new(registry.create(kind).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::game::physics::SimplePhysics;

    #[test]
    fn effective_cooldown_is_floored() {
        assert_eq!(effective_cooldown(2000, 300), 1700);
        assert_eq!(effective_cooldown(2000, 1900), MIN_COOLDOWN_MS);
        assert_eq!(effective_cooldown(300, 0), MIN_COOLDOWN_MS);
    }

    #[test]
    fn kinds_parse_from_wire_names() {
        assert_eq!("charged_shot".parse::<AbilityKind>().unwrap(), AbilityKind::ChargedShot);
        assert!(matches!(
            "teleporter".parse::<AbilityKind>(),
            Err(AbilityError::NotFound(_))
        ));
        for kind in AbilityKind::ALL {
            assert_eq!(kind.as_str().parse::<AbilityKind>().unwrap(), kind);
        }
    }

    #[test]
    fn can_use_flips_after_effective_cooldown() {
        let mut physics = SimplePhysics::new();
        let mut objects = AbilityObjectPool::new();
        let mut car = spawn_car(&mut physics, Vec2::ZERO);
        car.cooldown_reduction_ms = 500;
        let mut cannon = equip(AbilityKind::Cannon);
        let base = cannon.ability.meta().cooldown_ms;

        let mut ctx = AbilityContext {
            now: 10_000,
            physics: &mut physics,
            objects: &mut objects,
        };
        assert!(cannon.activate(&mut car, &mut ctx).success);

        let ready_at = 10_000 + effective_cooldown(base, 500);
        assert!(!cannon.state.can_use(base, car.cooldown_reduction_ms, 10_000));
        assert!(!cannon.state.can_use(base, car.cooldown_reduction_ms, ready_at - 1));
        assert!(cannon.state.can_use(base, car.cooldown_reduction_ms, ready_at));

        ctx.now = 10_001;
        let second = cannon.activate(&mut car, &mut ctx);
        assert!(!second.success);
        assert_eq!(second.reason, Some(FailureReason::Cooldown));
    }

    #[test]
    fn phase_tracks_the_state_machine() {
        let shot = equip(AbilityKind::ChargedShot);
        let mut state = shot.state.clone();
        let cd = shot.ability.meta().cooldown_ms;
        assert_eq!(state.phase(cd, 0, 0), AbilityPhase::Idle);

        state.charge.as_mut().unwrap().begin_charging(0);
        assert_eq!(state.phase(cd, 0, 100), AbilityPhase::Charging);

        state.charge.as_mut().unwrap().finish_charging(100);
        state.last_used = Some(100);
        assert_eq!(state.phase(cd, 0, 200), AbilityPhase::Cooldown);
        assert_eq!(state.phase(cd, 0, 100 + effective_cooldown(cd, 0)), AbilityPhase::Idle);
    }

    #[test]
    fn failure_payload_serializes_reason_code() {
        let result = ActivationResult::failure(AbilityKind::Anchor, FailureReason::LowCharge, Vec2::ZERO, 42);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["reason"], "low_charge");
        assert_eq!(json["type"], "anchor");
        assert_eq!(json["server_time"], 42);
        assert!(json.get("effect").is_none());
    }

    #[test]
    fn charge_stays_bounded_across_any_sequence() {
        let mut physics = SimplePhysics::new();
        let mut objects = AbilityObjectPool::new();
        let mut car = spawn_car(&mut physics, Vec2::ZERO);
        let mut loadout: Vec<EquippedAbility> = [AbilityKind::Anchor, AbilityKind::Focus, AbilityKind::ChargedShot]
            .into_iter()
            .map(equip)
            .collect();

        for step in 0..600u64 {
            let now = step * 16;
            let mut ctx = AbilityContext {
                now,
                physics: &mut physics,
                objects: &mut objects,
            };
            for (i, equipped) in loadout.iter_mut().enumerate() {
                let kind = equipped.kind();
                // Press and release on a per-ability rhythm
                if (step + i as u64 * 7) % 45 == 0 {
                    car.input.press(kind);
                    equipped.press(&mut car, &mut ctx);
                }
                if (step + i as u64 * 7) % 45 == 30 {
                    car.input.release(kind);
                    equipped.release(&mut car, &mut ctx);
                }
                equipped.update(&mut car, &mut ctx, 0.016);

                let charge = equipped.state.charge.unwrap();
                assert!(charge.current >= 0.0 && charge.current <= charge.max);
            }
        }
    }
}
