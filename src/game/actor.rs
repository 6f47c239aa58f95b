//! Car actor: health, status flags, status-effect stack, hit throttles

use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use super::abilities::AbilityKind;
use super::objects::ObjectKind;
use super::physics::{BodyHandle, BodyMaterial, CollisionFilter, PhysicsPort, Vec2};

/// Base tuning shared by every car
#[derive(Debug, Clone, Copy)]
pub struct CarStats {
    /// Body radius
    pub radius: f32,
    pub max_health: f32,
    /// Drive force at full throttle
    pub acceleration: f32,
    /// Turn rate in radians per second
    pub turn_rate: f32,
    pub friction: f32,
    pub friction_air: f32,
    pub density: f32,
}

impl Default for CarStats {
    fn default() -> Self {
        Self {
            radius: 20.0,
            max_health: 10.0,
            acceleration: 400.0,
            turn_rate: 3.5,
            friction: 0.05,
            friction_air: 0.04,
            density: 0.001,
        }
    }
}

/// Body properties status effects may temporarily override
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyProps {
    pub material: BodyMaterial,
    pub acceleration: f32,
    pub filter: CollisionFilter,
}

impl BodyProps {
    pub fn from_stats(stats: &CarStats) -> Self {
        Self {
            material: BodyMaterial {
                friction: stats.friction,
                friction_air: stats.friction_air,
            },
            acceleration: stats.acceleration,
            filter: CollisionFilter::car(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyOverride {
    Friction(f32),
    FrictionAir(f32),
    Acceleration(f32),
    Filter(CollisionFilter),
}

/// Ordered record of which effect overrode which base property.
///
/// The effective value of a property is the most recent override still on
/// the stack, otherwise the base snapshot. Removing an effect never touches
/// overrides owned by other effects.
#[derive(Debug, Clone, Default)]
pub struct StatusEffectStack {
    entries: Vec<(AbilityKind, PropertyOverride)>,
}

impl StatusEffectStack {
    pub fn push(&mut self, source: AbilityKind, value: PropertyOverride) {
        self.entries.push((source, value));
    }

    /// Drop every override pushed by `source`; returns whether any existed
    pub fn remove_source(&mut self, source: AbilityKind) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(s, _)| *s != source);
        self.entries.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, base: &BodyProps) -> BodyProps {
        let mut props = *base;
        for (_, value) in &self.entries {
            match *value {
                PropertyOverride::Friction(f) => props.material.friction = f,
                PropertyOverride::FrictionAir(f) => props.material.friction_air = f,
                PropertyOverride::Acceleration(a) => props.acceleration = a,
                PropertyOverride::Filter(filter) => props.filter = filter,
            }
        }
        props
    }
}

/// Start and optional expiry of a status flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTimer {
    pub since: u64,
    pub until: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusFlags {
    pub ghost: Option<StatusTimer>,
    pub anchored: Option<StatusTimer>,
    pub focused: Option<StatusTimer>,
}

impl StatusFlags {
    pub fn is_ghost(&self) -> bool {
        self.ghost.is_some()
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored.is_some()
    }

    pub fn is_focused(&self) -> bool {
        self.focused.is_some()
    }
}

/// Who hurt this car, most recent last
#[derive(Debug, Clone, PartialEq)]
pub struct AttackRecord {
    pub attacker_id: Uuid,
    pub source: ObjectKind,
    pub damage: f32,
    pub at: u64,
}

/// Queued press/release of an ability input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbilityEdge {
    Pressed(AbilityKind),
    Released(AbilityKind),
}

/// Driving intent, applied each step
#[derive(Debug, Clone, Default)]
pub struct DriveInput {
    pub seq: u32,
    pub throttle: f32,
    pub steer: f32,
    /// Ability inputs currently held down
    pub held: BTreeSet<AbilityKind>,
    /// Edges queued since the last step
    pub edges: Vec<AbilityEdge>,
}

impl DriveInput {
    pub fn is_held(&self, kind: AbilityKind) -> bool {
        self.held.contains(&kind)
    }

    pub fn press(&mut self, kind: AbilityKind) {
        if self.held.insert(kind) {
            self.edges.push(AbilityEdge::Pressed(kind));
        }
    }

    pub fn release(&mut self, kind: AbilityKind) {
        if self.held.remove(&kind) {
            self.edges.push(AbilityEdge::Released(kind));
        }
    }
}

/// Authoritative car state
#[derive(Debug, Clone)]
pub struct Car {
    pub id: Uuid,
    pub display_name: String,
    pub body: BodyHandle,
    pub stats: CarStats,

    // Position and movement (synced from the body after each step)
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,

    // Combat
    pub health: f32,
    pub alive: bool,
    pub death_time: Option<u64>,
    pub invulnerable_until: Option<u64>,
    /// Flat reduction applied to every ability cooldown
    pub cooldown_reduction_ms: u64,

    // Status
    pub status: StatusFlags,
    pub base_props: BodyProps,
    pub effects: StatusEffectStack,

    /// Object kind -> object id -> last damage time
    pub damage_cooldowns: HashMap<ObjectKind, HashMap<Uuid, u64>>,
    /// Portal id -> last teleport time
    pub portal_cooldowns: HashMap<Uuid, u64>,
    pub attackers: Vec<AttackRecord>,

    pub input: DriveInput,

    // Stats
    pub kills: u32,
    pub deaths: u32,
    pub damage_dealt: f32,
    pub damage_taken: f32,
    pub abilities_used: u32,
}

impl Car {
    pub fn new(
        id: Uuid,
        display_name: String,
        body: BodyHandle,
        stats: CarStats,
        position: Vec2,
        rotation: f32,
    ) -> Self {
        Self {
            id,
            display_name,
            body,
            stats,
            position,
            velocity: Vec2::ZERO,
            rotation,
            health: stats.max_health,
            alive: true,
            death_time: None,
            invulnerable_until: None,
            cooldown_reduction_ms: 0,
            status: StatusFlags::default(),
            base_props: BodyProps::from_stats(&stats),
            effects: StatusEffectStack::default(),
            damage_cooldowns: HashMap::new(),
            portal_cooldowns: HashMap::new(),
            attackers: Vec::new(),
            input: DriveInput::default(),
            kills: 0,
            deaths: 0,
            damage_dealt: 0.0,
            damage_taken: 0.0,
            abilities_used: 0,
        }
    }

    pub fn is_invulnerable(&self, now: u64) -> bool {
        self.invulnerable_until.map_or(false, |until| now < until)
    }

    /// Ghosted or spawn-protected cars ignore damage, knockback and portals
    pub fn is_untouchable(&self, now: u64) -> bool {
        self.status.is_ghost() || self.is_invulnerable(now)
    }

    pub fn effective_props(&self) -> BodyProps {
        self.effects.resolve(&self.base_props)
    }

    /// Push an override and write the effective properties to the body
    pub fn push_override(
        &mut self,
        source: AbilityKind,
        value: PropertyOverride,
        physics: &mut dyn PhysicsPort,
    ) {
        self.effects.push(source, value);
        self.refresh_body(physics);
    }

    /// Remove an effect's overrides and restore whatever is left underneath
    pub fn clear_overrides(&mut self, source: AbilityKind, physics: &mut dyn PhysicsPort) {
        if self.effects.remove_source(source) {
            self.refresh_body(physics);
        }
    }

    pub fn refresh_body(&self, physics: &mut dyn PhysicsPort) {
        let props = self.effective_props();
        physics.set_material(self.body, props.material);
        physics.set_collision_filter(self.body, props.filter);
    }

    /// Point just outside the hull along the facing direction (negative = behind)
    pub fn muzzle(&self, offset: f32) -> Vec2 {
        self.position + Vec2::from_angle(self.rotation) * offset
    }

    /// Returns true (and stamps the hit) if `object_id` may damage this car now
    pub fn try_register_hit(&mut self, kind: ObjectKind, object_id: Uuid, now: u64, window_ms: u64) -> bool {
        let hits = self.damage_cooldowns.entry(kind).or_default();
        if let Some(&last) = hits.get(&object_id) {
            if now.saturating_sub(last) < window_ms {
                return false;
            }
        }
        hits.insert(object_id, now);
        true
    }

    pub fn portal_ready(&self, portal_id: Uuid, now: u64, window_ms: u64) -> bool {
        self.portal_cooldowns
            .get(&portal_id)
            .map_or(true, |&last| now.saturating_sub(last) >= window_ms)
    }

    pub fn stamp_portal(&mut self, portal_id: Uuid, now: u64) {
        self.portal_cooldowns.insert(portal_id, now);
    }

    /// Forget throttle entries older than `max_age_ms`
    pub fn prune_cooldowns(&mut self, now: u64, max_age_ms: u64) {
        for hits in self.damage_cooldowns.values_mut() {
            hits.retain(|_, &mut at| now.saturating_sub(at) < max_age_ms);
        }
        self.damage_cooldowns.retain(|_, hits| !hits.is_empty());
        self.portal_cooldowns
            .retain(|_, &mut at| now.saturating_sub(at) < max_age_ms);
    }

    /// Apply damage with attribution; returns true if this hit killed the car
    pub fn take_damage(&mut self, attacker_id: Uuid, source: ObjectKind, damage: f32, now: u64) -> bool {
        if !self.alive || damage <= 0.0 {
            return false;
        }

        self.health = (self.health - damage).max(0.0);
        self.damage_taken += damage;
        self.attackers.push(AttackRecord {
            attacker_id,
            source,
            damage,
            at: now,
        });

        if self.health <= 0.0 {
            self.alive = false;
            self.death_time = Some(now);
            self.deaths += 1;
            return true;
        }
        false
    }

    pub fn last_attacker(&self) -> Option<Uuid> {
        self.attackers.last().map(|a| a.attacker_id)
    }

    /// Turn the wheel and push the body along the facing direction
    pub fn apply_drive(&mut self, physics: &mut dyn PhysicsPort, dt: f32) {
        if !self.alive {
            return;
        }

        let throttle = self.input.throttle.clamp(-1.0, 1.0);
        let steer = self.input.steer.clamp(-1.0, 1.0);

        self.rotation = (self.rotation + steer * self.stats.turn_rate * dt).rem_euclid(std::f32::consts::TAU);

        if self.status.is_anchored() || throttle == 0.0 {
            return;
        }

        let acceleration = self.effective_props().acceleration;
        // Reverse is slower
        let power = if throttle >= 0.0 {
            throttle * acceleration
        } else {
            throttle * acceleration * 0.5
        };
        physics.apply_force(self.body, Vec2::from_angle(self.rotation) * power);
    }

    pub fn sync_from_body(&mut self, physics: &dyn PhysicsPort) {
        if let Some(position) = physics.position(self.body) {
            self.position = position;
        }
        if let Some(velocity) = physics.velocity(self.body) {
            self.velocity = velocity;
        }
    }

    /// Bring a dead car back at `position` with full health
    pub fn respawn(&mut self, position: Vec2, rotation: f32, now: u64, protection_ms: u64) {
        self.position = position;
        self.velocity = Vec2::ZERO;
        self.rotation = rotation;
        self.health = self.stats.max_health;
        self.alive = true;
        self.death_time = None;
        self.invulnerable_until = Some(now + protection_ms);
        self.attackers.clear();
        self.damage_cooldowns.clear();
        self.portal_cooldowns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::{category, SimplePhysics};

    fn car() -> Car {
        Car::new(
            Uuid::new_v4(),
            "test".to_string(),
            BodyHandle(1),
            CarStats::default(),
            Vec2::ZERO,
            0.0,
        )
    }

    #[test]
    fn overlapping_effects_restore_base_in_any_order() {
        let base = BodyProps::from_stats(&CarStats::default());
        let mut stack = StatusEffectStack::default();

        stack.push(AbilityKind::Anchor, PropertyOverride::FrictionAir(0.6));
        stack.push(AbilityKind::Focus, PropertyOverride::FrictionAir(0.01));
        stack.push(AbilityKind::Focus, PropertyOverride::Acceleration(600.0));
        assert_eq!(stack.resolve(&base).material.friction_air, 0.01);

        // Anchor ends first: focus still wins
        stack.remove_source(AbilityKind::Anchor);
        assert_eq!(stack.resolve(&base).material.friction_air, 0.01);

        stack.remove_source(AbilityKind::Focus);
        assert!(stack.is_empty());
        assert_eq!(stack.resolve(&base), base);
    }

    #[test]
    fn earlier_effect_reappears_when_later_one_ends() {
        let base = BodyProps::from_stats(&CarStats::default());
        let mut stack = StatusEffectStack::default();
        stack.push(AbilityKind::Anchor, PropertyOverride::FrictionAir(0.6));
        stack.push(AbilityKind::Focus, PropertyOverride::FrictionAir(0.01));
        stack.remove_source(AbilityKind::Focus);
        assert_eq!(stack.resolve(&base).material.friction_air, 0.6);
    }

    #[test]
    fn overrides_are_written_to_the_body_and_restored() {
        let mut physics = SimplePhysics::new();
        let mut car = car();
        let spec = crate::game::physics::BodySpec::circle(
            crate::game::physics::BodyTag {
                role: crate::game::physics::BodyRole::Car,
                entity_id: car.id,
                owner_id: None,
            },
            Vec2::ZERO,
            20.0,
            car.base_props.filter,
        )
        .with_material(car.base_props.material);
        car.body = physics.spawn_body(spec).unwrap();

        car.push_override(
            AbilityKind::Ghost,
            PropertyOverride::Filter(CollisionFilter::ghost()),
            &mut physics,
        );
        assert_eq!(
            physics.collision_filter(car.body).map(|f| f.category),
            Some(category::GHOST)
        );

        car.clear_overrides(AbilityKind::Ghost, &mut physics);
        assert_eq!(physics.collision_filter(car.body), Some(car.base_props.filter));
        assert_eq!(physics.material(car.body), Some(car.base_props.material));
    }

    #[test]
    fn hit_throttle_is_per_object() {
        let mut car = car();
        let trap_a = Uuid::new_v4();
        let trap_b = Uuid::new_v4();

        assert!(car.try_register_hit(ObjectKind::Trap, trap_a, 0, 1000));
        assert!(!car.try_register_hit(ObjectKind::Trap, trap_a, 999, 1000));
        assert!(car.try_register_hit(ObjectKind::Trap, trap_b, 999, 1000));
        assert!(car.try_register_hit(ObjectKind::Trap, trap_a, 1001, 1000));
    }

    #[test]
    fn lethal_damage_marks_death_and_keeps_attribution() {
        let mut car = car();
        let attacker = Uuid::new_v4();
        assert!(!car.take_damage(attacker, ObjectKind::Cannonball, 4.0, 10));
        assert!(car.take_damage(attacker, ObjectKind::Trap, 100.0, 20));
        assert_eq!(car.health, 0.0);
        assert!(!car.alive);
        assert_eq!(car.death_time, Some(20));
        assert_eq!(car.attackers.len(), 2);
        assert_eq!(car.last_attacker(), Some(attacker));
        // Dead cars take no further damage
        assert!(!car.take_damage(attacker, ObjectKind::Trap, 1.0, 30));
        assert_eq!(car.attackers.len(), 2);
    }

    #[test]
    fn press_and_release_queue_edges_once() {
        let mut input = DriveInput::default();
        input.press(AbilityKind::Anchor);
        input.press(AbilityKind::Anchor);
        input.release(AbilityKind::Anchor);
        assert_eq!(
            input.edges,
            vec![
                AbilityEdge::Pressed(AbilityKind::Anchor),
                AbilityEdge::Released(AbilityKind::Anchor)
            ]
        );
        assert!(!input.is_held(AbilityKind::Anchor));
    }

    #[test]
    fn spawn_protection_makes_car_untouchable() {
        let mut car = car();
        car.alive = false;
        car.respawn(Vec2::new(5.0, 5.0), 1.0, 1000, 2000);
        assert!(car.alive);
        assert!(car.is_untouchable(2999));
        assert!(!car.is_untouchable(3000));
    }
}
