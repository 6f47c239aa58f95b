//! Authoritative simulation state and the fixed step

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{ActorInfo, GameEvent};

use super::abilities::{
    AbilityContext, AbilityKind, AbilityMetadata, AbilityRegistry, ActivationResult, EquippedAbility,
};
use super::actor::{AbilityEdge, Car, CarStats};
use super::collision::{CollisionContext, CollisionResolver};
use super::objects::AbilityObjectPool;
use super::physics::{BodyRole, BodySpec, BodyTag, CollisionFilter, PhysicsError, PhysicsPort, Vec2};

/// Delay between death and respawn
pub const RESPAWN_DELAY_MS: u64 = 3000;
/// Invulnerability after a respawn
pub const SPAWN_PROTECTION_MS: u64 = 2000;
/// Hit and teleport throttle entries older than this are dropped
pub const THROTTLE_RETENTION_MS: u64 = 10_000;
/// Throttle pruning cadence in ticks
const PRUNE_INTERVAL_TICKS: u64 = 60;

/// Static arena geometry
#[derive(Debug, Clone)]
pub struct ArenaLayout {
    /// Cars spawn within this distance of the origin
    pub spawn_radius: f32,
    /// Circular obstacles (centre, radius)
    pub pillars: Vec<(Vec2, f32)>,
}

impl ArenaLayout {
    pub fn open(spawn_radius: f32) -> Self {
        Self {
            spawn_radius,
            pillars: Vec::new(),
        }
    }
}

impl Default for ArenaLayout {
    fn default() -> Self {
        Self {
            spawn_radius: 800.0,
            pillars: vec![
                (Vec2::new(350.0, 350.0), 50.0),
                (Vec2::new(-350.0, 350.0), 50.0),
                (Vec2::new(350.0, -350.0), 50.0),
                (Vec2::new(-350.0, -350.0), 50.0),
            ],
        }
    }
}

/// Simulation errors
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Actor {0} is already in the simulation")]
    ActorExists(Uuid),

    #[error("Car body allocation failed: {0}")]
    Physics(#[from] PhysicsError),
}

/// Owns every car, equipped ability, ability object and the physics world
pub struct Simulation {
    pub id: Uuid,
    tick: u64,
    clock_ms: u64,
    step_us: u64,
    dt: f32,
    cars: BTreeMap<Uuid, Car>,
    loadouts: BTreeMap<(Uuid, AbilityKind), EquippedAbility>,
    objects: AbilityObjectPool,
    physics: Box<dyn PhysicsPort>,
    registry: Arc<AbilityRegistry>,
    rng: ChaCha8Rng,
    arena: ArenaLayout,
    events: Vec<GameEvent>,
}

impl Simulation {
    pub fn new(
        id: Uuid,
        registry: Arc<AbilityRegistry>,
        mut physics: Box<dyn PhysicsPort>,
        arena: ArenaLayout,
        seed: u64,
        step: Duration,
    ) -> Self {
        for (center, radius) in &arena.pillars {
            let tag = BodyTag {
                role: BodyRole::Static,
                entity_id: Uuid::new_v4(),
                owner_id: None,
            };
            let spec = BodySpec::circle(tag, *center, *radius, CollisionFilter::wall()).fixed();
            if let Err(e) = physics.spawn_body(spec) {
                warn!(error = %e, "Failed to place arena pillar");
            }
        }

        Self {
            id,
            tick: 0,
            clock_ms: 0,
            step_us: (step.as_micros() as u64).max(1),
            dt: step.as_secs_f32(),
            cars: BTreeMap::new(),
            loadouts: BTreeMap::new(),
            objects: AbilityObjectPool::new(),
            physics,
            registry,
            rng: ChaCha8Rng::seed_from_u64(seed),
            arena,
            events: Vec::new(),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulation clock; every ability and object timestamp uses it
    pub fn now(&self) -> u64 {
        self.clock_ms
    }

    pub fn cars(&self) -> &BTreeMap<Uuid, Car> {
        &self.cars
    }

    pub fn car(&self, id: Uuid) -> Option<&Car> {
        self.cars.get(&id)
    }

    pub fn car_count(&self) -> usize {
        self.cars.len()
    }

    pub fn objects(&self) -> &AbilityObjectPool {
        &self.objects
    }

    pub fn physics(&self) -> &dyn PhysicsPort {
        self.physics.as_ref()
    }

    /// An actor's equipped abilities in kind order
    pub fn loadout(&self, actor_id: Uuid) -> impl Iterator<Item = &EquippedAbility> {
        self.loadouts
            .range((actor_id, AbilityKind::Cannon)..=(actor_id, AbilityKind::ChargedShot))
            .map(|(_, equipped)| equipped)
    }

    pub fn loadout_metadata(&self, actor_id: Uuid) -> Vec<AbilityMetadata> {
        self.loadout(actor_id).map(|e| e.ability.metadata()).collect()
    }

    pub fn actor_info(&self, actor_id: Uuid) -> Option<ActorInfo> {
        self.cars.get(&actor_id).map(|car| ActorInfo {
            actor_id,
            display_name: car.display_name.clone(),
            loadout: self.loadout(actor_id).map(EquippedAbility::kind).collect(),
        })
    }

    /// Spawn a car and equip its loadout; unknown ability ids are skipped
    pub fn add_car(
        &mut self,
        actor_id: Uuid,
        display_name: String,
        loadout: &[String],
    ) -> Result<ActorInfo, SimulationError> {
        if self.cars.contains_key(&actor_id) {
            return Err(SimulationError::ActorExists(actor_id));
        }

        let stats = CarStats::default();
        let (position, rotation) = self.spawn_point();
        let mut car = Car::new(actor_id, display_name, super::physics::BodyHandle(0), stats, position, rotation);
        let spec = BodySpec::circle(
            BodyTag {
                role: BodyRole::Car,
                entity_id: actor_id,
                owner_id: None,
            },
            position,
            stats.radius,
            car.base_props.filter,
        )
        .with_material(car.base_props.material)
        .with_density(stats.density)
        .with_restitution(0.2);
        car.body = self.physics.spawn_body(spec)?;

        for id in loadout {
            let Ok(ability) = self.registry.create_by_name(id) else {
                // Logged by the registry
                continue;
            };
            self.loadouts
                .entry((actor_id, ability.kind()))
                .or_insert_with(|| EquippedAbility::new(ability));
        }

        self.cars.insert(actor_id, car);
        let info = self.actor_info(actor_id).ok_or(SimulationError::ActorExists(actor_id))?;
        info!(
            sim_id = %self.id,
            actor_id = %actor_id,
            loadout = ?info.loadout,
            "Car joined"
        );
        Ok(info)
    }

    /// Deactivate abilities, purge owned objects and destroy the body
    pub fn remove_car(&mut self, actor_id: Uuid) -> bool {
        let Some(mut car) = self.cars.remove(&actor_id) else {
            return false;
        };

        let now = self.clock_ms;
        let keys: Vec<_> = self.loadout(actor_id).map(|e| (actor_id, e.kind())).collect();
        for key in keys {
            if let Some(mut equipped) = self.loadouts.remove(&key) {
                let mut ctx = AbilityContext {
                    now,
                    physics: self.physics.as_mut(),
                    objects: &mut self.objects,
                };
                equipped.deactivate(&mut car, &mut ctx);
            }
        }

        let purged = self.objects.remove_owned_by(self.physics.as_mut(), actor_id);
        self.physics.destroy_body(car.body);
        self.collect_removals();

        info!(sim_id = %self.id, actor_id = %actor_id, purged, "Car left");
        true
    }

    /// Latest driving intent; stale sequence numbers are ignored
    pub fn set_drive(&mut self, actor_id: Uuid, seq: u32, throttle: f32, steer: f32) {
        if let Some(car) = self.cars.get_mut(&actor_id) {
            if seq > car.input.seq {
                car.input.seq = seq;
                car.input.throttle = throttle.clamp(-1.0, 1.0);
                car.input.steer = steer.clamp(-1.0, 1.0);
            }
        }
    }

    /// Queue an ability press for the next step
    pub fn press(&mut self, actor_id: Uuid, kind: AbilityKind) {
        if !self.loadouts.contains_key(&(actor_id, kind)) {
            debug!(actor_id = %actor_id, ability = %kind, "Press for unequipped ability ignored");
            return;
        }
        if let Some(car) = self.cars.get_mut(&actor_id) {
            car.input.press(kind);
        }
    }

    /// Queue an ability release for the next step
    pub fn release(&mut self, actor_id: Uuid, kind: AbilityKind) {
        if let Some(car) = self.cars.get_mut(&actor_id) {
            car.input.release(kind);
        }
    }

    /// Events produced since the last call
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Advance exactly one fixed step
    pub fn step(&mut self) {
        self.tick += 1;
        self.clock_ms = self.tick * self.step_us / 1000;
        let now = self.clock_ms;
        let dt = self.dt;

        self.apply_inputs(now, dt);
        self.update_abilities(now, dt);

        let contacts = self.physics.step(dt);
        for car in self.cars.values_mut() {
            car.sync_from_body(self.physics.as_ref());
        }
        self.objects.sync_positions(self.physics.as_ref());

        for contact in &contacts {
            let mut ctx = CollisionContext {
                now,
                physics: self.physics.as_mut(),
                objects: &mut self.objects,
                cars: &mut self.cars,
            };
            let events = CollisionResolver::resolve(contact, &mut ctx);
            self.events.extend(events);
        }

        self.objects.sweep_expired(self.physics.as_mut(), now);
        self.collect_removals();
        self.process_deaths(now);

        if self.tick % PRUNE_INTERVAL_TICKS == 0 {
            for car in self.cars.values_mut() {
                car.prune_cooldowns(now, THROTTLE_RETENTION_MS);
            }
        }
    }

    /// Drive forces and queued ability edges
    fn apply_inputs(&mut self, now: u64, dt: f32) {
        for (actor_id, car) in self.cars.iter_mut() {
            car.apply_drive(self.physics.as_mut(), dt);

            let edges = std::mem::take(&mut car.input.edges);
            if !car.alive {
                continue;
            }
            for edge in edges {
                let kind = match edge {
                    AbilityEdge::Pressed(kind) | AbilityEdge::Released(kind) => kind,
                };
                let Some(equipped) = self.loadouts.get_mut(&(*actor_id, kind)) else {
                    continue;
                };
                let mut ctx = AbilityContext {
                    now,
                    physics: self.physics.as_mut(),
                    objects: &mut self.objects,
                };
                let result = match edge {
                    AbilityEdge::Pressed(_) => equipped.press(car, &mut ctx),
                    AbilityEdge::Released(_) => equipped.release(car, &mut ctx),
                };
                if let Some(result) = result {
                    self.events.push(activation_event(*actor_id, result));
                }
            }
        }
    }

    /// Per-step update for every equipped ability, active or not
    fn update_abilities(&mut self, now: u64, dt: f32) {
        for ((actor_id, _), equipped) in self.loadouts.iter_mut() {
            let Some(car) = self.cars.get_mut(actor_id) else {
                continue;
            };
            let mut ctx = AbilityContext {
                now,
                physics: self.physics.as_mut(),
                objects: &mut self.objects,
            };
            equipped.update(car, &mut ctx, dt);
        }
    }

    /// Turn pool removal records into events
    fn collect_removals(&mut self) {
        for removed in self.objects.drain_removed() {
            self.events.push(GameEvent::ObjectRemoved {
                object_id: removed.id,
                kind: removed.kind,
                reason: removed.reason,
            });
        }
    }

    /// End abilities of cars that just died and respawn those whose delay passed
    fn process_deaths(&mut self, now: u64) {
        let dead: Vec<(Uuid, u64)> = self
            .cars
            .values()
            .filter(|c| !c.alive)
            .filter_map(|c| c.death_time.map(|t| (c.id, t)))
            .collect();

        for (actor_id, died_at) in dead {
            if died_at == now {
                self.deactivate_all(actor_id, now);
            }
            if now >= died_at + RESPAWN_DELAY_MS {
                self.respawn(actor_id, now);
            }
        }
    }

    fn deactivate_all(&mut self, actor_id: Uuid, now: u64) {
        let Some(car) = self.cars.get_mut(&actor_id) else {
            return;
        };
        for ((owner, _), equipped) in self.loadouts.iter_mut() {
            if *owner != actor_id {
                continue;
            }
            let mut ctx = AbilityContext {
                now,
                physics: self.physics.as_mut(),
                objects: &mut self.objects,
            };
            equipped.deactivate(car, &mut ctx);
        }
    }

    fn respawn(&mut self, actor_id: Uuid, now: u64) {
        let (position, rotation) = self.spawn_point();
        let Some(car) = self.cars.get_mut(&actor_id) else {
            return;
        };
        car.respawn(position, rotation, now, SPAWN_PROTECTION_MS);
        self.physics.set_position(car.body, position);
        self.physics.set_velocity(car.body, Vec2::ZERO);

        debug!(actor_id = %actor_id, x = position.x, y = position.y, "Car respawned");
        self.events.push(GameEvent::Respawn {
            actor_id,
            x: position.x,
            y: position.y,
        });
    }

    /// Seeded spawn position and heading
    fn spawn_point(&mut self) -> (Vec2, f32) {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = self.rng.gen_range(0.0..self.arena.spawn_radius.max(1.0));
        let rotation = self.rng.gen_range(0.0..std::f32::consts::TAU);
        (Vec2::from_angle(angle) * distance, rotation)
    }

    /// Move a car directly (tests and scripted setups)
    #[cfg(test)]
    pub(crate) fn place_car(&mut self, actor_id: Uuid, position: Vec2, rotation: f32) {
        if let Some(car) = self.cars.get_mut(&actor_id) {
            car.position = position;
            car.rotation = rotation;
            self.physics.set_position(car.body, position);
            self.physics.set_velocity(car.body, Vec2::ZERO);
        }
    }
}

fn activation_event(actor_id: Uuid, result: ActivationResult) -> GameEvent {
    match result.reason {
        Some(reason) if !result.success => GameEvent::AbilityFailed {
            actor_id,
            ability: result.ability,
            reason,
        },
        _ => GameEvent::AbilityUsed { actor_id, result },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::abilities::FailureReason;
    use crate::game::objects::ObjectKind;
    use crate::game::physics::SimplePhysics;
    use crate::util::time::step_duration;

    fn sim() -> Simulation {
        Simulation::new(
            Uuid::new_v4(),
            Arc::new(AbilityRegistry::with_defaults()),
            Box::new(SimplePhysics::new()),
            ArenaLayout::open(500.0),
            7,
            step_duration(50),
        )
    }

    fn loadout(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn run(sim: &mut Simulation, steps: usize) -> Vec<GameEvent> {
        let mut events = Vec::new();
        for _ in 0..steps {
            sim.step();
            events.extend(sim.take_events());
        }
        events
    }

    #[test]
    fn clock_advances_one_step_per_step() {
        let mut sim = sim();
        run(&mut sim, 3);
        assert_eq!(sim.tick(), 3);
        assert_eq!(sim.now(), 60);
    }

    #[test]
    fn join_equips_known_abilities_only() {
        let mut sim = sim();
        let id = Uuid::new_v4();
        let info = sim
            .add_car(id, "Ada".to_string(), &loadout(&["cannon", "laser", "anchor"]))
            .unwrap();
        assert_eq!(info.loadout, vec![AbilityKind::Cannon, AbilityKind::Anchor]);
        assert_eq!(sim.loadout_metadata(id).len(), 2);
        assert!(matches!(
            sim.add_car(id, "Ada".to_string(), &[]),
            Err(SimulationError::ActorExists(_))
        ));
    }

    #[test]
    fn throttle_moves_the_car() {
        let mut sim = sim();
        let id = Uuid::new_v4();
        sim.add_car(id, "Ada".to_string(), &[]).unwrap();
        sim.place_car(id, Vec2::ZERO, 0.0);
        sim.set_drive(id, 1, 1.0, 0.0);
        run(&mut sim, 20);
        assert!(sim.car(id).unwrap().position.x > 0.0);

        // Stale sequence numbers are dropped
        sim.set_drive(id, 1, -1.0, 0.0);
        assert_eq!(sim.car(id).unwrap().input.throttle, 1.0);
    }

    #[test]
    fn press_reports_success_then_cooldown() {
        let mut sim = sim();
        let id = Uuid::new_v4();
        sim.add_car(id, "Ada".to_string(), &loadout(&["cannon"])).unwrap();

        sim.press(id, AbilityKind::Cannon);
        let events = run(&mut sim, 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::AbilityUsed { actor_id, .. } if *actor_id == id)));
        assert_eq!(sim.objects().find_by_owner_and_kind(id, ObjectKind::Cannonball).len(), 1);

        sim.release(id, AbilityKind::Cannon);
        sim.press(id, AbilityKind::Cannon);
        let events = run(&mut sim, 1);
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::AbilityFailed { reason: FailureReason::Cooldown, .. }
        )));
    }

    #[test]
    fn unequipped_press_is_ignored() {
        let mut sim = sim();
        let id = Uuid::new_v4();
        sim.add_car(id, "Ada".to_string(), &loadout(&["cannon"])).unwrap();
        sim.press(id, AbilityKind::Ghost);
        assert!(run(&mut sim, 1).is_empty());
    }

    #[test]
    fn cannonballs_expire_with_removal_events() {
        let mut sim = sim();
        let id = Uuid::new_v4();
        sim.add_car(id, "Ada".to_string(), &loadout(&["cannon"])).unwrap();
        sim.press(id, AbilityKind::Cannon);
        // 3000ms lifetime at 20ms per step
        let events = run(&mut sim, 151);
        assert!(sim.objects().is_empty());
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::ObjectRemoved { kind: ObjectKind::Cannonball, .. }
        )));
    }

    #[test]
    fn hold_ability_ends_when_released() {
        let mut sim = sim();
        let id = Uuid::new_v4();
        sim.add_car(id, "Ada".to_string(), &loadout(&["anchor"])).unwrap();
        sim.press(id, AbilityKind::Anchor);
        run(&mut sim, 5);
        assert!(sim.car(id).unwrap().status.is_anchored());

        sim.release(id, AbilityKind::Anchor);
        run(&mut sim, 1);
        assert!(!sim.car(id).unwrap().status.is_anchored());
        assert!(sim.car(id).unwrap().effects.is_empty());
    }

    #[test]
    fn parked_on_a_trap_takes_damage_each_second_then_respawns() {
        let mut sim = sim();
        let owner = Uuid::new_v4();
        let victim = Uuid::new_v4();
        sim.add_car(owner, "Owner".to_string(), &loadout(&["trap"])).unwrap();
        sim.add_car(victim, "Victim".to_string(), &[]).unwrap();
        sim.place_car(owner, Vec2::ZERO, 0.0);
        sim.place_car(victim, Vec2::new(-200.0, 0.0), 0.0);

        sim.press(owner, AbilityKind::Trap);
        run(&mut sim, 1);
        let trap = sim.objects().find_by_owner_and_kind(owner, ObjectKind::Trap)[0].position;
        sim.place_car(owner, Vec2::new(300.0, 300.0), 0.0);
        sim.place_car(victim, trap, 0.0);
        sim.cars.get_mut(&victim).unwrap().health = 3.0;

        // Three throttled hits kill it within ~2 seconds
        let events = run(&mut sim, 120);
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::Kill { killer_id: Some(k), .. } if *k == owner
        )));
        assert_eq!(sim.car(owner).unwrap().kills, 1);
        let dead = sim.car(victim).unwrap();
        assert!(!dead.alive);
        let died_at = dead.death_time.unwrap();

        let steps = ((died_at + RESPAWN_DELAY_MS - sim.now()) / 20 + 1) as usize;
        let events = run(&mut sim, steps);
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::Respawn { actor_id, .. } if *actor_id == victim)));
        let car = sim.car(victim).unwrap();
        assert!(car.alive);
        assert_eq!(car.health, car.stats.max_health);
        assert!(car.is_invulnerable(sim.now()));
    }

    #[test]
    fn leaving_purges_objects_and_body() {
        let mut sim = sim();
        let id = Uuid::new_v4();
        sim.add_car(id, "Ada".to_string(), &loadout(&["trap", "ghost"])).unwrap();
        sim.press(id, AbilityKind::Trap);
        sim.press(id, AbilityKind::Ghost);
        run(&mut sim, 1);
        assert_eq!(sim.objects().len(), 1);
        let body = sim.car(id).unwrap().body;

        assert!(sim.remove_car(id));
        assert!(sim.objects().is_empty());
        assert!(sim.physics().position(body).is_none());
        assert_eq!(sim.loadout(id).count(), 0);
        assert!(!sim.remove_car(id));
        assert!(sim
            .take_events()
            .iter()
            .any(|e| matches!(e, GameEvent::ObjectRemoved { .. })));
    }

    #[test]
    fn same_seed_same_spawn_points() {
        let mut a = sim();
        let mut b = sim();
        let id = Uuid::new_v4();
        a.add_car(id, "A".to_string(), &[]).unwrap();
        b.add_car(id, "A".to_string(), &[]).unwrap();
        assert_eq!(a.car(id).unwrap().position, b.car(id).unwrap().position);
    }
}
