//! Physics port and the built-in circle-body world
//!
//! The ability core never touches a physics engine directly; it goes through
//! [`PhysicsPort`]. [`SimplePhysics`] is the implementation the server ships
//! with: circle bodies, air friction, force/impulse integration, filter-aware
//! overlap detection and push-apart resolution for solid bodies.

use std::collections::{BTreeMap, HashSet};
use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 2D vector in world units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` (radians)
    pub fn from_angle(angle: f32) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (other - self).length()
    }

    pub fn normalize_or_zero(self) -> Self {
        let len = self.length();
        if len < f32::EPSILON {
            Self::ZERO
        } else {
            self * (1.0 / len)
        }
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Opaque handle to a body owned by the physics engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(pub u64);

/// What a body represents to the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRole {
    Car,
    AbilityObject,
    Static,
}

/// User data attached to every body and echoed back in collision events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyTag {
    pub role: BodyRole,
    /// Car id or ability object id
    pub entity_id: Uuid,
    /// Owning actor for ability objects
    pub owner_id: Option<Uuid>,
}

/// Collision categories (bit flags)
pub mod category {
    pub const CAR: u32 = 0x0001;
    pub const WALL: u32 = 0x0002;
    pub const PROJECTILE: u32 = 0x0004;
    pub const TRAP: u32 = 0x0008;
    pub const PORTAL: u32 = 0x0010;
    pub const GHOST: u32 = 0x0020;
    pub const ALL: u32 = 0xFFFF;
}

/// Category/mask pair; two bodies interact only if each accepts the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub category: u32,
    pub mask: u32,
}

impl CollisionFilter {
    pub const fn new(category: u32, mask: u32) -> Self {
        Self { category, mask }
    }

    pub fn car() -> Self {
        Self::new(category::CAR, category::ALL & !category::GHOST)
    }

    /// Ghosted cars only touch walls
    pub fn ghost() -> Self {
        Self::new(category::GHOST, category::WALL)
    }

    pub fn wall() -> Self {
        Self::new(category::WALL, category::ALL)
    }

    pub fn projectile() -> Self {
        Self::new(category::PROJECTILE, category::CAR | category::WALL)
    }

    pub fn trap() -> Self {
        Self::new(category::TRAP, category::CAR)
    }

    pub fn portal() -> Self {
        Self::new(category::PORTAL, category::CAR)
    }

    pub fn accepts(&self, other: &Self) -> bool {
        (self.mask & other.category) != 0 && (other.mask & self.category) != 0
    }
}

/// Surface properties that status effects may override
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyMaterial {
    pub friction: f32,
    pub friction_air: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle { radius: f32 },
    /// Vertices relative to the body position
    Polygon { vertices: Vec<Vec2> },
}

impl Shape {
    /// Radius of the smallest origin-centred circle containing the shape
    pub fn bounding_radius(&self) -> f32 {
        match self {
            Shape::Circle { radius } => *radius,
            Shape::Polygon { vertices } => vertices
                .iter()
                .map(|v| v.length())
                .fold(0.0, f32::max),
        }
    }
}

/// Everything the engine needs to create a body
#[derive(Debug, Clone)]
pub struct BodySpec {
    pub tag: BodyTag,
    pub shape: Shape,
    pub position: Vec2,
    pub velocity: Vec2,
    pub density: f32,
    pub material: BodyMaterial,
    pub restitution: f32,
    pub is_sensor: bool,
    pub is_static: bool,
    pub filter: CollisionFilter,
}

impl BodySpec {
    pub fn circle(tag: BodyTag, position: Vec2, radius: f32, filter: CollisionFilter) -> Self {
        Self {
            tag,
            shape: Shape::Circle { radius },
            position,
            velocity: Vec2::ZERO,
            density: 0.001,
            material: BodyMaterial {
                friction: 0.0,
                friction_air: 0.0,
            },
            restitution: 0.0,
            is_sensor: false,
            is_static: false,
            filter,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_material(mut self, material: BodyMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.is_static = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    /// Pair started overlapping this step
    Begin,
    /// Pair kept overlapping
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyContact {
    pub handle: BodyHandle,
    pub tag: BodyTag,
}

/// Collision event delivered after each physics advance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    pub phase: ContactPhase,
    pub a: BodyContact,
    pub b: BodyContact,
}

/// Physics errors
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    #[error("Body allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Invalid body shape: {0}")]
    InvalidShape(String),
}

/// Narrow interface the simulation uses to drive a physics engine.
///
/// Calls against a handle that no longer exists are ignored.
pub trait PhysicsPort: Send {
    fn spawn_body(&mut self, spec: BodySpec) -> Result<BodyHandle, PhysicsError>;
    /// Returns false if the body did not exist
    fn destroy_body(&mut self, handle: BodyHandle) -> bool;
    fn apply_force(&mut self, handle: BodyHandle, force: Vec2);
    fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec2);
    fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2);
    fn velocity(&self, handle: BodyHandle) -> Option<Vec2>;
    fn set_position(&mut self, handle: BodyHandle, position: Vec2);
    fn position(&self, handle: BodyHandle) -> Option<Vec2>;
    fn set_collision_filter(&mut self, handle: BodyHandle, filter: CollisionFilter);
    fn collision_filter(&self, handle: BodyHandle) -> Option<CollisionFilter>;
    fn set_material(&mut self, handle: BodyHandle, material: BodyMaterial);
    fn material(&self, handle: BodyHandle) -> Option<BodyMaterial>;
    /// Advance by `dt` seconds and report contacts
    fn step(&mut self, dt: f32) -> Vec<CollisionEvent>;
}

#[derive(Debug, Clone)]
struct Body {
    tag: BodyTag,
    radius: f32,
    position: Vec2,
    velocity: Vec2,
    force: Vec2,
    mass: f32,
    material: BodyMaterial,
    restitution: f32,
    is_sensor: bool,
    is_static: bool,
    filter: CollisionFilter,
}

impl Body {
    fn is_solid(&self) -> bool {
        !self.is_sensor
    }
}

/// Built-in circle-body physics world
#[derive(Debug, Default)]
pub struct SimplePhysics {
    bodies: BTreeMap<BodyHandle, Body>,
    next_handle: u64,
    contacts: HashSet<(BodyHandle, BodyHandle)>,
    body_limit: Option<usize>,
    mutations: u64,
}

impl SimplePhysics {
    pub fn new() -> Self {
        Self::default()
    }

    /// World that refuses to allocate more than `limit` bodies
    pub fn with_body_limit(limit: usize) -> Self {
        Self {
            body_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.contains_key(&handle)
    }

    /// Number of mutating calls made so far
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        let body = self.bodies.get_mut(&handle)?;
        self.mutations += 1;
        Some(body)
    }

    fn integrate(&mut self, dt: f32) {
        for body in self.bodies.values_mut() {
            if body.is_static {
                body.force = Vec2::ZERO;
                continue;
            }

            body.velocity += body.force * (dt / body.mass);
            body.force = Vec2::ZERO;

            // Air friction is tuned per 60 Hz step; rescale for other rates
            let damping = (1.0 - body.material.friction_air).clamp(0.0, 1.0).powf(dt * 60.0);
            body.velocity = body.velocity * damping;
            body.position += body.velocity * dt;
        }
    }

    fn detect(&mut self) -> Vec<CollisionEvent> {
        let handles: Vec<BodyHandle> = self.bodies.keys().copied().collect();
        let mut events = Vec::new();
        let mut contacts = HashSet::new();

        for i in 0..handles.len() {
            for j in (i + 1)..handles.len() {
                let (ha, hb) = (handles[i], handles[j]);
                let (Some(a), Some(b)) = (self.bodies.get(&ha), self.bodies.get(&hb)) else {
                    continue;
                };
                if a.is_static && b.is_static {
                    continue;
                }
                if !a.filter.accepts(&b.filter) {
                    continue;
                }
                if !circles_overlap(a.position, a.radius, b.position, b.radius) {
                    continue;
                }

                let phase = if self.contacts.contains(&(ha, hb)) {
                    ContactPhase::Active
                } else {
                    ContactPhase::Begin
                };
                events.push(CollisionEvent {
                    phase,
                    a: BodyContact { handle: ha, tag: a.tag },
                    b: BodyContact { handle: hb, tag: b.tag },
                });
                contacts.insert((ha, hb));

                if a.is_solid() && b.is_solid() {
                    self.separate(ha, hb);
                }
            }
        }

        self.contacts = contacts;
        events
    }

    /// Push two overlapping solid bodies apart
    fn separate(&mut self, ha: BodyHandle, hb: BodyHandle) {
        let (Some(a), Some(b)) = (self.bodies.get(&ha), self.bodies.get(&hb)) else {
            return;
        };
        let (pa, pb) = resolve_overlap(a.position, a.radius, a.is_static, b.position, b.radius, b.is_static);
        let restitution = a.restitution.max(b.restitution);
        let normal = (b.position - a.position).normalize_or_zero();

        for (handle, position, sign) in [(ha, pa, -1.0_f32), (hb, pb, 1.0_f32)] {
            if let Some(body) = self.bodies.get_mut(&handle) {
                if body.is_static {
                    continue;
                }
                body.position = position;
                // Cancel the approaching component of velocity
                let along = body.velocity.x * normal.x * sign + body.velocity.y * normal.y * sign;
                if along < 0.0 {
                    let n = normal * sign;
                    body.velocity = body.velocity - n * (along * (1.0 + restitution));
                }
            }
        }
    }
}

fn circles_overlap(a: Vec2, ra: f32, b: Vec2, rb: f32) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let combined = ra + rb;
    dx * dx + dy * dy <= combined * combined
}

/// Positions after pushing two overlapping circles apart
fn resolve_overlap(
    a: Vec2,
    ra: f32,
    a_static: bool,
    b: Vec2,
    rb: f32,
    b_static: bool,
) -> (Vec2, Vec2) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let dist = (dx * dx + dy * dy).sqrt();

    if dist < 0.001 {
        // Same position, push apart arbitrarily
        return (Vec2::new(a.x - ra, a.y), Vec2::new(b.x + rb, b.y));
    }

    let overlap = ra + rb - dist;
    if overlap <= 0.0 {
        return (a, b);
    }

    let n = Vec2::new(dx / dist, dy / dist);
    let (push_a, push_b) = match (a_static, b_static) {
        (true, false) => (0.0, overlap + 0.1),
        (false, true) => (overlap + 0.1, 0.0),
        _ => (overlap / 2.0 + 0.1, overlap / 2.0 + 0.1),
    };

    (a - n * push_a, b + n * push_b)
}

impl PhysicsPort for SimplePhysics {
    fn spawn_body(&mut self, spec: BodySpec) -> Result<BodyHandle, PhysicsError> {
        if let Some(limit) = self.body_limit {
            if self.bodies.len() >= limit {
                return Err(PhysicsError::AllocationFailed(format!(
                    "body limit {} reached",
                    limit
                )));
            }
        }

        let radius = spec.shape.bounding_radius();
        if !(radius > 0.0) {
            return Err(PhysicsError::InvalidShape(format!("radius {}", radius)));
        }

        let area = std::f32::consts::PI * radius * radius;
        let mass = (spec.density * area).max(f32::EPSILON);

        self.next_handle += 1;
        let handle = BodyHandle(self.next_handle);
        self.bodies.insert(
            handle,
            Body {
                tag: spec.tag,
                radius,
                position: spec.position,
                velocity: if spec.is_static { Vec2::ZERO } else { spec.velocity },
                force: Vec2::ZERO,
                mass,
                material: spec.material,
                restitution: spec.restitution,
                is_sensor: spec.is_sensor,
                is_static: spec.is_static,
                filter: spec.filter,
            },
        );
        self.mutations += 1;
        Ok(handle)
    }

    fn destroy_body(&mut self, handle: BodyHandle) -> bool {
        let removed = self.bodies.remove(&handle).is_some();
        if removed {
            self.mutations += 1;
            self.contacts.retain(|(a, b)| *a != handle && *b != handle);
        }
        removed
    }

    fn apply_force(&mut self, handle: BodyHandle, force: Vec2) {
        if let Some(body) = self.body_mut(handle) {
            body.force += force;
        }
    }

    fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec2) {
        if let Some(body) = self.body_mut(handle) {
            if !body.is_static {
                body.velocity += impulse * (1.0 / body.mass);
            }
        }
    }

    fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2) {
        if let Some(body) = self.body_mut(handle) {
            body.velocity = velocity;
        }
    }

    fn velocity(&self, handle: BodyHandle) -> Option<Vec2> {
        self.bodies.get(&handle).map(|b| b.velocity)
    }

    fn set_position(&mut self, handle: BodyHandle, position: Vec2) {
        if let Some(body) = self.body_mut(handle) {
            body.position = position;
        }
    }

    fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        self.bodies.get(&handle).map(|b| b.position)
    }

    fn set_collision_filter(&mut self, handle: BodyHandle, filter: CollisionFilter) {
        if let Some(body) = self.body_mut(handle) {
            body.filter = filter;
        }
    }

    fn collision_filter(&self, handle: BodyHandle) -> Option<CollisionFilter> {
        self.bodies.get(&handle).map(|b| b.filter)
    }

    fn set_material(&mut self, handle: BodyHandle, material: BodyMaterial) {
        if let Some(body) = self.body_mut(handle) {
            body.material = material;
        }
    }

    fn material(&self, handle: BodyHandle) -> Option<BodyMaterial> {
        self.bodies.get(&handle).map(|b| b.material)
    }

    fn step(&mut self, dt: f32) -> Vec<CollisionEvent> {
        self.integrate(dt);
        self.detect()
    }
}
