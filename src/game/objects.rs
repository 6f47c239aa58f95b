//! Ability object pool: projectiles, traps, portals and explosion markers
//!
//! The pool is the only owner of ability objects and of their physics bodies.
//! Every removal path (expiry, consumption, eviction, owner leaving) goes
//! through [`AbilityObjectPool::remove`], which destroys the body and unlinks
//! portal partners in the same call.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, trace};
use uuid::Uuid;

use super::physics::{
    BodyHandle, BodyMaterial, BodyRole, BodySpec, BodyTag, CollisionFilter, PhysicsError, PhysicsPort, Vec2,
};

/// Portals kept per owner; a third evicts the oldest
pub const MAX_PORTALS_PER_OWNER: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Cannonball,
    PortalShot,
    ChargedShot,
    Trap,
    Portal,
    /// Visual marker only, never has a body
    Explosion,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Cannonball => "cannonball",
            ObjectKind::PortalShot => "portal_shot",
            ObjectKind::ChargedShot => "charged_shot",
            ObjectKind::Trap => "trap",
            ObjectKind::Portal => "portal",
            ObjectKind::Explosion => "explosion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalColor {
    Blue,
    Orange,
}

impl PortalColor {
    pub fn opposite(self) -> Self {
        match self {
            PortalColor::Blue => PortalColor::Orange,
            PortalColor::Orange => PortalColor::Blue,
        }
    }
}

/// Portal to open where a portal shot lands
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalSpec {
    pub radius: f32,
    pub lifetime_ms: u64,
    pub teleport_cooldown_ms: u64,
}

/// Kind-specific data carried by an object
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectPayload {
    /// Cannonballs and traps
    Damage { damage: f32, hit_cooldown_ms: u64 },
    PortalShot { portal: PortalSpec },
    Portal {
        color: PortalColor,
        linked_portal_id: Option<Uuid>,
        teleport_cooldown_ms: u64,
    },
    /// Charged shot, scaled at fire time
    Explosive {
        damage: f32,
        radius: f32,
        force: f32,
        visual_ms: u64,
    },
    Explosion { radius: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbilityObject {
    pub id: Uuid,
    pub kind: ObjectKind,
    pub owner_id: Uuid,
    /// Creation order, used for oldest-first eviction
    pub seq: u64,
    pub created_at: u64,
    pub expires_at: u64,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub body: Option<BodyHandle>,
    pub payload: ObjectPayload,
}

impl AbilityObject {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn linked_portal_id(&self) -> Option<Uuid> {
        match self.payload {
            ObjectPayload::Portal { linked_portal_id, .. } => linked_portal_id,
            _ => None,
        }
    }

    pub fn portal_color(&self) -> Option<PortalColor> {
        match self.payload {
            ObjectPayload::Portal { color, .. } => Some(color),
            _ => None,
        }
    }

    fn set_link(&mut self, partner: Option<Uuid>) {
        if let ObjectPayload::Portal { linked_portal_id, .. } = &mut self.payload {
            *linked_portal_id = partner;
        }
    }
}

/// Everything needed to create one object
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub kind: ObjectKind,
    pub owner_id: Uuid,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub lifetime_ms: u64,
    /// Oldest objects of this owner and kind are evicted to stay under the cap
    pub max_per_owner: Option<usize>,
    pub payload: ObjectPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Expired,
    Consumed,
    Evicted,
    OwnerLeft,
}

/// Removal record, drained by the simulation into game events
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedObject {
    pub id: Uuid,
    pub kind: ObjectKind,
    pub owner_id: Uuid,
    pub position: Vec2,
    pub reason: RemovalReason,
}

/// Pool errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Object body allocation failed: {0}")]
    Physics(#[from] PhysicsError),
}

#[derive(Debug, Default)]
pub struct AbilityObjectPool {
    objects: HashMap<Uuid, AbilityObject>,
    next_seq: u64,
    removed: Vec<RemovedObject>,
}

impl AbilityObjectPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&AbilityObject> {
        self.objects.get(&id)
    }

    /// All objects, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &AbilityObject> {
        let mut all: Vec<_> = self.objects.values().collect();
        all.sort_by_key(|o| o.seq);
        all.into_iter()
    }

    /// Objects of one owner and kind, oldest first
    pub fn find_by_owner_and_kind(&self, owner_id: Uuid, kind: ObjectKind) -> Vec<&AbilityObject> {
        let mut found: Vec<_> = self
            .objects
            .values()
            .filter(|o| o.owner_id == owner_id && o.kind == kind)
            .collect();
        found.sort_by_key(|o| o.seq);
        found
    }

    /// The live partner of a portal
    pub fn find_linked(&self, portal_id: Uuid) -> Option<&AbilityObject> {
        self.objects
            .get(&portal_id)
            .and_then(|p| p.linked_portal_id())
            .and_then(|partner| self.objects.get(&partner))
    }

    /// Create an object and its body, evicting the owner's oldest of the same
    /// kind first if the cap is reached.
    pub fn spawn(
        &mut self,
        physics: &mut dyn PhysicsPort,
        request: SpawnRequest,
        now: u64,
    ) -> Result<&AbilityObject, PoolError> {
        if let Some(cap) = request.max_per_owner {
            self.make_room(physics, request.owner_id, request.kind, cap);
        }

        let id = Uuid::new_v4();
        let body = match body_spec(id, &request) {
            Some(spec) => Some(physics.spawn_body(spec)?),
            None => None,
        };

        self.next_seq += 1;
        let object = AbilityObject {
            id,
            kind: request.kind,
            owner_id: request.owner_id,
            seq: self.next_seq,
            created_at: now,
            expires_at: now + request.lifetime_ms,
            position: request.position,
            velocity: request.velocity,
            radius: request.radius,
            body,
            payload: request.payload,
        };
        trace!(object_id = %id, kind = object.kind.as_str(), owner_id = %object.owner_id, "Spawned object");
        Ok(self.objects.entry(id).or_insert(object))
    }

    /// Open a portal for `owner_id`, linking it with the owner's surviving one.
    ///
    /// The first portal is blue; each new one takes the opposite color of the
    /// portal it links to.
    pub fn spawn_portal(
        &mut self,
        physics: &mut dyn PhysicsPort,
        owner_id: Uuid,
        position: Vec2,
        now: u64,
        spec: PortalSpec,
    ) -> Result<&AbilityObject, PoolError> {
        self.make_room(physics, owner_id, ObjectKind::Portal, MAX_PORTALS_PER_OWNER);

        let survivor = self
            .find_by_owner_and_kind(owner_id, ObjectKind::Portal)
            .last()
            .map(|p| (p.id, p.portal_color().unwrap_or(PortalColor::Blue)));
        let color = survivor.map_or(PortalColor::Blue, |(_, c)| c.opposite());

        let request = SpawnRequest {
            kind: ObjectKind::Portal,
            owner_id,
            position,
            velocity: Vec2::ZERO,
            radius: spec.radius,
            lifetime_ms: spec.lifetime_ms,
            max_per_owner: None,
            payload: ObjectPayload::Portal {
                color,
                linked_portal_id: survivor.map(|(id, _)| id),
                teleport_cooldown_ms: spec.teleport_cooldown_ms,
            },
        };
        let id = self.spawn(physics, request, now)?.id;

        if let Some((partner_id, _)) = survivor {
            if let Some(partner) = self.objects.get_mut(&partner_id) {
                partner.set_link(Some(id));
            }
            debug!(owner_id = %owner_id, portal_id = %id, partner_id = %partner_id, "Portals linked");
        }
        self.objects.get(&id).ok_or_else(|| {
            PoolError::Physics(PhysicsError::AllocationFailed("portal vanished after spawn".to_string()))
        })
    }

    /// Remove one object; a no-op for unknown ids
    pub fn remove(
        &mut self,
        physics: &mut dyn PhysicsPort,
        id: Uuid,
        reason: RemovalReason,
    ) -> Option<AbilityObject> {
        let mut object = self.objects.remove(&id)?;

        if let Some(handle) = object.body.take() {
            if let Some(position) = physics.position(handle) {
                object.position = position;
            }
            physics.destroy_body(handle);
        }

        if let Some(partner_id) = object.linked_portal_id() {
            if let Some(partner) = self.objects.get_mut(&partner_id) {
                partner.set_link(None);
            }
        }

        trace!(object_id = %id, kind = object.kind.as_str(), reason = ?reason, "Removed object");
        self.removed.push(RemovedObject {
            id,
            kind: object.kind,
            owner_id: object.owner_id,
            position: object.position,
            reason,
        });
        Some(object)
    }

    /// Remove every object whose lifetime has passed
    pub fn sweep_expired(&mut self, physics: &mut dyn PhysicsPort, now: u64) -> usize {
        let mut expired: Vec<_> = self
            .objects
            .values()
            .filter(|o| o.is_expired(now))
            .map(|o| (o.seq, o.id))
            .collect();
        expired.sort_unstable();

        for (_, id) in &expired {
            self.remove(physics, *id, RemovalReason::Expired);
        }
        expired.len()
    }

    /// Purge everything an actor owns
    pub fn remove_owned_by(&mut self, physics: &mut dyn PhysicsPort, owner_id: Uuid) -> usize {
        let mut owned: Vec<_> = self
            .objects
            .values()
            .filter(|o| o.owner_id == owner_id)
            .map(|o| (o.seq, o.id))
            .collect();
        owned.sort_unstable();

        for (_, id) in &owned {
            self.remove(physics, *id, RemovalReason::OwnerLeft);
        }
        owned.len()
    }

    /// Copy body positions and velocities back into their objects
    pub fn sync_positions(&mut self, physics: &dyn PhysicsPort) {
        for object in self.objects.values_mut() {
            let Some(handle) = object.body else { continue };
            if let Some(position) = physics.position(handle) {
                object.position = position;
            }
            if let Some(velocity) = physics.velocity(handle) {
                object.velocity = velocity;
            }
        }
    }

    /// Removal records since the last drain, in removal order
    pub fn drain_removed(&mut self) -> Vec<RemovedObject> {
        std::mem::take(&mut self.removed)
    }

    fn make_room(&mut self, physics: &mut dyn PhysicsPort, owner_id: Uuid, kind: ObjectKind, cap: usize) {
        let cap = cap.max(1);
        loop {
            let owned = self.find_by_owner_and_kind(owner_id, kind);
            if owned.len() < cap {
                break;
            }
            let Some(oldest) = owned.first().map(|o| o.id) else {
                break;
            };
            debug!(owner_id = %owner_id, kind = kind.as_str(), object_id = %oldest, "Evicting oldest object");
            self.remove(physics, oldest, RemovalReason::Evicted);
        }
    }
}

/// Body for an object kind; `None` for bodiless markers
fn body_spec(id: Uuid, request: &SpawnRequest) -> Option<BodySpec> {
    let tag = BodyTag {
        role: BodyRole::AbilityObject,
        entity_id: id,
        owner_id: Some(request.owner_id),
    };
    let frictionless = BodyMaterial {
        friction: 0.0,
        friction_air: 0.0,
    };

    let spec = match request.kind {
        ObjectKind::Cannonball => {
            BodySpec::circle(tag, request.position, request.radius, CollisionFilter::projectile())
                .with_velocity(request.velocity)
                .with_material(frictionless)
                .with_restitution(0.8)
                .with_density(0.004)
        }
        ObjectKind::PortalShot | ObjectKind::ChargedShot => {
            BodySpec::circle(tag, request.position, request.radius, CollisionFilter::projectile())
                .with_velocity(request.velocity)
                .with_material(frictionless)
                .sensor()
        }
        ObjectKind::Trap => BodySpec::circle(tag, request.position, request.radius, CollisionFilter::trap())
            .sensor()
            .fixed(),
        ObjectKind::Portal => BodySpec::circle(tag, request.position, request.radius, CollisionFilter::portal())
            .sensor()
            .fixed(),
        ObjectKind::Explosion => return None,
    };
    Some(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::SimplePhysics;

    fn request(kind: ObjectKind, owner_id: Uuid, cap: Option<usize>) -> SpawnRequest {
        SpawnRequest {
            kind,
            owner_id,
            position: Vec2::ZERO,
            velocity: Vec2::new(10.0, 0.0),
            radius: 5.0,
            lifetime_ms: 1000,
            max_per_owner: cap,
            payload: ObjectPayload::Damage {
                damage: 1.0,
                hit_cooldown_ms: 1000,
            },
        }
    }

    fn portal_spec() -> PortalSpec {
        PortalSpec {
            radius: 20.0,
            lifetime_ms: 30_000,
            teleport_cooldown_ms: 500,
        }
    }

    #[test]
    fn cap_evicts_oldest_of_same_owner_and_kind_only() {
        let mut physics = SimplePhysics::new();
        let mut pool = AbilityObjectPool::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        let foreign = pool.spawn(&mut physics, request(ObjectKind::Cannonball, other, Some(2)), 0).unwrap().id;
        let first = pool.spawn(&mut physics, request(ObjectKind::Cannonball, owner, Some(2)), 0).unwrap().id;
        let second = pool.spawn(&mut physics, request(ObjectKind::Cannonball, owner, Some(2)), 1).unwrap().id;
        let third = pool.spawn(&mut physics, request(ObjectKind::Cannonball, owner, Some(2)), 2).unwrap().id;

        assert!(pool.get(first).is_none());
        assert!(pool.get(foreign).is_some());
        let ids: Vec<_> = pool
            .find_by_owner_and_kind(owner, ObjectKind::Cannonball)
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![second, third]);
        assert_eq!(physics.body_count(), 3);

        let removed = pool.drain_removed();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, first);
        assert_eq!(removed[0].reason, RemovalReason::Evicted);
    }

    #[test]
    fn portals_alternate_color_and_link_both_ways() {
        let mut physics = SimplePhysics::new();
        let mut pool = AbilityObjectPool::new();
        let owner = Uuid::new_v4();

        let a = pool.spawn_portal(&mut physics, owner, Vec2::ZERO, 0, portal_spec()).unwrap().id;
        assert_eq!(pool.get(a).unwrap().portal_color(), Some(PortalColor::Blue));
        assert_eq!(pool.get(a).unwrap().linked_portal_id(), None);

        let b = pool
            .spawn_portal(&mut physics, owner, Vec2::new(100.0, 0.0), 10, portal_spec())
            .unwrap()
            .id;
        assert_eq!(pool.get(b).unwrap().portal_color(), Some(PortalColor::Orange));
        assert_eq!(pool.find_linked(a).map(|p| p.id), Some(b));
        assert_eq!(pool.find_linked(b).map(|p| p.id), Some(a));
    }

    #[test]
    fn third_portal_evicts_oldest_and_relinks() {
        let mut physics = SimplePhysics::new();
        let mut pool = AbilityObjectPool::new();
        let owner = Uuid::new_v4();

        let a = pool.spawn_portal(&mut physics, owner, Vec2::ZERO, 0, portal_spec()).unwrap().id;
        let b = pool.spawn_portal(&mut physics, owner, Vec2::new(50.0, 0.0), 1, portal_spec()).unwrap().id;
        let c = pool.spawn_portal(&mut physics, owner, Vec2::new(90.0, 0.0), 2, portal_spec()).unwrap().id;

        assert!(pool.get(a).is_none());
        assert_eq!(pool.find_by_owner_and_kind(owner, ObjectKind::Portal).len(), 2);
        // b is orange, so c flips back to blue
        assert_eq!(pool.get(c).unwrap().portal_color(), Some(PortalColor::Blue));
        assert_eq!(pool.find_linked(b).map(|p| p.id), Some(c));
        assert_eq!(pool.find_linked(c).map(|p| p.id), Some(b));
    }

    #[test]
    fn removing_a_portal_unlinks_its_partner() {
        let mut physics = SimplePhysics::new();
        let mut pool = AbilityObjectPool::new();
        let owner = Uuid::new_v4();
        let a = pool.spawn_portal(&mut physics, owner, Vec2::ZERO, 0, portal_spec()).unwrap().id;
        let b = pool.spawn_portal(&mut physics, owner, Vec2::new(50.0, 0.0), 0, portal_spec()).unwrap().id;

        assert!(pool.remove(&mut physics, a, RemovalReason::Consumed).is_some());
        assert_eq!(pool.get(b).unwrap().linked_portal_id(), None);
        assert!(pool.find_linked(b).is_none());
        // Second removal is a no-op
        assert!(pool.remove(&mut physics, a, RemovalReason::Consumed).is_none());
        assert_eq!(pool.drain_removed().len(), 1);
    }

    #[test]
    fn sweep_destroys_expired_bodies() {
        let mut physics = SimplePhysics::new();
        let mut pool = AbilityObjectPool::new();
        let owner = Uuid::new_v4();
        let handle = {
            let ball = pool.spawn(&mut physics, request(ObjectKind::Cannonball, owner, None), 0).unwrap();
            ball.body.unwrap()
        };
        assert!(physics.contains(handle));

        assert_eq!(pool.sweep_expired(&mut physics, 999), 0);
        assert_eq!(pool.sweep_expired(&mut physics, 1000), 1);
        assert!(pool.is_empty());
        assert!(!physics.contains(handle));
    }

    #[test]
    fn explosion_markers_have_no_body() {
        let mut physics = SimplePhysics::new();
        let mut pool = AbilityObjectPool::new();
        let mut req = request(ObjectKind::Explosion, Uuid::new_v4(), None);
        req.payload = ObjectPayload::Explosion { radius: 40.0 };
        let marker = pool.spawn(&mut physics, req, 0).unwrap();
        assert!(marker.body.is_none());
        assert_eq!(physics.body_count(), 0);
    }

    #[test]
    fn owner_leaving_purges_only_their_objects() {
        let mut physics = SimplePhysics::new();
        let mut pool = AbilityObjectPool::new();
        let leaver = Uuid::new_v4();
        let stayer = Uuid::new_v4();
        pool.spawn(&mut physics, request(ObjectKind::Trap, leaver, None), 0).unwrap();
        pool.spawn_portal(&mut physics, leaver, Vec2::ZERO, 0, portal_spec()).unwrap();
        pool.spawn(&mut physics, request(ObjectKind::Trap, stayer, None), 0).unwrap();

        assert_eq!(pool.remove_owned_by(&mut physics, leaver), 2);
        assert_eq!(pool.len(), 1);
        assert_eq!(physics.body_count(), 1);
        assert!(pool
            .drain_removed()
            .iter()
            .all(|r| r.reason == RemovalReason::OwnerLeft));
    }

    #[test]
    fn positions_follow_bodies() {
        let mut physics = SimplePhysics::new();
        let mut pool = AbilityObjectPool::new();
        let id = pool
            .spawn(&mut physics, request(ObjectKind::Cannonball, Uuid::new_v4(), None), 0)
            .unwrap()
            .id;
        physics.step(0.1);
        pool.sync_positions(&physics);
        assert!(pool.get(id).unwrap().position.x > 0.0);
    }

    #[test]
    fn failed_allocation_leaves_pool_untouched() {
        let mut physics = SimplePhysics::with_body_limit(0);
        let mut pool = AbilityObjectPool::new();
        let result = pool.spawn(&mut physics, request(ObjectKind::Trap, Uuid::new_v4(), Some(3)), 0);
        assert!(matches!(result, Err(PoolError::Physics(_))));
        assert!(pool.is_empty());
    }
}
