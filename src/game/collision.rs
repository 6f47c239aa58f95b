//! Collision resolution - turns object contacts into damage, portals,
//! teleports and explosions

use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::GameEvent;

use super::actor::Car;
use super::objects::{AbilityObjectPool, ObjectKind, ObjectPayload, RemovalReason, SpawnRequest};
use super::physics::{BodyContact, BodyRole, CollisionEvent, ContactPhase, PhysicsPort, Vec2};

/// Everything a rule may touch while resolving one contact
pub struct CollisionContext<'a> {
    pub now: u64,
    pub physics: &'a mut dyn PhysicsPort,
    pub objects: &'a mut AbilityObjectPool,
    pub cars: &'a mut BTreeMap<Uuid, Car>,
}

/// What the object touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Contact {
    Car(Uuid),
    Static,
}

pub struct CollisionResolver;

impl CollisionResolver {
    /// Apply the per-kind rule for one physics contact
    pub fn resolve(event: &CollisionEvent, ctx: &mut CollisionContext<'_>) -> Vec<GameEvent> {
        let Some((object_id, other)) = split_contact(event) else {
            return Vec::new();
        };
        let Some(kind) = ctx.objects.get(object_id).map(|o| o.kind) else {
            // Already consumed earlier in this step
            return Vec::new();
        };
        let contact = match other.tag.role {
            BodyRole::Car => Contact::Car(other.tag.entity_id),
            BodyRole::Static => Contact::Static,
            BodyRole::AbilityObject => return Vec::new(),
        };
        let begin = event.phase == ContactPhase::Begin;

        match (kind, contact) {
            (ObjectKind::Trap, Contact::Car(car_id)) => Self::trap_hit(ctx, object_id, car_id),
            (ObjectKind::Cannonball, Contact::Car(car_id)) => Self::cannon_hit(ctx, object_id, car_id),
            (ObjectKind::Portal, Contact::Car(car_id)) if begin => Self::teleport(ctx, object_id, car_id),
            (ObjectKind::PortalShot, contact) if begin => {
                if is_owner_contact(ctx, object_id, contact) {
                    return Vec::new();
                }
                Self::open_portal(ctx, object_id)
            }
            (ObjectKind::ChargedShot, contact) if begin => {
                if is_owner_contact(ctx, object_id, contact) {
                    return Vec::new();
                }
                Self::explode(ctx, object_id)
            }
            _ => Vec::new(),
        }
    }

    /// Trap damage, throttled per trap per target
    pub fn trap_hit(ctx: &mut CollisionContext<'_>, trap_id: Uuid, car_id: Uuid) -> Vec<GameEvent> {
        Self::damage_hit(ctx, trap_id, car_id)
    }

    /// Cannonball damage; the ball keeps flying until it expires
    pub fn cannon_hit(ctx: &mut CollisionContext<'_>, ball_id: Uuid, car_id: Uuid) -> Vec<GameEvent> {
        Self::damage_hit(ctx, ball_id, car_id)
    }

    fn damage_hit(ctx: &mut CollisionContext<'_>, object_id: Uuid, car_id: Uuid) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let Some(object) = ctx.objects.get(object_id) else {
            return events;
        };
        let ObjectPayload::Damage { damage, hit_cooldown_ms } = object.payload else {
            return events;
        };
        let (kind, owner_id) = (object.kind, object.owner_id);
        if owner_id == car_id {
            return events;
        }

        let now = ctx.now;
        let Some(target) = ctx.cars.get_mut(&car_id) else {
            return events;
        };
        if !target.alive || target.is_untouchable(now) {
            return events;
        }
        if !target.try_register_hit(kind, object_id, now, hit_cooldown_ms) {
            return events;
        }
        let at = target.position;

        apply_damage(ctx, owner_id, car_id, kind, object_id, damage, at, &mut events);
        events
    }

    /// Replace a portal shot with a portal at its impact point
    pub fn open_portal(ctx: &mut CollisionContext<'_>, shot_id: Uuid) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let Some(shot) = ctx.objects.remove(ctx.physics, shot_id, RemovalReason::Consumed) else {
            return events;
        };
        let ObjectPayload::PortalShot { portal } = shot.payload else {
            return events;
        };

        match ctx
            .objects
            .spawn_portal(ctx.physics, shot.owner_id, shot.position, ctx.now, portal)
        {
            Ok(opened) => {
                debug!(owner_id = %shot.owner_id, portal_id = %opened.id, "Portal opened");
                if let Some(color) = opened.portal_color() {
                    events.push(GameEvent::PortalOpened {
                        owner_id: opened.owner_id,
                        portal_id: opened.id,
                        color,
                        linked_portal_id: opened.linked_portal_id(),
                        x: opened.position.x,
                        y: opened.position.y,
                    });
                }
            }
            Err(e) => {
                warn!(owner_id = %shot.owner_id, error = %e, "Portal spawn failed");
            }
        }
        events
    }

    /// Move a car to the partner of the portal it entered.
    ///
    /// Velocity is left untouched. Both portals are stamped so the car does
    /// not bounce straight back.
    pub fn teleport(ctx: &mut CollisionContext<'_>, portal_id: Uuid, car_id: Uuid) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let Some(portal) = ctx.objects.get(portal_id) else {
            return events;
        };
        let ObjectPayload::Portal { teleport_cooldown_ms, .. } = portal.payload else {
            return events;
        };
        let Some(destination) = ctx.objects.find_linked(portal_id) else {
            // Unlinked or dangling partner: teleport unavailable
            return events;
        };
        let (destination_id, destination_pos) = (destination.id, destination.position);

        let now = ctx.now;
        let Some(car) = ctx.cars.get_mut(&car_id) else {
            return events;
        };
        if !car.alive || car.is_untouchable(now) {
            return events;
        }
        if !car.portal_ready(portal_id, now, teleport_cooldown_ms) {
            return events;
        }

        ctx.physics.set_position(car.body, destination_pos);
        car.position = destination_pos;
        car.stamp_portal(portal_id, now);
        car.stamp_portal(destination_id, now);

        debug!(actor_id = %car_id, from = %portal_id, to = %destination_id, "Teleported");
        events.push(GameEvent::Teleport {
            actor_id: car_id,
            from_portal_id: portal_id,
            to_portal_id: destination_id,
            x: destination_pos.x,
            y: destination_pos.y,
        });
        events
    }

    /// Detonate a charged shot: radial damage (never to the owner) and
    /// knockback (owner included), both scaled by `1 - distance / radius`.
    pub fn explode(ctx: &mut CollisionContext<'_>, shot_id: Uuid) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let Some(shot) = ctx.objects.remove(ctx.physics, shot_id, RemovalReason::Consumed) else {
            return events;
        };
        let ObjectPayload::Explosive {
            damage,
            radius,
            force,
            visual_ms,
        } = shot.payload
        else {
            return events;
        };
        let center = shot.position;
        let now = ctx.now;

        events.push(GameEvent::Explosion {
            owner_id: shot.owner_id,
            object_id: shot.id,
            x: center.x,
            y: center.y,
            radius,
            damage,
            force,
        });

        let in_range: Vec<(Uuid, f32, Vec2)> = ctx
            .cars
            .values()
            .filter(|car| car.alive && !car.is_untouchable(now))
            .filter_map(|car| {
                let distance = car.position.distance(center);
                (distance < radius).then(|| {
                    (
                        car.id,
                        1.0 - distance / radius,
                        (car.position - center).normalize_or_zero(),
                    )
                })
            })
            .collect();

        for (car_id, falloff, direction) in in_range {
            if let Some(car) = ctx.cars.get(&car_id) {
                ctx.physics.apply_impulse(car.body, direction * (force * falloff));
            }
            if car_id != shot.owner_id {
                apply_damage(
                    ctx,
                    shot.owner_id,
                    car_id,
                    ObjectKind::ChargedShot,
                    shot.id,
                    damage * falloff,
                    center,
                    &mut events,
                );
            }
        }

        let marker = SpawnRequest {
            kind: ObjectKind::Explosion,
            owner_id: shot.owner_id,
            position: center,
            velocity: Vec2::ZERO,
            radius,
            lifetime_ms: visual_ms,
            max_per_owner: None,
            payload: ObjectPayload::Explosion { radius },
        };
        if let Err(e) = ctx.objects.spawn(ctx.physics, marker, now) {
            warn!(error = %e, "Explosion marker spawn failed");
        }

        events
    }
}

/// Split a contact into (ability object id, other body)
fn split_contact(event: &CollisionEvent) -> Option<(Uuid, BodyContact)> {
    if event.a.tag.role == BodyRole::AbilityObject {
        Some((event.a.tag.entity_id, event.b))
    } else if event.b.tag.role == BodyRole::AbilityObject {
        Some((event.b.tag.entity_id, event.a))
    } else {
        None
    }
}

/// Projectiles pass through their own owner's car
fn is_owner_contact(ctx: &CollisionContext<'_>, object_id: Uuid, contact: Contact) -> bool {
    match contact {
        Contact::Car(car_id) => ctx.objects.get(object_id).map_or(false, |o| o.owner_id == car_id),
        Contact::Static => false,
    }
}

/// Damage a car, update attacker stats and report the hit (and kill)
#[allow(clippy::too_many_arguments)]
fn apply_damage(
    ctx: &mut CollisionContext<'_>,
    attacker_id: Uuid,
    target_id: Uuid,
    source: ObjectKind,
    object_id: Uuid,
    damage: f32,
    at: Vec2,
    events: &mut Vec<GameEvent>,
) {
    if damage <= 0.0 {
        return;
    }
    let Some(target) = ctx.cars.get_mut(&target_id) else {
        return;
    };
    let killed = target.take_damage(attacker_id, source, damage, ctx.now);
    let killer_id = target.last_attacker();

    events.push(GameEvent::Hit {
        attacker_id,
        target_id,
        source,
        object_id,
        damage,
        x: at.x,
        y: at.y,
    });

    if let Some(attacker) = ctx.cars.get_mut(&attacker_id) {
        attacker.damage_dealt += damage;
    }

    if killed {
        if let Some(killer) = killer_id.and_then(|id| ctx.cars.get_mut(&id)) {
            killer.kills += 1;
        }
        info!(victim_id = %target_id, killer_id = ?killer_id, source = source.as_str(), "Car destroyed");
        events.push(GameEvent::Kill {
            killer_id,
            victim_id: target_id,
            source: Some(source),
        });
    }
}
