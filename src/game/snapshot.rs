//! Snapshot building

use crate::protocol::{CarSnapshot, GameEvent, ObjectSnapshot, ServerMsg};

use super::actor::Car;
use super::objects::AbilityObject;
use super::simulation::Simulation;

/// Turns simulation state into wire snapshots
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    /// Events accumulated since the last snapshot
    pending_events: Vec<GameEvent>,
    /// Snapshots built so far
    sent: u64,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots_sent(&self) -> u64 {
        self.sent
    }

    pub fn push_events(&mut self, events: Vec<GameEvent>) {
        self.pending_events.extend(events);
    }

    /// Full snapshot of `sim`; takes the pending events with it
    pub fn build(&mut self, sim: &Simulation) -> ServerMsg {
        let now = sim.now();
        let cars = sim
            .cars()
            .values()
            .map(|car| car_snapshot(sim, car, now))
            .collect();
        let objects = sim.objects().iter().map(object_snapshot).collect();
        self.sent += 1;

        ServerMsg::Snapshot {
            tick: sim.tick(),
            server_time: now,
            cars,
            objects,
            events: std::mem::take(&mut self.pending_events),
        }
    }
}

fn car_snapshot(sim: &Simulation, car: &Car, now: u64) -> CarSnapshot {
    CarSnapshot {
        actor_id: car.id,
        x: car.position.x,
        y: car.position.y,
        rotation: car.rotation,
        vel_x: car.velocity.x,
        vel_y: car.velocity.y,
        health: car.health,
        max_health: car.stats.max_health,
        alive: car.alive,
        is_ghost: car.status.is_ghost(),
        is_anchored: car.status.is_anchored(),
        is_focused: car.status.is_focused(),
        invulnerable: car.is_invulnerable(now),
        last_input_seq: car.input.seq,
        abilities: sim.loadout(car.id).map(|e| e.client_data(car, now)).collect(),
        kills: car.kills,
        deaths: car.deaths,
    }
}

fn object_snapshot(object: &AbilityObject) -> ObjectSnapshot {
    ObjectSnapshot {
        object_id: object.id,
        kind: object.kind,
        owner_id: object.owner_id,
        x: object.position.x,
        y: object.position.y,
        radius: object.radius,
        expires_at: object.expires_at,
        linked_portal_id: object.linked_portal_id(),
        color: object.portal_color(),
    }
}
