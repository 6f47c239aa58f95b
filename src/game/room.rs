//! Room task: owns one simulation and runs its fixed-step loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::protocol::{ClientMsg, ServerMsg};
use crate::util::rate_limit::{PlayerRateLimiter, INPUT_RATE_LIMIT};
use crate::util::time::{step_duration, unix_millis, FixedTimestep, Timer};

use super::abilities::{AbilityKind, AbilityRegistry};
use super::physics::PhysicsPort;
use super::simulation::{ArenaLayout, Simulation};
use super::snapshot::SnapshotBuilder;

/// Longest display name kept on join
const MAX_DISPLAY_NAME_LEN: usize = 32;

/// Player message queued for the room task
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub actor_id: Uuid,
    pub msg: ClientMsg,
    pub received_at: u64,
}

/// Message published by a room; `target` limits delivery to one actor
#[derive(Debug, Clone)]
pub struct Outbound {
    pub target: Option<Uuid>,
    pub msg: ServerMsg,
}

impl Outbound {
    pub fn all(msg: ServerMsg) -> Self {
        Self { target: None, msg }
    }

    pub fn to(actor_id: Uuid, msg: ServerMsg) -> Self {
        Self {
            target: Some(actor_id),
            msg,
        }
    }

    pub fn is_for(&self, actor_id: Uuid) -> bool {
        self.target.map_or(true, |t| t == actor_id)
    }
}

/// Room submission errors
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Input rate limit exceeded")]
    RateLimited,

    #[error("Actor {0} has not joined this room")]
    NotJoined(Uuid),

    #[error("Room {0} is closed")]
    Closed(Uuid),
}

/// Per-room tuning
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub simulation_tps: u32,
    pub snapshot_tps: u32,
    pub max_players: usize,
    pub seed: u64,
    pub input_rate: u32,
}

impl RoomSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            simulation_tps: config.simulation_tps,
            snapshot_tps: config.snapshot_tps,
            max_players: config.max_players_per_room,
            seed: config.room_seed.unwrap_or_else(rand::random),
            input_rate: INPUT_RATE_LIMIT,
        }
    }
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub outbound_tx: broadcast::Sender<Outbound>,
    pub player_count: Arc<AtomicUsize>,
    limiters: Arc<DashMap<Uuid, PlayerRateLimiter>>,
}

impl RoomHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.outbound_tx.subscribe()
    }

    /// Queue a message for the next frame. Joins and leaves always go through.
    /// Everything else needs a joined actor and is rate limited per actor.
    pub async fn submit(&self, actor_id: Uuid, msg: ClientMsg) -> Result<(), RoomError> {
        let limited = !matches!(msg, ClientMsg::Join { .. } | ClientMsg::Leave);
        if limited {
            // Limiters exist only between join and leave
            let allowed = match self.limiters.get(&actor_id) {
                Some(limiter) => limiter.check_input(),
                None => return Err(RoomError::NotJoined(actor_id)),
            };
            if !allowed {
                debug!(room_id = %self.id, actor_id = %actor_id, "Input dropped by rate limiter");
                return Err(RoomError::RateLimited);
            }
        }

        let input = PlayerInput {
            actor_id,
            msg,
            received_at: unix_millis(),
        };
        self.input_tx
            .send(input)
            .await
            .map_err(|_| RoomError::Closed(self.id))
    }
}

/// Registry of all active rooms
pub struct RoomRegistry {
    rooms: DashMap<Uuid, RoomHandle>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<RoomHandle> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    pub fn insert(&self, handle: RoomHandle) {
        self.rooms.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<RoomHandle> {
        self.rooms.remove(id).map(|(_, h)| h)
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }

    /// Any room with a free slot
    pub fn find_available(&self, max_players: usize) -> Option<RoomHandle> {
        self.rooms
            .iter()
            .find(|r| r.value().player_count() < max_players)
            .map(|r| r.value().clone())
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative room task
pub struct GameRoom {
    sim: Simulation,
    input_rx: mpsc::Receiver<PlayerInput>,
    outbound_tx: broadcast::Sender<Outbound>,
    snapshot_builder: SnapshotBuilder,
    timestep: FixedTimestep,
    snapshot_period: Duration,
    player_count: Arc<AtomicUsize>,
    limiters: Arc<DashMap<Uuid, PlayerRateLimiter>>,
    input_rate: u32,
    max_players: usize,
}

impl GameRoom {
    pub fn new(
        id: Uuid,
        settings: &RoomSettings,
        registry: Arc<AbilityRegistry>,
        physics: Box<dyn PhysicsPort>,
        arena: ArenaLayout,
    ) -> (Self, RoomHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (outbound_tx, _) = broadcast::channel(64);
        let player_count = Arc::new(AtomicUsize::new(0));
        let limiters = Arc::new(DashMap::new());

        let handle = RoomHandle {
            id,
            input_tx,
            outbound_tx: outbound_tx.clone(),
            player_count: player_count.clone(),
            limiters: limiters.clone(),
        };

        let timestep = FixedTimestep::from_tps(settings.simulation_tps);
        let room = Self {
            sim: Simulation::new(id, registry, physics, arena, settings.seed, timestep.step()),
            input_rx,
            outbound_tx,
            snapshot_builder: SnapshotBuilder::new(),
            timestep,
            snapshot_period: step_duration(settings.snapshot_tps),
            player_count,
            limiters,
            input_rate: settings.input_rate,
            max_players: settings.max_players,
        };

        (room, handle)
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Run frames until every handle is dropped. Snapshots go out on their
    /// own interval, independent of how many steps each frame produced.
    pub async fn run(mut self) {
        info!(room_id = %self.sim.id, step_ms = self.timestep.step_ms(), "Room started");

        let mut frame = interval(self.timestep.step());
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut broadcast = interval(self.snapshot_period);
        broadcast.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut timer = Timer::new();

        loop {
            tokio::select! {
                _ = frame.tick() => {
                    if !self.process_inputs() {
                        break;
                    }
                    self.timestep.accumulate(timer.lap());
                    while self.timestep.next_step() {
                        self.step();
                    }
                }
                _ = broadcast.tick() => {
                    self.publish_snapshot();
                }
            }
        }

        info!(
            room_id = %self.sim.id,
            ticks = self.sim.tick(),
            snapshots = self.snapshot_builder.snapshots_sent(),
            "Room closed"
        );
    }

    /// Drain queued inputs; false once the channel is closed
    pub fn process_inputs(&mut self) -> bool {
        loop {
            match self.input_rx.try_recv() {
                Ok(input) => self.handle_input(input),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// One fixed step; its events wait for the next snapshot
    pub fn step(&mut self) {
        self.sim.step();
        self.snapshot_builder.push_events(self.sim.take_events());
    }

    pub fn publish_snapshot(&mut self) {
        let snapshot = self.snapshot_builder.build(&self.sim);
        self.publish(Outbound::all(snapshot));
    }

    fn handle_input(&mut self, input: PlayerInput) {
        let actor_id = input.actor_id;
        match input.msg {
            ClientMsg::Join { display_name, loadout } => {
                self.handle_join(actor_id, display_name, loadout);
            }
            ClientMsg::Drive { seq, throttle, steer } => {
                self.sim.set_drive(actor_id, seq, throttle, steer);
            }
            ClientMsg::AbilityDown { ability } => {
                if let Some(kind) = self.parse_ability(actor_id, &ability) {
                    self.sim.press(actor_id, kind);
                }
            }
            ClientMsg::AbilityUp { ability } => {
                if let Some(kind) = self.parse_ability(actor_id, &ability) {
                    self.sim.release(actor_id, kind);
                }
            }
            ClientMsg::Ping { t } => {
                self.publish(Outbound::to(
                    actor_id,
                    ServerMsg::Pong {
                        t,
                        server_time: unix_millis(),
                    },
                ));
            }
            ClientMsg::Leave => {
                self.handle_leave(actor_id, "left");
            }
        }
    }

    fn handle_join(&mut self, actor_id: Uuid, display_name: String, loadout: Vec<String>) {
        if self.sim.car(actor_id).is_some() {
            self.reject(actor_id, "already_joined", "Actor is already in this room");
            return;
        }
        if self.sim.car_count() >= self.max_players {
            warn!(room_id = %self.sim.id, actor_id = %actor_id, "Room full, rejecting join");
            self.reject(actor_id, "room_full", "Room is full");
            return;
        }

        let display_name: String = display_name.trim().chars().take(MAX_DISPLAY_NAME_LEN).collect();
        let actor = match self.sim.add_car(actor_id, display_name, &loadout) {
            Ok(actor) => actor,
            Err(e) => {
                warn!(room_id = %self.sim.id, actor_id = %actor_id, error = %e, "Join failed");
                self.reject(actor_id, "join_failed", &e.to_string());
                return;
            }
        };

        self.limiters
            .insert(actor_id, PlayerRateLimiter::with_rate(self.input_rate));
        let count = self.player_count.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            room_id = %self.sim.id,
            actor_id = %actor_id,
            player_count = count,
            "Player joined room"
        );

        let actors = self
            .sim
            .cars()
            .keys()
            .filter_map(|id| self.sim.actor_info(*id))
            .collect();
        let joined = ServerMsg::Joined {
            room_id: self.sim.id,
            actor_id,
            server_time: self.sim.now(),
            abilities: self.sim.loadout_metadata(actor_id),
            actors,
        };
        self.publish(Outbound::to(actor_id, joined));
        self.publish(Outbound::all(ServerMsg::ActorJoined { actor }));
    }

    fn handle_leave(&mut self, actor_id: Uuid, reason: &str) {
        if !self.sim.remove_car(actor_id) {
            return;
        }
        self.limiters.remove(&actor_id);
        self.snapshot_builder.push_events(self.sim.take_events());

        let count = self.player_count.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        info!(
            room_id = %self.sim.id,
            actor_id = %actor_id,
            player_count = count,
            reason,
            "Player left room"
        );

        self.publish(Outbound::all(ServerMsg::ActorLeft {
            actor_id,
            reason: reason.to_string(),
        }));
    }

    fn parse_ability(&self, actor_id: Uuid, id: &str) -> Option<AbilityKind> {
        match id.parse() {
            Ok(kind) => Some(kind),
            Err(_) => {
                debug!(actor_id = %actor_id, ability = %id, "Unknown ability in input");
                self.reject(actor_id, "unknown_ability", &format!("Unknown ability: {id}"));
                None
            }
        }
    }

    fn reject(&self, actor_id: Uuid, code: &str, message: &str) {
        self.publish(Outbound::to(
            actor_id,
            ServerMsg::Error {
                code: code.to_string(),
                message: message.to_string(),
            },
        ));
    }

    fn publish(&self, outbound: Outbound) {
        // No subscribers is fine
        let _ = self.outbound_tx.send(outbound);
    }
}
