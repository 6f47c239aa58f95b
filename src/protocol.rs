//! Room protocol message definitions
//! These are the wire types exchanged between a room and its players

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::abilities::{AbilityClientData, AbilityKind, AbilityMetadata, ActivationResult, FailureReason};
use crate::game::objects::{ObjectKind, PortalColor, RemovalReason};

/// Messages sent from client to room
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join the room with an ability loadout
    Join {
        display_name: String,
        /// Ability ids; unknown ids are ignored
        #[serde(default)]
        loadout: Vec<String>,
    },

    /// Driving intent
    Drive {
        /// Sequence number for client-side reconciliation
        seq: u32,
        /// -1.0 = full reverse, 1.0 = full forward
        throttle: f32,
        /// -1.0 = full left, 1.0 = full right
        steer: f32,
    },

    /// Ability input pressed
    AbilityDown { ability: String },

    /// Ability input released
    AbilityUp { ability: String },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the room
    Leave,
}

/// Messages sent from room to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Confirmation of room join
    Joined {
        room_id: Uuid,
        actor_id: Uuid,
        server_time: u64,
        /// Metadata for the equipped abilities
        abilities: Vec<AbilityMetadata>,
        /// Everyone in the room at join time
        actors: Vec<ActorInfo>,
    },

    /// Another actor joined
    ActorJoined { actor: ActorInfo },

    /// An actor left
    ActorLeft { actor_id: Uuid, reason: String },

    /// Authoritative state (sent at the snapshot rate)
    Snapshot {
        tick: u64,
        server_time: u64,
        cars: Vec<CarSnapshot>,
        objects: Vec<ObjectSnapshot>,
        /// Events since the last snapshot
        events: Vec<GameEvent>,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },

    /// Error message
    Error { code: String, message: String },
}

/// Actor info for join notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorInfo {
    pub actor_id: Uuid,
    pub display_name: String,
    pub loadout: Vec<AbilityKind>,
}

/// Car state in a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CarSnapshot {
    pub actor_id: Uuid,
    pub x: f32,
    pub y: f32,
    /// Rotation in radians
    pub rotation: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub health: f32,
    pub max_health: f32,
    pub alive: bool,
    pub is_ghost: bool,
    pub is_anchored: bool,
    pub is_focused: bool,
    pub invulnerable: bool,
    /// Last processed drive sequence
    pub last_input_seq: u32,
    pub abilities: Vec<AbilityClientData>,
    pub kills: u32,
    pub deaths: u32,
}

/// Ability object state in a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ObjectSnapshot {
    pub object_id: Uuid,
    pub kind: ObjectKind,
    pub owner_id: Uuid,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub expires_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_portal_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<PortalColor>,
}

/// Game events accumulated between snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    AbilityUsed {
        actor_id: Uuid,
        result: ActivationResult,
    },

    AbilityFailed {
        actor_id: Uuid,
        ability: AbilityKind,
        reason: FailureReason,
    },

    /// Damage registered
    Hit {
        attacker_id: Uuid,
        target_id: Uuid,
        source: ObjectKind,
        object_id: Uuid,
        damage: f32,
        x: f32,
        y: f32,
    },

    /// Charged shot detonated
    Explosion {
        owner_id: Uuid,
        object_id: Uuid,
        x: f32,
        y: f32,
        radius: f32,
        damage: f32,
        force: f32,
    },

    Teleport {
        actor_id: Uuid,
        from_portal_id: Uuid,
        to_portal_id: Uuid,
        x: f32,
        y: f32,
    },

    PortalOpened {
        owner_id: Uuid,
        portal_id: Uuid,
        color: PortalColor,
        linked_portal_id: Option<Uuid>,
        x: f32,
        y: f32,
    },

    ObjectRemoved {
        object_id: Uuid,
        kind: ObjectKind,
        reason: RemovalReason,
    },

    Kill {
        killer_id: Option<Uuid>,
        victim_id: Uuid,
        source: Option<ObjectKind>,
    },

    Respawn {
        actor_id: Uuid,
        x: f32,
        y: f32,
    },
}
