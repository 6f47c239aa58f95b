//! Game simulation modules

pub mod abilities;
pub mod actor;
pub mod collision;
pub mod objects;
pub mod physics;
pub mod room;
pub mod simulation;
pub mod snapshot;

pub use room::{GameRoom, Outbound, PlayerInput, RoomError, RoomHandle, RoomRegistry, RoomSettings};
pub use simulation::{ArenaLayout, Simulation};
