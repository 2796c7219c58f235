//! Ambient AI traffic for multiplayer racing servers.
//!
//! The road network is a [map::TrafficMap] of spline points. Each car slot
//! of the session owns a pool of [AiState]s that drive along it, and an
//! [AiBehavior] keeps those vehicles spawned around the human players.
//! The activities are driven either from a game loop by [TrafficSimulation]
//! or on background threads by [TrafficRunner].

pub use behavior::{AiBehavior, SlotEvent};
pub use cgmath;
pub use config::{AiMode, AiParams, AllowedLanes, CarOverrides, DrivingProfile};
pub use error::{ConfigError, MapError, TrafficError};
pub use evaluator::JunctionEvaluator;
pub use logging::init_logging;
pub use runner::TrafficRunner;
pub use simulation::TrafficSimulation;
pub use slot::{EntrySlot, PlayerStatus, SharedState};
use slotmap::new_key_type;
pub use slotmap::{Key, KeyData};
pub use util::{Interval, Millis};
pub use vehicle::{AiSnapshot, AiState, CarStatus, StateId, StatusFlags};
pub use world::TrafficWorld;

mod behavior;
mod config;
mod debug;
mod error;
mod evaluator;
mod logging;
pub mod map;
pub mod math;
mod runner;
mod simulation;
mod slot;
mod util;
mod vehicle;
mod world;

new_key_type! {
    /// Unique ID of an [EntrySlot].
    pub struct SlotId;
}
