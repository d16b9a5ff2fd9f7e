//! # Skirmish Core
//!
//! Deterministic unit simulation for a real-time strategy game: grid
//! navigation, tile occupancy, local motion and combat.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO beyond replay files
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! Identical inputs on identical starting state produce bit-identical
//! results, which enables lockstep multiplayer, replays and determinism
//! testing.
//!
//! ## Crate Structure
//!
//! - [`grid`] - Navigation grid and terrain
//! - [`occupancy`] - Per-tile capacity, sub-slots and reservations
//! - [`pathfinding`] - 8-connected A* without corner cutting
//! - [`motion`] - Path following, bypass, separation and arrival
//! - [`targeting`] and [`engagement`] - Target acquisition and standoff
//! - [`weapons`] - Firing, projectiles and damage
//! - [`commands`] - Validated command API
//! - [`simulation`] - Context and fixed-order tick loop
//! - [`replay`] - Recording and verified playback

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod commands;
pub mod components;
pub mod config;
pub mod engagement;
pub mod entity;
pub mod error;
pub mod grid;
pub mod math;
pub mod motion;
pub mod occupancy;
pub mod orders;
pub mod pathfinding;
pub mod player_facade;
pub mod replay;
pub mod simulation;
pub mod targeting;
pub mod weapons;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::combat::{ArmorClass, DamageType, Delivery, Weapon};
    pub use crate::commands::Command;
    pub use crate::components::{
        Agent, AgentClass, Capabilities, Doctrine, Health, Structure, TargetKind, TeamId,
    };
    pub use crate::config::SimConfig;
    pub use crate::entity::{Entity, EntityId};
    pub use crate::error::{GameError, Result};
    pub use crate::grid::{CellType, NavGrid, Tile};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::motion::{HandoffEvent, HandoffKind};
    pub use crate::occupancy::OccupancyViolation;
    pub use crate::orders::Order;
    pub use crate::player_facade::{PlayerFacade, SimulationPlayerFacade};
    pub use crate::replay::{Replay, ReplayPlayer};
    pub use crate::simulation::{Simulation, TickEvents};
    pub use crate::weapons::CombatEvent;
}
