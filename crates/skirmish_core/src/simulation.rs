//! Simulation context and the fixed-order tick loop.
//!
//! # Determinism
//!
//! All operations in this module are fully deterministic:
//! - No floating-point math (uses fixed-point via [`Fixed`])
//! - No system randomness; per-agent spread comes from handle hashes
//! - Entities are processed in handle order and lower handles win ties
//!
//! # Tick order
//!
//! 1. Rebuild the occupancy grid from current positions
//! 2. Targeting and order transitions
//! 3. Motion
//! 4. Weapons and projectiles
//! 5. Deaths
//!
//! # Example
//!
//! ```
//! use skirmish_core::components::{Agent, AgentClass};
//! use skirmish_core::math::Vec2Fixed;
//! use skirmish_core::simulation::Simulation;
//!
//! let mut sim = Simulation::new(16, 16);
//! let tank = sim
//!     .spawn_agent(Agent::new(AgentClass::Vehicle, 1, Vec2Fixed::from_num(2, 2)))
//!     .unwrap();
//! sim.issue_move(&[tank], Vec2Fixed::from_num(10, 10)).unwrap();
//! sim.tick();
//! assert_eq!(sim.get_tick(), 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, Level};

use crate::commands::{self, Command};
use crate::components::{Agent, Structure};
use crate::config::SimConfig;
use crate::entity::{Entity, EntityId, EntityStorage};
use crate::error::{GameError, Result};
use crate::grid::{NavGrid, Tile};
use crate::math::{Fixed, Vec2Fixed};
use crate::motion::{motion_phase, HandoffEvent};
use crate::occupancy::{Occupant, OccupancyGrid, OccupancyViolation, RebuildReport};
use crate::replay::{Replay, ReplayRecorder};
use crate::targeting::targeting_phase;
use crate::weapons::{weapons_phase, CombatEvent, Projectile};

// ============================================================================
// Context
// ============================================================================

/// All simulation state, passed by reference into every phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationContext {
    pub(crate) tick: u64,
    pub(crate) config: SimConfig,
    pub(crate) entities: EntityStorage,
    pub(crate) nav: NavGrid,
    pub(crate) occupancy: OccupancyGrid,
    pub(crate) projectiles: Vec<Projectile>,
    pub(crate) next_projectile_id: u32,
}

impl SimulationContext {
    /// Empty context over a navigation grid.
    #[must_use]
    pub fn new(nav: NavGrid, config: SimConfig) -> Self {
        Self {
            tick: 0,
            config,
            entities: EntityStorage::new(),
            occupancy: OccupancyGrid::new(&nav),
            nav,
            projectiles: Vec::new(),
            next_projectile_id: 0,
        }
    }

    /// Ticks completed so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Tunables.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Entity store.
    #[must_use]
    pub const fn entities(&self) -> &EntityStorage {
        &self.entities
    }

    /// Navigation grid.
    #[must_use]
    pub const fn nav(&self) -> &NavGrid {
        &self.nav
    }

    /// Occupancy as of the last rebuild plus this tick's reservations.
    #[must_use]
    pub const fn occupancy(&self) -> &OccupancyGrid {
        &self.occupancy
    }

    /// Missiles and shells in the air.
    #[must_use]
    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    /// Occupancy inputs for every live agent, in processing order.
    fn occupants(&self) -> Vec<Occupant> {
        self.entities
            .agents()
            .map(|(id, a)| Occupant {
                mover: a.mover(id),
                tile: self.nav.tile_of(a.position),
                subslot: a.subslot,
                reservation: a.reservation.map(|r| r.tile),
            })
            .collect()
    }

    /// Phase one: rebuild occupancy from scratch and write corrected
    /// sub-slots and dropped reservations back to the agents.
    pub fn rebuild_occupancy(&mut self) -> RebuildReport {
        let mut occupants = self.occupants();
        let report = self.occupancy.rebuild(&mut occupants);
        for occ in occupants {
            if let Some(agent) = self.entities.agent_mut(occ.mover.id) {
                agent.subslot = occ.subslot;
                if occ.reservation.is_none() {
                    agent.reservation = None;
                }
            }
        }
        if report.reservation_conflicts > 0 || report.slot_reassignments > 0 {
            debug!(
                tick = self.tick,
                conflicts = report.reservation_conflicts,
                reassigned = report.slot_reassignments,
                "Occupancy rebuild corrected agents"
            );
        }
        report
    }
}

// ============================================================================
// Events
// ============================================================================

/// Events generated during one tick.
///
/// Read by renderers, audio and economy logic. Nothing here feeds back
/// into the simulation.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Tick these events belong to.
    pub tick: u64,
    /// Shots, damage and projectile expiry.
    pub combat: Vec<CombatEvent>,
    /// Arrivals for harvest, capture and repair orders.
    pub handoffs: Vec<HandoffEvent>,
    /// Entities removed at the end of the tick.
    pub deaths: Vec<EntityId>,
    /// Corrections made by the occupancy rebuild.
    pub occupancy: RebuildReport,
}

// ============================================================================
// Simulation
// ============================================================================

/// The core simulation.
///
/// Owns all state through a [`SimulationContext`] and exposes the command
/// API plus the collaborator hooks used by production and cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    ctx: SimulationContext,
    #[serde(skip)]
    recorder: Option<ReplayRecorder>,
}

impl Simulation {
    /// Open map of `width` × `height` unit tiles with default tunables.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_config(width, height, SimConfig::default())
    }

    /// Open map with explicit tunables.
    #[must_use]
    pub fn with_config(width: u32, height: u32, config: SimConfig) -> Self {
        let nav = NavGrid::new(width, height, config.tile_size);
        Self::from_grid(nav, config)
    }

    /// Simulation over a prepared navigation grid.
    #[must_use]
    pub fn from_grid(nav: NavGrid, config: SimConfig) -> Self {
        Self {
            ctx: SimulationContext::new(nav, config),
            recorder: None,
        }
    }

    /// Map from ASCII rows (see [`NavGrid::from_ascii`]) with unit tiles.
    #[must_use]
    pub fn from_ascii(rows: &[&str]) -> Self {
        Self::from_grid(NavGrid::from_ascii(rows, Fixed::ONE), SimConfig::default())
    }

    /// Ticks completed so far.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.ctx.tick
    }

    /// Read-only view of all state.
    #[must_use]
    pub const fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    /// Mutable state, for tests and tools that drive single phases.
    pub fn context_mut(&mut self) -> &mut SimulationContext {
        &mut self.ctx
    }

    /// Entity store.
    #[must_use]
    pub const fn entities(&self) -> &EntityStorage {
        &self.ctx.entities
    }

    /// Look up an agent.
    #[must_use]
    pub fn agent(&self, id: EntityId) -> Option<&Agent> {
        self.ctx.entities.agent(id)
    }

    /// Look up an agent mutably.
    pub fn agent_mut(&mut self, id: EntityId) -> Option<&mut Agent> {
        self.ctx.entities.agent_mut(id)
    }

    /// Look up a structure.
    #[must_use]
    pub fn structure(&self, id: EntityId) -> Option<&Structure> {
        self.ctx.entities.structure(id)
    }

    /// Advance one tick.
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents {
            tick: self.ctx.tick,
            ..TickEvents::default()
        };

        events.occupancy = self.ctx.rebuild_occupancy();
        targeting_phase(&mut self.ctx);
        motion_phase(&mut self.ctx, &mut events.handoffs);
        weapons_phase(&mut self.ctx, &mut events.combat);
        events.deaths = self.remove_dead();

        self.ctx.tick += 1;
        if tracing::enabled!(Level::DEBUG) {
            debug!(
                tick = events.tick,
                hash = self.state_hash(),
                deaths = events.deaths.len(),
                "Tick complete"
            );
        }
        events
    }

    /// Phase five: remove every entity at zero health.
    fn remove_dead(&mut self) -> Vec<EntityId> {
        let dead: Vec<EntityId> = self
            .ctx
            .entities
            .iter()
            .filter(|(_, e)| match e {
                Entity::Agent(a) => a.health.is_dead(),
                Entity::Structure(s) => s.health.is_dead(),
            })
            .map(|(id, _)| id)
            .collect();
        for id in &dead {
            if let Some(Entity::Structure(s)) = self.ctx.entities.remove(*id) {
                self.ctx.nav.clear_structure(s.origin, s.width, s.height);
            }
            debug!(entity = %id, tick = self.ctx.tick, "Entity destroyed");
        }
        dead
    }

    // ========================================================================
    // Collaborator hooks
    // ========================================================================

    /// Add an agent, as the production system would.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidCommand`] if the agent stands on a tile
    /// that is off the map or not walkable.
    pub fn spawn_agent(&mut self, agent: Agent) -> Result<EntityId> {
        let tile = self.ctx.nav.tile_of(agent.position);
        if !self.ctx.nav.is_walkable(tile) {
            return Err(GameError::InvalidCommand(format!(
                "cannot place an agent on {tile:?}"
            )));
        }
        let class = agent.class;
        let team = agent.team;
        let id = self.ctx.entities.insert(Entity::Agent(agent));
        debug!(agent = %id, ?class, team, ?tile, "Agent spawned");
        Ok(id)
    }

    /// Add a structure and stamp its footprint into the navigation grid.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidCommand`] if the footprint leaves the map,
    /// covers unwalkable terrain, or covers an agent.
    pub fn spawn_structure(&mut self, structure: Structure) -> Result<EntityId> {
        let nav = &self.ctx.nav;
        let (w, h) = (structure.width as i32, structure.height as i32);
        let origin = structure.origin;
        let fits = structure.width > 0
            && structure.height > 0
            && nav.in_bounds(origin)
            && nav.in_bounds(origin.offset(w - 1, h - 1));
        if !fits {
            return Err(GameError::InvalidCommand(format!(
                "structure footprint at {origin:?} leaves the map"
            )));
        }
        if nav
            .footprint_tiles(origin, structure.width, structure.height)
            .any(|t| !nav.is_walkable(t))
        {
            return Err(GameError::InvalidCommand(format!(
                "structure footprint at {origin:?} covers unwalkable ground"
            )));
        }
        if let Some((blocker, _)) = self
            .ctx
            .entities
            .agents()
            .find(|(_, a)| structure.covers(nav.tile_of(a.position)))
        {
            return Err(GameError::InvalidCommand(format!(
                "structure footprint at {origin:?} covers agent {blocker}"
            )));
        }

        self.ctx
            .nav
            .stamp_structure(origin, structure.width, structure.height);
        let id = self.ctx.entities.insert(Entity::Structure(structure));
        debug!(structure = %id, ?origin, "Structure placed");
        Ok(id)
    }

    /// Remove an entity, as the cleanup system would.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] for unknown or stale handles.
    pub fn despawn(&mut self, id: EntityId) -> Result<()> {
        match self.ctx.entities.remove(id) {
            Some(Entity::Structure(s)) => {
                self.ctx.nav.clear_structure(s.origin, s.width, s.height);
                Ok(())
            }
            Some(Entity::Agent(_)) => Ok(()),
            None => Err(GameError::EntityNotFound(id)),
        }
    }

    // ========================================================================
    // Command API
    // ========================================================================

    /// Validate and apply a command, recording it when a replay is running.
    ///
    /// # Errors
    ///
    /// See [`commands::apply`]. A rejected command changes nothing and is
    /// not recorded.
    pub fn apply_command(&mut self, command: Command) -> Result<()> {
        commands::apply(&mut self.ctx, &command)?;
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(self.ctx.tick, command);
        }
        Ok(())
    }

    /// Formation move to a world point.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_command`].
    pub fn issue_move(&mut self, agents: &[EntityId], point: Vec2Fixed) -> Result<()> {
        self.apply_command(Command::Move {
            agents: agents.to_vec(),
            point,
        })
    }

    /// March to a point, engaging on the way.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_command`].
    pub fn issue_attack_move(&mut self, agents: &[EntityId], point: Vec2Fixed) -> Result<()> {
        self.apply_command(Command::AttackMove {
            agents: agents.to_vec(),
            point,
        })
    }

    /// Lock onto an enemy.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_command`].
    pub fn issue_attack(&mut self, agents: &[EntityId], target: EntityId) -> Result<()> {
        self.apply_command(Command::Attack {
            agents: agents.to_vec(),
            target,
        })
    }

    /// Lock onto any entity.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_command`].
    pub fn issue_force_attack(&mut self, agents: &[EntityId], target: EntityId) -> Result<()> {
        self.apply_command(Command::ForceAttack {
            agents: agents.to_vec(),
            target,
        })
    }

    /// Fire at a ground point.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_command`].
    pub fn issue_force_fire(&mut self, agents: &[EntityId], point: Vec2Fixed) -> Result<()> {
        self.apply_command(Command::ForceFire {
            agents: agents.to_vec(),
            point,
        })
    }

    /// Hold and defend current positions.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_command`].
    pub fn issue_guard(&mut self, agents: &[EntityId]) -> Result<()> {
        self.apply_command(Command::Guard {
            agents: agents.to_vec(),
        })
    }

    /// Send harvesters to a node.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_command`].
    pub fn issue_harvest(&mut self, agents: &[EntityId], node: Tile) -> Result<()> {
        self.apply_command(Command::Harvest {
            agents: agents.to_vec(),
            node,
        })
    }

    /// Send capturers to a structure.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_command`].
    pub fn issue_capture(&mut self, agents: &[EntityId], structure: EntityId) -> Result<()> {
        self.apply_command(Command::Capture {
            agents: agents.to_vec(),
            structure,
        })
    }

    /// Send agents into a structure for repair.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_command`].
    pub fn issue_repair_enter(&mut self, agents: &[EntityId], structure: EntityId) -> Result<()> {
        self.apply_command(Command::RepairEnter {
            agents: agents.to_vec(),
            structure,
        })
    }

    /// Drop all orders.
    ///
    /// # Errors
    ///
    /// See [`Self::apply_command`].
    pub fn issue_stop(&mut self, agents: &[EntityId]) -> Result<()> {
        self.apply_command(Command::Stop {
            agents: agents.to_vec(),
        })
    }

    // ========================================================================
    // Replay
    // ========================================================================

    /// Start recording accepted commands from the current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the current state cannot be serialized.
    pub fn start_recording(&mut self, scenario_id: impl Into<String>) -> Result<()> {
        let replay = Replay::new(scenario_id, self)?;
        self.recorder = Some(ReplayRecorder::new(replay));
        Ok(())
    }

    /// Stop recording and return the finished replay.
    pub fn finish_recording(&mut self) -> Option<Replay> {
        let recorder = self.recorder.take()?;
        Some(recorder.finish(self.ctx.tick, self.state_hash()))
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Hash of the deterministic state, for desync and replay checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.ctx.tick.hash(&mut hasher);
        self.ctx.entities.hash(&mut hasher);
        self.ctx.projectiles.hash(&mut hasher);
        self.ctx.next_projectile_id.hash(&mut hasher);
        self.ctx.nav.hash(&mut hasher);
        hasher.finish()
    }

    /// Occupancy invariant violations at the current positions.
    ///
    /// Empty for a healthy simulation.
    #[must_use]
    pub fn check_invariants(&self) -> Vec<OccupancyViolation> {
        let mut grid = OccupancyGrid::new(&self.ctx.nav);
        let mut occupants = self.ctx.occupants();
        grid.rebuild(&mut occupants);
        grid.validate()
    }

    /// Serialize the simulation state for replay or network sync.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize simulation: {e}")))
    }

    /// Deserialize simulation state from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize simulation: {e}")))
    }
}

impl Default for Simulation {
    /// A 64x64 open map.
    fn default() -> Self {
        Self::new(64, 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::Weapon;
    use crate::components::{AgentClass, Reservation};
    use crate::math::ratio;
    use crate::orders::Order;

    fn at(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_num(x, y) + Vec2Fixed::new(ratio(1, 2), ratio(1, 2))
    }

    #[test]
    fn test_simulation_new() {
        let sim = Simulation::new(8, 8);
        assert_eq!(sim.get_tick(), 0);
        assert!(sim.entities().is_empty());
    }

    #[test]
    fn test_tick_increments() {
        let mut sim = Simulation::new(8, 8);
        let events = sim.tick();
        assert_eq!(events.tick, 0);
        assert_eq!(sim.get_tick(), 1);
    }

    #[test]
    fn test_spawn_agent_rejects_blocked_tile() {
        let mut sim = Simulation::from_ascii(&["..#", "..."]);
        let agent = Agent::new(AgentClass::Infantry, 1, at(2, 0));
        assert!(matches!(
            sim.spawn_agent(agent),
            Err(GameError::InvalidCommand(_))
        ));
        let off_map = Agent::new(AgentClass::Infantry, 1, at(9, 9));
        assert!(sim.spawn_agent(off_map).is_err());
    }

    #[test]
    fn test_structure_stamps_and_clears_footprint() {
        let mut sim = Simulation::new(8, 8);
        let id = sim
            .spawn_structure(Structure::new(1, Tile::new(2, 2), 2, 2, 100))
            .unwrap();
        assert!(sim.context().nav().is_structure(Tile::new(3, 3)));

        sim.despawn(id).unwrap();
        assert!(sim.context().nav().is_walkable(Tile::new(3, 3)));
        assert!(matches!(
            sim.despawn(id),
            Err(GameError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_structure_cannot_cover_agent_or_leave_map() {
        let mut sim = Simulation::new(8, 8);
        sim.spawn_agent(Agent::new(AgentClass::Infantry, 1, at(3, 3)))
            .unwrap();
        assert!(sim
            .spawn_structure(Structure::new(1, Tile::new(2, 2), 2, 2, 100))
            .is_err());
        assert!(sim
            .spawn_structure(Structure::new(1, Tile::new(7, 7), 2, 2, 100))
            .is_err());
    }

    #[test]
    fn test_dead_entities_removed_and_reported() {
        let mut sim = Simulation::new(16, 16);
        let gun = Weapon::hitscan(200, Fixed::from_num(4), 10);
        let shooter = sim
            .spawn_agent(Agent::new(AgentClass::Infantry, 1, at(2, 2)).with_weapon(gun))
            .unwrap();
        let victim = sim
            .spawn_agent(Agent::new(AgentClass::Infantry, 2, at(4, 2)))
            .unwrap();
        sim.issue_attack(&[shooter], victim).unwrap();

        let events = sim.tick();
        assert_eq!(events.deaths, vec![victim]);
        assert!(sim.agent(victim).is_none());

        sim.tick();
        assert_eq!(sim.agent(shooter).unwrap().order, Order::Idle);
    }

    #[test]
    fn test_serialize_round_trip_preserves_hash() {
        let mut sim = Simulation::new(16, 16);
        let id = sim
            .spawn_agent(Agent::new(AgentClass::Vehicle, 1, at(1, 1)))
            .unwrap();
        sim.issue_move(&[id], at(9, 9)).unwrap();
        for _ in 0..5 {
            sim.tick();
        }
        let bytes = sim.serialize().unwrap();
        let mut copy = Simulation::deserialize(&bytes).unwrap();
        assert_eq!(copy.state_hash(), sim.state_hash());

        for _ in 0..20 {
            sim.tick();
            copy.tick();
        }
        assert_eq!(copy.state_hash(), sim.state_hash());
    }

    #[test]
    fn test_rejected_command_not_recorded() {
        let mut sim = Simulation::new(8, 8);
        let id = sim
            .spawn_agent(Agent::new(AgentClass::Vehicle, 1, at(1, 1)))
            .unwrap();
        sim.start_recording("test").unwrap();
        sim.issue_move(&[id], at(5, 5)).unwrap();
        let ghost = sim
            .spawn_agent(Agent::new(AgentClass::Vehicle, 1, at(2, 1)))
            .unwrap();
        sim.despawn(ghost).unwrap();
        assert!(sim.issue_move(&[ghost], at(5, 5)).is_err());

        let replay = sim.finish_recording().unwrap();
        assert_eq!(replay.command_count(), 1);
    }

    #[test]
    fn test_invariants_hold_for_fresh_simulation() {
        let mut sim = Simulation::new(8, 8);
        for x in 0..4 {
            sim.spawn_agent(Agent::new(AgentClass::Vehicle, 1, at(x, 0)))
                .unwrap();
        }
        assert!(sim.check_invariants().is_empty());
        sim.spawn_agent(Agent::new(AgentClass::Vehicle, 1, at(0, 0)))
            .unwrap();
        assert_eq!(sim.check_invariants().len(), 1);
    }

    #[test]
    fn test_invariants_report_shared_reservation() {
        let mut sim = Simulation::new(8, 8);
        let tile = Tile::new(2, 1);
        for x in [1, 3] {
            let id = sim
                .spawn_agent(Agent::new(AgentClass::Infantry, 1, at(x, 1)))
                .unwrap();
            sim.agent_mut(id).unwrap().reservation = Some(Reservation { tile, subslot: 0 });
        }
        assert_eq!(
            sim.check_invariants(),
            vec![OccupancyViolation::DuplicateReservation { tile }]
        );
    }
}
