//! The command API.
//!
//! Player input and AI policy both reach the simulation only through
//! [`Command`]. Every handle is validated before anything is touched, so a
//! rejected command leaves the simulation exactly as it was. Accepted
//! commands replace each agent's order wholesale.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::components::{are_hostile, Agent, AgentClass, TeamId};
use crate::engagement::{compass_add, compass_index, COMPASS_POINTS};
use crate::entity::EntityId;
use crate::error::{GameError, Result};
use crate::grid::Tile;
use crate::math::Vec2Fixed;
use crate::occupancy::{is_standable, SUBSLOT_COUNT};
use crate::orders::{AttackSlot, Order, Resume};
use crate::pathfinding::{octile_distance, ring};
use crate::simulation::SimulationContext;
use crate::targeting::target_info;

/// A group command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Formation move to a world point.
    Move {
        /// Agents to move.
        agents: Vec<EntityId>,
        /// Destination.
        point: Vec2Fixed,
    },
    /// March to a point, engaging anything met on the way.
    AttackMove {
        /// Agents to move.
        agents: Vec<EntityId>,
        /// Destination.
        point: Vec2Fixed,
    },
    /// Lock onto an enemy.
    Attack {
        /// Attackers.
        agents: Vec<EntityId>,
        /// Target entity.
        target: EntityId,
    },
    /// Lock onto any entity, friend or foe.
    ForceAttack {
        /// Attackers.
        agents: Vec<EntityId>,
        /// Target entity.
        target: EntityId,
    },
    /// Fire at a ground point.
    ForceFire {
        /// Shooters.
        agents: Vec<EntityId>,
        /// Aim point.
        point: Vec2Fixed,
    },
    /// Hold position and defend it.
    Guard {
        /// Agents to guard.
        agents: Vec<EntityId>,
    },
    /// Send harvesters to a resource node.
    Harvest {
        /// Harvesters.
        agents: Vec<EntityId>,
        /// Node tile.
        node: Tile,
    },
    /// Send engineers to capture a structure.
    Capture {
        /// Capturers.
        agents: Vec<EntityId>,
        /// Structure.
        structure: EntityId,
    },
    /// Send agents into a structure for repair.
    RepairEnter {
        /// Agents to repair.
        agents: Vec<EntityId>,
        /// Structure.
        structure: EntityId,
    },
    /// Drop every order.
    Stop {
        /// Agents to stop.
        agents: Vec<EntityId>,
    },
}

impl Command {
    /// Agents the command addresses.
    #[must_use]
    pub fn agents(&self) -> &[EntityId] {
        match self {
            Self::Move { agents, .. }
            | Self::AttackMove { agents, .. }
            | Self::Attack { agents, .. }
            | Self::ForceAttack { agents, .. }
            | Self::ForceFire { agents, .. }
            | Self::Guard { agents }
            | Self::Harvest { agents, .. }
            | Self::Capture { agents, .. }
            | Self::RepairEnter { agents, .. }
            | Self::Stop { agents } => agents,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::AttackMove { .. } => "attack-move",
            Self::Attack { .. } => "attack",
            Self::ForceAttack { .. } => "force-attack",
            Self::ForceFire { .. } => "force-fire",
            Self::Guard { .. } => "guard",
            Self::Harvest { .. } => "harvest",
            Self::Capture { .. } => "capture",
            Self::RepairEnter { .. } => "repair-enter",
            Self::Stop { .. } => "stop",
        }
    }
}

/// Validate and apply a command.
///
/// # Errors
///
/// Returns [`GameError::EntityNotFound`] when an agent, target or structure
/// handle does not resolve, and [`GameError::InvalidCommand`] when a normal
/// attack names a friendly or untargetable entity.
pub fn apply(ctx: &mut SimulationContext, command: &Command) -> Result<()> {
    let agents = resolve_agents(ctx, command.agents())?;
    match *command {
        Command::Move { point, .. } => {
            for (id, tile) in formation(ctx, &agents, point) {
                assign(ctx, id, Order::Move { goal: tile });
            }
        }
        Command::AttackMove { point, .. } => {
            for (id, tile) in formation(ctx, &agents, point) {
                assign(ctx, id, Order::AttackMove { goal: tile });
            }
        }
        Command::Attack { target, .. } => attack(ctx, &agents, target, false)?,
        Command::ForceAttack { target, .. } => attack(ctx, &agents, target, true)?,
        Command::ForceFire { point, .. } => {
            for id in armed(ctx, &agents) {
                assign(ctx, id, Order::ForceFire { point });
            }
        }
        Command::Guard { .. } => {
            for id in agents {
                let Some(anchor) = ctx.entities.agent(id).map(|a| a.position) else {
                    continue;
                };
                assign(ctx, id, Order::Guard { anchor });
            }
        }
        Command::Harvest { node, .. } => {
            if !ctx.nav.in_bounds(node) {
                return Err(GameError::InvalidCommand(format!(
                    "resource node {node:?} is off the map"
                )));
            }
            for id in capable(ctx, &agents, |a| a.caps.can_harvest) {
                assign(ctx, id, Order::Harvest { node });
            }
        }
        Command::Capture { structure, .. } => {
            require_structure(ctx, structure)?;
            for id in capable(ctx, &agents, |a| a.caps.can_capture) {
                assign(ctx, id, Order::Capture { structure });
            }
        }
        Command::RepairEnter { structure, .. } => {
            require_structure(ctx, structure)?;
            for id in capable(ctx, &agents, |a| a.caps.can_repair) {
                assign(ctx, id, Order::RepairEnter { structure });
            }
        }
        Command::Stop { .. } => {
            for id in agents {
                assign(ctx, id, Order::Idle);
            }
        }
    }
    debug!(command = command.name(), agents = command.agents().len(), "Command applied");
    Ok(())
}

/// Live agent handles in first-seen order, duplicates dropped.
fn resolve_agents(ctx: &SimulationContext, ids: &[EntityId]) -> Result<Vec<EntityId>> {
    let mut seen = Vec::with_capacity(ids.len());
    for &id in ids {
        if ctx.entities.agent(id).is_none() {
            return Err(GameError::EntityNotFound(id));
        }
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    Ok(seen)
}

fn require_structure(ctx: &SimulationContext, id: EntityId) -> Result<()> {
    ctx.entities
        .structure(id)
        .map(|_| ())
        .ok_or(GameError::EntityNotFound(id))
}

fn capable(ctx: &SimulationContext, agents: &[EntityId], check: impl Fn(&Agent) -> bool) -> Vec<EntityId> {
    agents
        .iter()
        .copied()
        .filter(|id| {
            let ok = ctx.entities.agent(*id).is_some_and(&check);
            if !ok {
                debug!(agent = %id, "Agent lacks the capability, skipped");
            }
            ok
        })
        .collect()
}

fn armed(ctx: &SimulationContext, agents: &[EntityId]) -> Vec<EntityId> {
    capable(ctx, agents, |a| a.weapon().is_some())
}

/// Replace an order and free the grid claim it held.
fn assign(ctx: &mut SimulationContext, id: EntityId, order: Order) {
    if let Some(agent) = ctx.entities.agent_mut(id) {
        if let Some(reservation) = agent.reservation {
            ctx.occupancy.release(id, reservation.tile);
        }
        agent.assign_order(order);
    }
}

// ============================================================================
// Attack
// ============================================================================

fn attack(ctx: &mut SimulationContext, agents: &[EntityId], target: EntityId, forced: bool) -> Result<()> {
    let Some(info) = target_info(ctx, target) else {
        return if ctx.entities.contains(target) {
            Err(GameError::InvalidCommand(format!("{target} cannot be attacked")))
        } else {
            Err(GameError::EntityNotFound(target))
        };
    };
    if !forced {
        let teams: Vec<TeamId> = agents
            .iter()
            .filter_map(|id| ctx.entities.agent(*id).map(|a| a.team))
            .collect();
        if teams.iter().any(|t| !are_hostile(*t, info.team)) {
            return Err(GameError::InvalidCommand(format!(
                "{target} is not hostile; use a forced attack"
            )));
        }
    }

    let shooters: Vec<EntityId> = armed(ctx, agents)
        .into_iter()
        .filter(|id| *id != target)
        .collect();
    let center = info.shape.center();
    for (id, slot) in attack_slots(ctx, &shooters, center) {
        assign(
            ctx,
            id,
            Order::Attack {
                target,
                resume: Resume::Idle,
                manual: true,
                forced,
                slot: Some(slot),
            },
        );
    }
    Ok(())
}

/// Spread a group around a target: each attacker takes the free bearing
/// closest to its own, nearest attackers first. Once all bearings are
/// taken the next attackers start one ring further in.
pub fn attack_slots(ctx: &SimulationContext, agents: &[EntityId], center: Vec2Fixed) -> Vec<(EntityId, AttackSlot)> {
    let mut order: Vec<(EntityId, Vec2Fixed)> = agents
        .iter()
        .filter_map(|id| ctx.entities.agent(*id).map(|a| (*id, a.position)))
        .collect();
    order.sort_by_key(|(id, pos)| (pos.distance_squared(center), *id));

    let mut taken = [false; COMPASS_POINTS as usize];
    let mut ring = 0u8;
    let mut slots = Vec::with_capacity(order.len());
    for (id, pos) in order {
        if taken.iter().all(|t| *t) {
            taken = [false; COMPASS_POINTS as usize];
            ring = (ring + 1).min(ctx.config.max_rings);
        }
        let natural = compass_index(pos - center);
        let angle = (0..i32::from(COMPASS_POINTS))
            .flat_map(|k| [k, -k])
            .map(|k| compass_add(natural, k))
            .find(|a| !taken[usize::from(*a)])
            .unwrap_or(natural);
        taken[usize::from(angle)] = true;
        slots.push((id, AttackSlot { angle, ring }));
    }
    slots
}

// ============================================================================
// Formation
// ============================================================================

/// Agents already sent to a formation tile.
#[derive(Debug, Default)]
struct Load {
    vehicle: bool,
    infantry: usize,
    team: Option<TeamId>,
}

/// Destination tile per agent for a group move.
///
/// Tiles are handed out in ring order around the target tile, nearest
/// agents first. Vehicles take a tile each; infantry pack up to one per
/// sub-slot with their own team, and never share with a vehicle.
pub fn formation(ctx: &SimulationContext, agents: &[EntityId], point: Vec2Fixed) -> Vec<(EntityId, Tile)> {
    let center = ctx.nav.tile_of(point);
    let mut order: Vec<(EntityId, AgentClass, TeamId, Vec2Fixed)> = agents
        .iter()
        .filter_map(|id| ctx.entities.agent(*id).map(|a| (*id, a.class, a.team, a.position)))
        .collect();
    order.sort_by_key(|(id, _, _, pos)| (pos.distance_squared(point), *id));

    let radius = ctx.config.formation_search_radius as i32;
    let candidates: Vec<Tile> = std::iter::once(center)
        .chain((1..=radius).flat_map(|r| {
            let mut tiles: Vec<Tile> = ring(center, r).collect();
            tiles.sort_by_key(|t| (octile_distance(center, *t), t.y, t.x));
            tiles
        }))
        .filter(|t| is_standable(&ctx.nav, *t))
        .collect();

    let mut loads: HashMap<Tile, Load> = HashMap::new();

    order
        .into_iter()
        .map(|(id, class, team, _)| {
            let tile = candidates
                .iter()
                .copied()
                .find(|t| {
                    let load = loads.get(t);
                    match (class, load) {
                        (_, None) => true,
                        (AgentClass::Vehicle, Some(_)) => false,
                        (AgentClass::Infantry, Some(l)) => {
                            !l.vehicle && l.infantry < SUBSLOT_COUNT && l.team == Some(team)
                        }
                    }
                })
                .unwrap_or(center);
            let load = loads.entry(tile).or_default();
            match class {
                AgentClass::Vehicle => load.vehicle = true,
                AgentClass::Infantry => load.infantry += 1,
            }
            load.team = Some(team);
            (id, tile)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::Weapon;
    use crate::components::Structure;
    use crate::math::{ratio, Fixed};
    use crate::simulation::Simulation;

    fn at(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_num(x, y) + Vec2Fixed::new(ratio(1, 2), ratio(1, 2))
    }

    fn rifleman(team: TeamId, x: i32, y: i32) -> Agent {
        Agent::new(AgentClass::Infantry, team, at(x, y))
            .with_weapon(Weapon::hitscan(10, Fixed::from_num(3), 10))
    }

    #[test]
    fn test_unknown_agent_rejects_whole_command() {
        let mut sim = Simulation::new(16, 16);
        let a = sim.spawn_agent(rifleman(1, 1, 1)).unwrap();
        let b = sim.spawn_agent(rifleman(1, 2, 1)).unwrap();
        sim.despawn(b).unwrap();

        let err = sim.issue_move(&[a, b], at(8, 8)).unwrap_err();
        assert!(matches!(err, GameError::EntityNotFound(id) if id == b));
        assert_eq!(sim.agent(a).unwrap().order, Order::Idle);
    }

    #[test]
    fn test_new_order_frees_grid_claim() {
        let mut sim = Simulation::new(16, 4);
        let id = sim
            .spawn_agent(Agent::new(AgentClass::Vehicle, 1, at(1, 1)))
            .unwrap();
        sim.issue_move(&[id], at(10, 1)).unwrap();
        sim.tick();
        let tile = sim.agent(id).unwrap().reservation.map(|r| r.tile).unwrap();
        assert_ne!(tile, Tile::new(1, 1));
        assert_eq!(sim.context().occupancy.reservation_owner(tile), Some(id));

        sim.issue_stop(&[id]).unwrap();
        assert_eq!(sim.agent(id).unwrap().reservation, None);
        assert_eq!(sim.context().occupancy.reservation_owner(tile), None);
    }

    #[test]
    fn test_attack_on_friend_needs_force() {
        let mut sim = Simulation::new(16, 16);
        let a = sim.spawn_agent(rifleman(1, 1, 1)).unwrap();
        let friend = sim.spawn_agent(rifleman(1, 3, 1)).unwrap();

        assert!(matches!(
            sim.issue_attack(&[a], friend),
            Err(GameError::InvalidCommand(_))
        ));
        assert_eq!(sim.agent(a).unwrap().order, Order::Idle);

        sim.apply_command(Command::ForceAttack {
            agents: vec![a],
            target: friend,
        })
        .unwrap();
        assert!(matches!(
            sim.agent(a).unwrap().order,
            Order::Attack { forced: true, target, .. } if target == friend
        ));
    }

    #[test]
    fn test_attack_slots_are_distinct_then_ring_inward() {
        let mut sim = Simulation::new(32, 32);
        let target = sim.spawn_agent(rifleman(2, 16, 16)).unwrap();
        let mut ids = Vec::new();
        for i in 0..18 {
            ids.push(sim.spawn_agent(rifleman(1, 2 + (i % 6), 2 + i / 6)).unwrap());
        }
        sim.issue_attack(&ids, target).unwrap();

        let slots: Vec<AttackSlot> = ids
            .iter()
            .filter_map(|id| match sim.agent(*id).unwrap().order {
                Order::Attack { slot, .. } => slot,
                _ => None,
            })
            .collect();
        assert_eq!(slots.len(), 18);
        let first_ring: Vec<u8> = slots.iter().filter(|s| s.ring == 0).map(|s| s.angle).collect();
        assert_eq!(first_ring.len(), 16);
        let mut unique = first_ring.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 16);
        assert_eq!(slots.iter().filter(|s| s.ring == 1).count(), 2);
    }

    #[test]
    fn test_unarmed_agents_are_skipped() {
        let mut sim = Simulation::new(16, 16);
        let armed = sim.spawn_agent(rifleman(1, 1, 1)).unwrap();
        let truck = sim
            .spawn_agent(Agent::new(AgentClass::Vehicle, 1, at(2, 1)))
            .unwrap();
        let enemy = sim.spawn_agent(rifleman(2, 6, 6)).unwrap();

        sim.issue_attack(&[armed, truck], enemy).unwrap();
        assert!(sim.agent(armed).unwrap().order.is_combat());
        assert_eq!(sim.agent(truck).unwrap().order, Order::Idle);
    }

    #[test]
    fn test_formation_spreads_vehicles_and_packs_infantry() {
        let mut sim = Simulation::new(16, 16);
        let tanks: Vec<_> = (0..3)
            .map(|i| sim.spawn_agent(Agent::new(AgentClass::Vehicle, 1, at(1 + i, 1))).unwrap())
            .collect();
        let squad: Vec<_> = (0..4)
            .map(|i| sim.spawn_agent(Agent::new(AgentClass::Infantry, 1, at(1 + i, 12))).unwrap())
            .collect();

        let tiles = formation(sim.context(), &tanks, at(8, 8));
        let mut distinct: Vec<Tile> = tiles.iter().map(|(_, t)| *t).collect();
        distinct.sort_by_key(|t| (t.y, t.x));
        distinct.dedup();
        assert_eq!(distinct.len(), 3);

        let tiles = formation(sim.context(), &squad, at(8, 8));
        assert!(tiles.iter().all(|(_, t)| *t == Tile::new(8, 8)));
    }

    #[test]
    fn test_capture_requires_structure_and_capability() {
        let mut sim = Simulation::new(16, 16);
        let mut engineer = Agent::new(AgentClass::Infantry, 1, at(1, 1));
        engineer.caps.can_capture = true;
        let engineer = sim.spawn_agent(engineer).unwrap();
        let grunt = sim.spawn_agent(rifleman(1, 2, 1)).unwrap();
        let plant = sim
            .spawn_structure(Structure::new(2, Tile::new(6, 6), 2, 2, 400))
            .unwrap();

        sim.apply_command(Command::Capture {
            agents: vec![engineer, grunt],
            structure: plant,
        })
        .unwrap();
        assert_eq!(
            sim.agent(engineer).unwrap().order,
            Order::Capture { structure: plant }
        );
        assert_eq!(sim.agent(grunt).unwrap().order, Order::Idle);

        assert!(matches!(
            sim.apply_command(Command::Capture {
                agents: vec![engineer],
                structure: grunt,
            }),
            Err(GameError::EntityNotFound(_))
        ));
    }
}
