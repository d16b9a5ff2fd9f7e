//! Path following, reservations, bypass steps and stuck recovery.
//!
//! Each agent walks toward the current waypoint of its path. Before
//! crossing into the next tile it must hold a reservation on it; when the
//! reservation fails it tries a one-tile bypass, waits, or retargets. A
//! per-agent stuck timer escalates from repath to settling in place.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::components::{Agent, AgentClass, Path, Reservation, StuckTracker, TeamId};
use crate::entity::EntityId;
use crate::grid::Tile;
use crate::math::{ratio, Fixed, RectFixed, Vec2Fixed};
use crate::occupancy::{is_standable, Mover};
use crate::orders::Order;
use crate::pathfinding::{
    can_step, find_path_avoiding_agents, nearest_open_tile, octile_distance, ring, DIRECTIONS,
};
use crate::simulation::SimulationContext;

/// Score penalty for a bypass on the agent's non-preferred side.
const BYPASS_SIDE_BIAS: u32 = 5;

/// Hand-off to economy logic once a travelling order arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffEvent {
    /// Agent that arrived.
    pub agent: EntityId,
    /// What it arrived to do.
    pub kind: HandoffKind,
    /// Tile it arrived on.
    pub tile: Tile,
}

/// Kind of hand-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandoffKind {
    /// Start harvesting a node.
    Harvest {
        /// Node tile.
        node: Tile,
    },
    /// Start capturing a structure.
    Capture {
        /// Structure.
        structure: EntityId,
    },
    /// Enter a structure for repair.
    RepairEnter {
        /// Structure.
        structure: EntityId,
    },
}

/// Other agents as they stood at the start of the phase.
#[derive(Debug, Clone, Copy)]
struct Neighbour {
    id: EntityId,
    team: TeamId,
    position: Vec2Fixed,
}

/// Read-only data shared by every agent in one motion phase.
struct Frame {
    neighbours: Vec<Neighbour>,
    structures: Vec<RectFixed>,
}

/// World position of a sub-slot inside `tile`. Vehicles use the centre.
#[must_use]
pub fn slot_position(ctx: &SimulationContext, class: AgentClass, tile: Tile, slot: u8) -> Vec2Fixed {
    let center = ctx.nav.tile_center(tile);
    match class {
        AgentClass::Vehicle => center,
        AgentClass::Infantry => {
            let q = ctx.config.subslot_spacing / 2;
            let dx = if slot & 1 == 0 { -q } else { q };
            let dy = if slot & 2 == 0 { -q } else { q };
            center + Vec2Fixed::new(dx, dy)
        }
    }
}

/// Phase three: advance every agent.
pub fn motion_phase(ctx: &mut SimulationContext, handoffs: &mut Vec<HandoffEvent>) {
    drop_orphaned_claims(ctx);
    let frame = Frame {
        neighbours: ctx
            .entities
            .agents()
            .map(|(id, a)| Neighbour {
                id,
                team: a.team,
                position: a.position,
            })
            .collect(),
        structures: ctx
            .entities
            .structures()
            .map(|(_, s)| s.rect(&ctx.nav))
            .collect(),
    };

    for id in ctx.entities.agent_ids() {
        let Some(mut agent) = ctx.entities.agent(id).cloned() else {
            continue;
        };
        step_agent(ctx, &frame, id, &mut agent, handoffs);
        if let Some(slot) = ctx.entities.agent_mut(id) {
            *slot = agent;
        }
    }
}

/// Free grid claims whose owner dropped its reservation earlier this tick,
/// e.g. on a new order from targeting or engagement.
fn drop_orphaned_claims(ctx: &mut SimulationContext) {
    let orphaned: Vec<(Tile, EntityId)> = ctx
        .occupancy
        .reservations()
        .filter(|&(tile, owner)| {
            ctx.entities
                .agent(owner)
                .and_then(|a| a.reservation)
                .map_or(true, |r| r.tile != tile)
        })
        .collect();
    for (tile, owner) in orphaned {
        trace!(agent = %owner, ?tile, "Dropping orphaned claim");
        ctx.occupancy.release(owner, tile);
    }
}

fn step_agent(
    ctx: &mut SimulationContext,
    frame: &Frame,
    id: EntityId,
    agent: &mut Agent,
    handoffs: &mut Vec<HandoffEvent>,
) {
    let start = agent.position;
    let navigating = agent.goal_tile.is_some() || agent.path.is_some();

    if agent.repath_requested {
        plan_path(ctx, id, agent);
    }

    if agent.path.is_some() {
        follow_path(ctx, frame, id, agent, handoffs);
    } else if agent.hold_pos {
        settle(ctx, agent);
    }

    let moved = start.distance(agent.position);
    agent.last_step = moved;
    if moved > Fixed::ZERO {
        agent.facing = (agent.position - start).normalize();
    }

    if navigating && (agent.goal_tile.is_some() || agent.path.is_some()) {
        track_stuck(ctx, id, agent);
    } else {
        agent.stuck = StuckTracker::default();
    }
}

// ============================================================================
// Planning
// ============================================================================

fn plan_path(ctx: &mut SimulationContext, id: EntityId, agent: &mut Agent) {
    let Some(requested) = agent.goal_tile else {
        agent.repath_requested = false;
        return;
    };
    if !agent
        .repaths
        .try_consume(ctx.tick, ctx.config.tick_rate, ctx.config.max_repaths_per_second)
    {
        trace!(agent = %id, "Repath budget exhausted, deferring");
        return;
    }
    agent.repath_requested = false;
    release_reservation(ctx, id, agent);

    let Some(goal) = nearest_open_tile(&ctx.nav, requested, ctx.config.formation_search_radius)
    else {
        path_failed(id, agent);
        return;
    };
    agent.goal_tile = Some(goal);

    let here = ctx.nav.tile_of(agent.position);
    let found = find_path_avoiding_agents(
        &ctx.nav,
        &ctx.occupancy,
        agent.mover(id),
        here,
        goal,
        ctx.config.agent_path_penalty,
    );
    match found {
        Some(mut tiles) => {
            if tiles.len() > 1 {
                tiles.remove(0);
            }
            debug!(
                agent = %id,
                goal = ?goal,
                steps = tiles.len(),
                total = agent.repaths.total,
                "Path planned"
            );
            agent.path = Some(Path::new(tiles));
        }
        None => path_failed(id, agent),
    }
}

/// Unreachable goals are routine: movers give up, fighters stop approaching.
fn path_failed(id: EntityId, agent: &mut Agent) {
    debug!(agent = %id, order = agent.order.name(), "Goal unreachable");
    match agent.order {
        Order::Attack { .. } | Order::ForceFire { .. } => agent.halt(),
        Order::Guard { .. } | Order::GuardReturn { .. } => {
            let anchor = agent.position;
            agent.assign_order(Order::Guard { anchor });
        }
        _ => agent.assign_order(Order::Idle),
    }
}

fn request_repath(ctx: &mut SimulationContext, id: EntityId, agent: &mut Agent) {
    release_reservation(ctx, id, agent);
    agent.path = None;
    agent.repath_requested = agent.goal_tile.is_some();
}

/// Drop the agent's claim. A claim on the tile it already stands in stays
/// in the grid until the next rebuild, which records the agent as standing
/// there; freeing it earlier would let a later agent walk in this tick.
fn release_reservation(ctx: &mut SimulationContext, id: EntityId, agent: &mut Agent) {
    if let Some(reservation) = agent.reservation.take() {
        if reservation.tile != ctx.nav.tile_of(agent.position) {
            ctx.occupancy.release(id, reservation.tile);
        }
    }
}

fn take_reservation(ctx: &SimulationContext, id: EntityId, agent: &mut Agent, tile: Tile) {
    let subslot = match agent.class {
        AgentClass::Vehicle => 0,
        AgentClass::Infantry => ctx.occupancy.free_subslot(id, tile).unwrap_or(0),
    };
    agent.reservation = Some(Reservation { tile, subslot });
}

// ============================================================================
// Path following
// ============================================================================

fn follow_path(
    ctx: &mut SimulationContext,
    frame: &Frame,
    id: EntityId,
    agent: &mut Agent,
    handoffs: &mut Vec<HandoffEvent>,
) {
    let here = ctx.nav.tile_of(agent.position);
    let Some(waypoint) = agent.path.as_ref().and_then(Path::current) else {
        arrive(ctx, id, agent, handoffs);
        return;
    };

    if waypoint != here {
        if !here.is_adjacent(waypoint) || !can_step(&ctx.nav, here, waypoint) {
            trace!(agent = %id, ?here, ?waypoint, "Waypoint no longer reachable in one step");
            request_repath(ctx, id, agent);
            return;
        }
        if agent.reservation.map(|r| r.tile) != Some(waypoint) {
            release_reservation(ctx, id, agent);
            if !claim_next(ctx, id, agent, here, waypoint) {
                return;
            }
        }
    }

    let Some(waypoint) = agent.path.as_ref().and_then(Path::current) else {
        return;
    };
    let slot = if waypoint == here {
        agent.subslot
    } else {
        agent.reservation.map_or(agent.subslot, |r| r.subslot)
    };
    let target = slot_position(ctx, agent.class, waypoint, slot);
    let allowed = agent.reservation.map(|r| r.tile);

    step_toward(ctx, frame, id, agent, here, allowed, target);

    if ctx.nav.tile_of(agent.position) == waypoint {
        agent.subslot = slot;
    }
    if agent.position.distance(target) <= ctx.config.arrival_epsilon {
        agent.position = target;
        release_reservation(ctx, id, agent);
        if let Some(path) = agent.path.as_mut() {
            path.advance();
        }
        if agent.path.as_ref().is_some_and(Path::is_complete) {
            arrive(ctx, id, agent, handoffs);
        }
    }
}

/// Reserve the next tile, or deal with it being taken.
///
/// Returns whether the agent may move this tick.
fn claim_next(
    ctx: &mut SimulationContext,
    id: EntityId,
    agent: &mut Agent,
    here: Tile,
    waypoint: Tile,
) -> bool {
    let mover = agent.mover(id);
    if ctx.occupancy.reserve(&ctx.nav, mover, waypoint) {
        take_reservation(ctx, id, agent, waypoint);
        return true;
    }

    let Some(path) = agent.path.as_ref() else {
        return false;
    };
    if path.is_last() {
        if ctx.occupancy.has_capacity(&ctx.nav, mover, waypoint) {
            trace!(agent = %id, ?waypoint, "Goal reserved by another agent, waiting");
            agent.stuck.waiting = true;
            return false;
        }
        if let Some(alternative) = nearest_enterable(ctx, mover, waypoint, here) {
            debug!(agent = %id, from = ?waypoint, to = ?alternative, "Goal full, retargeting");
            release_reservation(ctx, id, agent);
            agent.set_destination(alternative);
        }
        return false;
    }

    let (Some(next), Some(goal)) = (path.after_current(), path.goal()) else {
        return false;
    };
    let Some(detour) = bypass_tile(ctx, id, mover, here, waypoint, next, goal) else {
        trace!(agent = %id, ?waypoint, "No bypass, waiting");
        return false;
    };
    if !ctx.occupancy.reserve(&ctx.nav, mover, detour) {
        return false;
    }
    trace!(agent = %id, blocked = ?waypoint, ?detour, "Bypass step");
    if let Some(path) = agent.path.as_mut() {
        if detour == next {
            path.advance();
        } else if detour.is_adjacent(next) {
            path.replace_current(detour);
        } else {
            path.insert_before_current(detour);
        }
    }
    take_reservation(ctx, id, agent, detour);
    true
}

/// Best free neighbour to sidestep a blocked waypoint.
///
/// Scored by distance to the goal plus distance to the node after the
/// blocked one; each agent leans to one side, keyed off its handle, so two
/// agents never keep swapping sides.
fn bypass_tile(
    ctx: &SimulationContext,
    id: EntityId,
    mover: Mover,
    here: Tile,
    blocked: Tile,
    next: Tile,
    goal: Tile,
) -> Option<Tile> {
    let forward = (blocked.x - here.x, blocked.y - here.y);
    let prefer_left = id.mix() & 1 == 0;
    DIRECTIONS
        .iter()
        .map(|&(dx, dy)| (here.offset(dx, dy), forward.0 * dy - forward.1 * dx))
        .filter(|&(tile, _)| {
            tile != blocked
                && can_step(&ctx.nav, here, tile)
                && ctx.occupancy.can_enter(&ctx.nav, mover, tile)
        })
        .map(|(tile, cross)| {
            let bias = if cross == 0 || (cross > 0) == prefer_left {
                0
            } else {
                BYPASS_SIDE_BIAS
            };
            (octile_distance(tile, goal) + octile_distance(tile, next) + bias, tile)
        })
        .min_by_key(|&(score, _)| score)
        .map(|(_, tile)| tile)
}

/// Closest standable tile around `around` that `mover` may enter now.
fn nearest_enterable(ctx: &SimulationContext, mover: Mover, around: Tile, from: Tile) -> Option<Tile> {
    (1..=ctx.config.formation_search_radius as i32).find_map(|r| {
        ring(around, r)
            .filter(|t| is_standable(&ctx.nav, *t) && ctx.occupancy.can_enter(&ctx.nav, mover, *t))
            .min_by_key(|t| (octile_distance(*t, around), octile_distance(*t, from), t.y, t.x))
    })
}

/// Move toward `target`, trying separation, then a plain step, then a
/// diagonal crossing through the shared corner, then a step back toward the
/// current tile centre. Every candidate is slid along structures and may
/// only change tile into the reserved one.
fn step_toward(
    ctx: &mut SimulationContext,
    frame: &Frame,
    id: EntityId,
    agent: &mut Agent,
    here: Tile,
    allowed: Option<Tile>,
    target: Vec2Fixed,
) {
    let from = agent.position;
    let step = from.move_toward(target, agent.speed);
    let mut candidates = Vec::with_capacity(4);
    if from.distance(target) > agent.speed * 2 {
        let push = separation(ctx, frame, id, agent);
        if !push.is_zero() {
            candidates.push(step + push);
        }
    }
    candidates.push(step);
    if let Some(corner) = allowed.and_then(|next| shared_corner(ctx, here, next)) {
        // A straight step toward a diagonal tile lands in a side tile near
        // the corner; pass through the corner point itself instead.
        let gap = from.distance(corner);
        candidates.push(if gap > agent.speed {
            from.move_toward(corner, agent.speed)
        } else {
            corner.move_toward(target, agent.speed - gap)
        });
    }
    candidates.push(from.move_toward(ctx.nav.tile_center(here), agent.speed));

    let mut hit_structure = false;
    for candidate in candidates {
        let Some(resolved) = slide_along_structures(frame, from, candidate, agent.radius) else {
            hit_structure = true;
            continue;
        };
        let tile = ctx.nav.tile_of(resolved);
        if tile == here || Some(tile) == allowed {
            agent.position = resolved;
            return;
        }
    }

    if hit_structure {
        local_retarget(ctx, id, agent, here);
    }
}

/// Point where two diagonal neighbours touch.
fn shared_corner(ctx: &SimulationContext, here: Tile, next: Tile) -> Option<Vec2Fixed> {
    if next.x == here.x || next.y == here.y {
        return None;
    }
    let a = ctx.nav.tile_center(here);
    Some(a + (ctx.nav.tile_center(next) - a).scale(ratio(1, 2)))
}

/// Short-range push away from nearby agents, capped per tick.
fn separation(ctx: &SimulationContext, frame: &Frame, id: EntityId, agent: &Agent) -> Vec2Fixed {
    let config = &ctx.config;
    let radius = config.separation_radius;
    let min_distance = ratio(1, 1000);
    let mut push = Vec2Fixed::ZERO;
    for other in &frame.neighbours {
        if other.id == id {
            continue;
        }
        let offset = agent.position - other.position;
        let distance = offset.length();
        if distance <= min_distance || distance >= radius {
            continue;
        }
        let weight = if other.team == agent.team {
            config.separation_ally_weight
        } else {
            config.separation_enemy_weight
        };
        push += offset.scale(weight * (radius - distance) / (radius * distance));
    }
    push.clamp_length(config.separation_cap)
}

/// Resolve a step against padded structure footprints.
///
/// Footprints the agent already overlaps are ignored so it can walk out.
/// Returns `None` when no slide clears every footprint.
fn slide_along_structures(
    frame: &Frame,
    from: Vec2Fixed,
    to: Vec2Fixed,
    radius: Fixed,
) -> Option<Vec2Fixed> {
    let blockers: Vec<RectFixed> = frame
        .structures
        .iter()
        .map(|r| r.expand(radius))
        .filter(|r| !r.contains_strict(from))
        .collect();
    let clear = |p: Vec2Fixed| !blockers.iter().any(|r| r.contains_strict(p));
    if clear(to) {
        return Some(to);
    }
    let slide = (to - from).perp().scale(ratio(1, 2));
    [
        to + slide,
        to - slide,
        Vec2Fixed::new(to.x, from.y),
        Vec2Fixed::new(from.x, to.y),
    ]
    .into_iter()
    .find(|p| clear(*p))
}

/// Swap the blocked waypoint for the nearest open neighbour.
fn local_retarget(ctx: &mut SimulationContext, id: EntityId, agent: &mut Agent, here: Tile) {
    let Some(blocked) = agent.path.as_ref().and_then(Path::current) else {
        return;
    };
    let mover = agent.mover(id);
    let replacement = DIRECTIONS
        .iter()
        .map(|&(dx, dy)| here.offset(dx, dy))
        .filter(|t| can_step(&ctx.nav, here, *t) && ctx.occupancy.can_enter(&ctx.nav, mover, *t))
        .min_by_key(|t| octile_distance(*t, blocked));
    if let Some(tile) = replacement {
        trace!(agent = %id, ?blocked, ?tile, "Corner slide failed, retargeting waypoint");
        release_reservation(ctx, id, agent);
        if let Some(path) = agent.path.as_mut() {
            path.replace_current(tile);
        }
    }
}

/// Pull a settled agent back onto its slot without teleporting.
fn settle(ctx: &SimulationContext, agent: &mut Agent) {
    let here = ctx.nav.tile_of(agent.position);
    let slot = slot_position(ctx, agent.class, here, agent.subslot);
    agent.position = agent.position.move_toward(slot, ctx.config.settle_cap);
}

// ============================================================================
// Arrival and stuck recovery
// ============================================================================

fn arrive(
    ctx: &mut SimulationContext,
    id: EntityId,
    agent: &mut Agent,
    handoffs: &mut Vec<HandoffEvent>,
) {
    release_reservation(ctx, id, agent);
    agent.halt();
    let tile = ctx.nav.tile_of(agent.position);
    let handoff = match agent.order {
        Order::Move { .. } => {
            agent.assign_order(Order::Idle);
            None
        }
        Order::AttackMove { .. } => {
            let anchor = agent.position;
            agent.assign_order(Order::Guard { anchor });
            None
        }
        Order::GuardReturn { anchor } => {
            agent.assign_order(Order::Guard { anchor });
            None
        }
        Order::Harvest { node } => Some(HandoffKind::Harvest { node }),
        Order::Capture { structure } => Some(HandoffKind::Capture { structure }),
        Order::RepairEnter { structure } => Some(HandoffKind::RepairEnter { structure }),
        _ => None,
    };
    if let Some(kind) = handoff {
        handoffs.push(HandoffEvent {
            agent: id,
            kind,
            tile,
        });
        agent.assign_order(Order::Idle);
    }
    if agent.class == AgentClass::Infantry {
        agent.hold_pos = true;
    }
    debug!(agent = %id, ?tile, order = agent.order.name(), "Arrived");
}

fn track_stuck(ctx: &mut SimulationContext, id: EntityId, agent: &mut Agent) {
    let waypoint = agent.path.as_ref().and_then(Path::current).or(agent.goal_tile);
    let remaining = agent.path.as_ref().map_or(0, |p| p.remaining().len() as u32);
    let distance = waypoint.map_or(Fixed::ZERO, |tile| {
        let slot = agent
            .reservation
            .filter(|r| r.tile == tile)
            .map_or(agent.subslot, |r| r.subslot);
        agent.position.distance(slot_position(ctx, agent.class, tile, slot))
    });
    let Some(ticks) = agent
        .stuck
        .observe(waypoint, remaining, distance, ctx.config.stuck_epsilon)
    else {
        return;
    };

    if ticks == ctx.config.stuck_bypass_ticks {
        debug!(agent = %id, ticks, "Stuck, requesting repath");
        request_repath(ctx, id, agent);
    } else if ticks >= ctx.config.stuck_settle_ticks {
        release_reservation(ctx, id, agent);
        agent.halt();
        if agent.order.is_combat() {
            // Dropping a fight here would leave backliners dancing; replan
            // from one ring further in instead.
            debug!(agent = %id, ticks, "Stuck in combat, forcing replan");
            agent.engagement.force_repath = true;
            if let Some(seed) = agent.engagement.seed.as_mut() {
                seed.ring = (seed.ring + 1).min(ctx.config.max_rings);
            }
            return;
        }
        let here = ctx.nav.tile_of(agent.position);
        agent.position = slot_position(ctx, agent.class, here, agent.subslot);
        match agent.order {
            Order::Idle | Order::Guard { .. } => {}
            Order::GuardReturn { .. } => {
                let anchor = agent.position;
                agent.assign_order(Order::Guard { anchor });
            }
            _ => agent.assign_order(Order::Idle),
        }
        if agent.class == AgentClass::Infantry {
            agent.hold_pos = true;
        }
        debug!(agent = %id, ticks, ?here, "Stuck, settled in place");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::Simulation;

    fn center(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_num(x, y) + Vec2Fixed::new(ratio(1, 2), ratio(1, 2))
    }

    #[test]
    fn test_slot_positions_are_spaced() {
        let sim = Simulation::new(4, 4);
        let ctx = sim.context();
        let tile = Tile::new(1, 1);
        let slots: Vec<_> = (0..4)
            .map(|s| slot_position(ctx, AgentClass::Infantry, tile, s))
            .collect();
        for (i, a) in slots.iter().enumerate() {
            assert_eq!(ctx.nav.tile_of(*a), tile);
            for b in &slots[i + 1..] {
                assert!(a.distance(*b) >= ctx.config.subslot_spacing - ratio(1, 10_000));
            }
        }
        assert_eq!(
            slot_position(ctx, AgentClass::Vehicle, tile, 3),
            ctx.nav.tile_center(tile)
        );
    }

    #[test]
    fn test_single_vehicle_reaches_goal_and_stops() {
        let mut sim = Simulation::new(16, 16);
        let id = sim
            .spawn_agent(Agent::new(AgentClass::Vehicle, 1, center(1, 1)))
            .unwrap();
        sim.issue_move(&[id], center(8, 5)).unwrap();
        for _ in 0..200 {
            sim.tick();
        }
        let agent = sim.agent(id).unwrap();
        assert_eq!(agent.order, Order::Idle);
        assert_eq!(agent.position, center(8, 5));
        assert!(agent.path.is_none());
    }

    #[test]
    fn test_bypass_prefers_neighbour_toward_next_node() {
        let mut sim = Simulation::new(8, 8);
        let id = sim
            .spawn_agent(Agent::new(AgentClass::Vehicle, 1, center(1, 3)))
            .unwrap();
        let ctx = sim.context();
        let mover = sim.agent(id).unwrap().mover(id);
        let tile = bypass_tile(
            ctx,
            id,
            mover,
            Tile::new(1, 3),
            Tile::new(2, 3),
            Tile::new(3, 3),
            Tile::new(6, 3),
        )
        .unwrap();
        assert!(tile == Tile::new(2, 2) || tile == Tile::new(2, 4));
    }

    #[test]
    fn test_diagonal_step_crosses_at_corner() {
        let mut sim = Simulation::new(10, 10);
        let start = Vec2Fixed::new(ratio(398, 100), ratio(692, 100));
        let id = sim
            .spawn_agent(Agent::new(AgentClass::Infantry, 1, start))
            .unwrap();
        let goal = Tile::new(4, 7);
        sim.issue_move(&[id], center(4, 7)).unwrap();

        for _ in 0..40 {
            sim.tick();
            let tile = sim.context().nav.tile_of(sim.agent(id).unwrap().position);
            assert!(tile == Tile::new(3, 6) || tile == goal, "cut through {tile:?}");
        }
        let agent = sim.agent(id).unwrap();
        assert_eq!(agent.order, Order::Idle);
        assert_eq!(sim.context().nav.tile_of(agent.position), goal);
    }

    #[test]
    fn test_claim_dropped_by_new_order_is_freed_same_tick() {
        let mut sim = Simulation::new(8, 8);
        let a = sim
            .spawn_agent(Agent::new(AgentClass::Vehicle, 1, center(1, 1)))
            .unwrap();
        let b = sim
            .spawn_agent(Agent::new(AgentClass::Vehicle, 1, center(3, 1)))
            .unwrap();
        let tile = Tile::new(2, 1);

        let ctx = sim.context_mut();
        ctx.rebuild_occupancy();
        let mover = ctx.entities.agent(a).unwrap().mover(a);
        assert!(ctx.occupancy.reserve(&ctx.nav, mover, tile));
        // A new order forgets the claim on the agent side only.
        ctx.entities.agent_mut(a).unwrap().assign_order(Order::Idle);
        ctx.entities.agent_mut(b).unwrap().set_destination(tile);

        motion_phase(ctx, &mut Vec::new());
        assert_eq!(ctx.occupancy.reservation_owner(tile), Some(b));
        let agent = ctx.entities.agent(b).unwrap();
        assert_eq!(agent.reservation.map(|r| r.tile), Some(tile));
    }

    #[test]
    fn test_slide_along_structure_edge() {
        let frame = Frame {
            neighbours: Vec::new(),
            structures: vec![RectFixed::new(
                Vec2Fixed::from_num(2, 0),
                Vec2Fixed::from_num(4, 2),
            )],
        };
        let from = Vec2Fixed::new(ratio(3, 2), ratio(5, 2));
        let to = from + Vec2Fixed::new(ratio(1, 10), -ratio(1, 10));
        let radius = ratio(7, 20);
        let resolved = slide_along_structures(&frame, from, to, radius).unwrap();
        let padded = frame.structures[0].expand(radius);
        assert!(!padded.contains_strict(resolved));
    }
}
