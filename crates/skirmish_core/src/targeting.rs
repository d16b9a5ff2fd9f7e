//! Target validation, acquisition and order transitions.
//!
//! Runs as the second phase of a tick, after the occupancy rebuild and
//! before motion. Targets are weak handles; every lookup goes through the
//! entity store and a dead or missing target is dropped on the spot.

use tracing::debug;

use crate::components::{are_hostile, Agent, AgentClass, TargetKind, TeamId};
use crate::engagement::{self, GoalClaims};
use crate::entity::{Entity, EntityId};
use crate::grid::Tile;
use crate::math::{Fixed, RectFixed, Vec2Fixed};
use crate::occupancy::is_standable;
use crate::orders::{Order, Resume};
use crate::pathfinding::nearest_open_tile;
use crate::simulation::SimulationContext;

// ============================================================================
// Target geometry
// ============================================================================

/// Collision shape of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetShape {
    /// Agent body.
    Circle {
        /// Centre.
        center: Vec2Fixed,
        /// Radius.
        radius: Fixed,
    },
    /// Structure footprint.
    Rect(RectFixed),
    /// Ground point.
    Point(Vec2Fixed),
}

impl TargetShape {
    /// Centre of the shape.
    #[must_use]
    pub fn center(self) -> Vec2Fixed {
        match self {
            Self::Circle { center, .. } | Self::Point(center) => center,
            Self::Rect(rect) => rect.center(),
        }
    }

    /// Distance from `from` to the shape's edge; zero when inside.
    #[must_use]
    pub fn edge_distance(self, from: Vec2Fixed) -> Fixed {
        match self {
            Self::Circle { center, radius } => (from.distance(center) - radius).max(Fixed::ZERO),
            Self::Rect(rect) => rect.distance_to(from),
            Self::Point(point) => from.distance(point),
        }
    }
}

/// Snapshot of a live, targetable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    /// Handle.
    pub id: EntityId,
    /// Owning team.
    pub team: TeamId,
    /// Classification for doctrine filters.
    pub kind: TargetKind,
    /// Collision shape.
    pub shape: TargetShape,
    /// Tile the target stands on (footprint origin for structures).
    pub tile: Tile,
    /// Distance moved last tick.
    pub speed: Fixed,
    /// Hidden from distant enemies.
    pub cloaked: bool,
}

impl TargetInfo {
    /// Effective distance used for range checks.
    #[must_use]
    pub fn distance_from(&self, from: Vec2Fixed) -> Fixed {
        self.shape.edge_distance(from)
    }

    /// Whether `viewer` on `viewer_team` at `from` could auto-acquire this.
    fn visible_to(&self, viewer_team: TeamId, from: Vec2Fixed, ctx: &SimulationContext) -> bool {
        are_hostile(viewer_team, self.team)
            && (!self.cloaked || self.distance_from(from) <= ctx.config.cloak_reveal_radius)
    }
}

/// Look up a live target. Dead entities and unattackable structures are
/// not targets.
#[must_use]
pub fn target_info(ctx: &SimulationContext, id: EntityId) -> Option<TargetInfo> {
    match ctx.entities.get(id)? {
        Entity::Agent(agent) if !agent.health.is_dead() => Some(TargetInfo {
            id,
            team: agent.team,
            kind: agent.class.target_kind(),
            shape: TargetShape::Circle {
                center: agent.position,
                radius: agent.radius,
            },
            tile: ctx.nav.tile_of(agent.position),
            speed: agent.last_step,
            cloaked: agent.is_cloaked(),
        }),
        Entity::Structure(structure) if structure.attackable && !structure.health.is_dead() => {
            Some(TargetInfo {
                id,
                team: structure.team,
                kind: TargetKind::Structure,
                shape: TargetShape::Rect(structure.rect(&ctx.nav)),
                tile: structure.origin,
                speed: Fixed::ZERO,
                cloaked: false,
            })
        }
        _ => None,
    }
}

/// Aim shape of an agent's current order, if it has one.
#[must_use]
pub fn order_aim(ctx: &SimulationContext, order: &Order) -> Option<(Option<TargetInfo>, TargetShape)> {
    match *order {
        Order::Attack { target, .. } => target_info(ctx, target).map(|info| (Some(info), info.shape)),
        Order::ForceFire { point } => Some((None, TargetShape::Point(point))),
        _ => None,
    }
}

// ============================================================================
// Phase
// ============================================================================

/// Phase two: validate targets, auto-acquire, apply order transitions and
/// plan combat approaches.
pub fn targeting_phase(ctx: &mut SimulationContext) {
    let mut claims = GoalClaims::from_agents(&ctx.entities);

    for id in ctx.entities.agent_ids() {
        let Some(mut agent) = ctx.entities.agent(id).cloned() else {
            continue;
        };
        agent.just_fired = false;

        validate_target(ctx, id, &mut agent);
        if agent.weapon().is_some() {
            acquire(ctx, id, &mut agent);
            enforce_leash(ctx, id, &mut agent);
        }
        ensure_navigation(ctx, id, &mut agent);
        if agent.order.is_combat() {
            engagement::update(ctx, id, &mut agent, &mut claims);
        }

        if let Some(slot) = ctx.entities.agent_mut(id) {
            *slot = agent;
        }
    }
}

/// Drop a target that died, vanished or turned friendly.
fn validate_target(ctx: &SimulationContext, id: EntityId, agent: &mut Agent) {
    let Order::Attack {
        target,
        resume,
        manual,
        forced,
        ..
    } = agent.order
    else {
        return;
    };

    let lost = match target_info(ctx, target) {
        None => true,
        Some(info) if !forced && !are_hostile(agent.team, info.team) => true,
        Some(info) if !manual => {
            let reach = agent.caps.vision.max(agent.weapon().map_or(Fixed::ZERO, |w| w.range))
                + ctx.config.hold_exit_margin;
            let distance = info.distance_from(agent.position);
            distance > reach || (info.cloaked && distance > ctx.config.cloak_reveal_radius)
        }
        Some(_) => false,
    };

    if lost {
        let next = resume.into_order();
        debug!(agent = %id, target = %target, next = next.name(), "Target lost");
        agent.assign_order(next);
        if agent.class == AgentClass::Infantry {
            agent.hold_pos = true;
        }
    }
}

/// Automatic target choice for orders that permit it.
fn acquire(ctx: &SimulationContext, id: EntityId, agent: &mut Agent) {
    let (resume, switching_from) = match agent.order {
        order if order.allows_auto_engage() => (order.resume_point(), None),
        Order::GuardReturn { anchor } => {
            // Walking home only answers fire.
            if let Some(info) = retaliation_target(ctx, agent) {
                engage(id, agent, info.id, Resume::Guard(anchor));
            }
            return;
        }
        Order::Attack {
            target,
            resume,
            manual: false,
            forced: false,
            ..
        } => (resume, Some(target)),
        _ => return,
    };

    if let Some(current) = switching_from {
        // Only auto-picked structure targets give way to closer units.
        let Some(info) = target_info(ctx, current) else {
            return;
        };
        if info.kind != TargetKind::Structure {
            return;
        }
        let structure_distance = info.distance_from(agent.position);
        if let Some((unit, distance)) = nearest_enemy(ctx, id, agent, false) {
            if distance < structure_distance {
                debug!(agent = %id, from = %current, to = %unit.id, "Switching to closer unit");
                engage(id, agent, unit.id, resume);
            }
        }
        return;
    }

    let choice = retaliation_target(ctx, agent)
        .or_else(|| nearest_enemy(ctx, id, agent, true).map(|(info, _)| info));
    if let Some(info) = choice {
        engage(id, agent, info.id, resume);
    }
}

fn engage(id: EntityId, agent: &mut Agent, target: EntityId, resume: Resume) {
    debug!(agent = %id, target = %target, from = agent.order.name(), "Target acquired");
    agent.assign_order(Order::Attack {
        target,
        resume,
        manual: false,
        forced: false,
        slot: None,
    });
}

/// Last attacker, if it is still a legal automatic target.
fn retaliation_target(ctx: &SimulationContext, agent: &Agent) -> Option<TargetInfo> {
    let info = target_info(ctx, agent.last_attacker?)?;
    let in_vision = info.distance_from(agent.position) <= agent.caps.vision;
    (in_vision
        && agent.caps.doctrine.permits(info.kind)
        && info.visible_to(agent.team, agent.position, ctx))
    .then_some(info)
}

/// Nearest hostile in vision that the agent's doctrine permits.
///
/// Ties go to the lower handle.
fn nearest_enemy(
    ctx: &SimulationContext,
    id: EntityId,
    agent: &Agent,
    include_structures: bool,
) -> Option<(TargetInfo, Fixed)> {
    let mut best: Option<(TargetInfo, Fixed)> = None;
    for other in ctx.entities.ids() {
        if other == id {
            continue;
        }
        let Some(info) = target_info(ctx, other) else {
            continue;
        };
        if info.kind == TargetKind::Structure && !include_structures {
            continue;
        }
        if !agent.caps.doctrine.permits(info.kind) || !info.visible_to(agent.team, agent.position, ctx)
        {
            continue;
        }
        let distance = info.distance_from(agent.position);
        if distance > agent.caps.vision {
            continue;
        }
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((info, distance));
        }
    }
    best
}

/// Guards abandon a chase that drags them too far from their anchor.
fn enforce_leash(ctx: &SimulationContext, id: EntityId, agent: &mut Agent) {
    if let Order::Attack {
        resume: Resume::Guard(anchor),
        manual: false,
        ..
    } = agent.order
    {
        if agent.position.distance(anchor) > ctx.config.guard_leash {
            debug!(agent = %id, "Guard leash reached, returning");
            agent.assign_order(Order::GuardReturn { anchor });
        }
    }
}

/// Give travelling orders a destination when they lack one.
fn ensure_navigation(ctx: &SimulationContext, id: EntityId, agent: &mut Agent) {
    if agent.goal_tile.is_some() || agent.path.is_some() {
        return;
    }
    let here = ctx.nav.tile_of(agent.position);
    let goal = match agent.order {
        Order::Move { goal } | Order::AttackMove { goal } | Order::Harvest { node: goal } => goal,
        Order::GuardReturn { anchor } => {
            let tile = ctx.nav.tile_of(anchor);
            if tile == here {
                debug!(agent = %id, "Back at guard anchor");
                agent.assign_order(Order::Guard { anchor });
                return;
            }
            tile
        }
        Order::Capture { structure } | Order::RepairEnter { structure } => {
            match structure_approach_tile(ctx, structure, agent.position) {
                Some(tile) => tile,
                None => {
                    debug!(agent = %id, "Hand-off structure gone");
                    agent.assign_order(Order::Idle);
                    return;
                }
            }
        }
        _ => return,
    };
    let goal = nearest_open_tile(&ctx.nav, goal, ctx.config.formation_search_radius).unwrap_or(goal);
    agent.set_destination(goal);
}

/// Standable tile next to a structure's footprint closest to `from`.
#[must_use]
pub fn structure_approach_tile(
    ctx: &SimulationContext,
    structure: EntityId,
    from: Vec2Fixed,
) -> Option<Tile> {
    let s = ctx.entities.structure(structure)?;
    let (w, h) = (s.width as i32, s.height as i32);
    (-1..=h)
        .flat_map(|dy| (-1..=w).map(move |dx| s.origin.offset(dx, dy)))
        .filter(|t| !s.covers(*t) && is_standable(&ctx.nav, *t))
        .min_by_key(|t| (ctx.nav.tile_center(*t).distance_squared(from), t.y, t.x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::Weapon;
    use crate::components::{Doctrine, Structure};
    use crate::simulation::Simulation;

    fn rifle() -> Weapon {
        Weapon::hitscan(10, Fixed::from_num(3), 10)
    }

    fn soldier(team: TeamId, x: i32, y: i32) -> Agent {
        Agent::new(AgentClass::Infantry, team, Vec2Fixed::from_num(x, y) + half())
            .with_weapon(rifle())
    }

    fn half() -> Vec2Fixed {
        Vec2Fixed::new(Fixed::ONE / 2, Fixed::ONE / 2)
    }

    #[test]
    fn test_idle_acquires_nearest_enemy() {
        let mut sim = Simulation::new(16, 16);
        let me = sim.spawn_agent(soldier(1, 2, 2)).unwrap();
        let _far = sim.spawn_agent(soldier(2, 7, 2)).unwrap();
        let near = sim.spawn_agent(soldier(2, 5, 2)).unwrap();

        targeting_phase(sim.context_mut());
        assert_eq!(sim.agent(me).unwrap().order.target(), Some(near));
    }

    #[test]
    fn test_equal_distance_prefers_lower_handle() {
        let mut sim = Simulation::new(16, 16);
        let me = sim.spawn_agent(soldier(1, 5, 5)).unwrap();
        let first = sim.spawn_agent(soldier(2, 8, 5)).unwrap();
        let _second = sim.spawn_agent(soldier(2, 2, 5)).unwrap();

        targeting_phase(sim.context_mut());
        assert_eq!(sim.agent(me).unwrap().order.target(), Some(first));
    }

    #[test]
    fn test_retaliation_beats_nearest() {
        let mut sim = Simulation::new(16, 16);
        let me = sim.spawn_agent(soldier(1, 2, 2)).unwrap();
        let _near = sim.spawn_agent(soldier(2, 4, 2)).unwrap();
        let shooter = sim.spawn_agent(soldier(2, 2, 6)).unwrap();
        sim.context_mut().entities.agent_mut(me).unwrap().last_attacker = Some(shooter);

        targeting_phase(sim.context_mut());
        assert_eq!(sim.agent(me).unwrap().order.target(), Some(shooter));
    }

    #[test]
    fn test_sniper_ignores_vehicles_and_structures() {
        let mut sim = Simulation::new(16, 16);
        let sniper = sim
            .spawn_agent(soldier(1, 2, 2).with_doctrine(Doctrine::Sniper))
            .unwrap();
        sim.spawn_agent(Agent::new(AgentClass::Vehicle, 2, Vec2Fixed::from_num(4, 2) + half()))
            .unwrap();
        sim.spawn_structure(Structure::new(2, Tile::new(2, 4), 2, 2, 500)).unwrap();

        targeting_phase(sim.context_mut());
        assert_eq!(sim.agent(sniper).unwrap().order, Order::Idle);

        let infantry = sim.spawn_agent(soldier(2, 6, 2)).unwrap();
        targeting_phase(sim.context_mut());
        assert_eq!(sim.agent(sniper).unwrap().order.target(), Some(infantry));
    }

    #[test]
    fn test_dead_target_resumes_attack_move() {
        let mut sim = Simulation::new(16, 16);
        let me = sim.spawn_agent(soldier(1, 2, 2)).unwrap();
        let enemy = sim.spawn_agent(soldier(2, 4, 2)).unwrap();
        let goal = Tile::new(12, 2);
        sim.context_mut().entities.agent_mut(me).unwrap().order = Order::Attack {
            target: enemy,
            resume: Resume::AttackMove(goal),
            manual: false,
            forced: false,
            slot: None,
        };
        sim.despawn(enemy).unwrap();

        targeting_phase(sim.context_mut());
        let agent = sim.agent(me).unwrap();
        assert_eq!(agent.order, Order::AttackMove { goal });
        assert_eq!(agent.goal_tile, Some(goal));
    }

    #[test]
    fn test_auto_structure_target_switches_to_closer_unit() {
        let mut sim = Simulation::new(16, 16);
        let me = sim.spawn_agent(soldier(1, 2, 2)).unwrap();
        let building = sim
            .spawn_structure(Structure::new(2, Tile::new(6, 1), 2, 2, 500))
            .unwrap();
        sim.context_mut().entities.agent_mut(me).unwrap().order = Order::Attack {
            target: building,
            resume: Resume::Idle,
            manual: false,
            forced: false,
            slot: None,
        };
        let unit = sim.spawn_agent(soldier(2, 2, 4)).unwrap();

        targeting_phase(sim.context_mut());
        assert_eq!(sim.agent(me).unwrap().order.target(), Some(unit));
    }

    #[test]
    fn test_manual_attack_is_never_switched() {
        let mut sim = Simulation::new(16, 16);
        let me = sim.spawn_agent(soldier(1, 2, 2)).unwrap();
        let building = sim
            .spawn_structure(Structure::new(2, Tile::new(6, 1), 2, 2, 500))
            .unwrap();
        sim.issue_attack(&[me], building).unwrap();
        sim.spawn_agent(soldier(2, 2, 4)).unwrap();

        targeting_phase(sim.context_mut());
        assert_eq!(sim.agent(me).unwrap().order.target(), Some(building));
    }

    #[test]
    fn test_cloaked_idle_agent_hidden_beyond_reveal_radius() {
        let mut sim = Simulation::new(16, 16);
        let me = sim.spawn_agent(soldier(1, 2, 2)).unwrap();
        let mut sneaky = soldier(2, 6, 2);
        sneaky.caps.cloak_when_idle = true;
        let sneaky = sim.spawn_agent(sneaky).unwrap();

        targeting_phase(sim.context_mut());
        // The cloaked agent may itself acquire, so look only at ours.
        assert_eq!(sim.agent(me).unwrap().order, Order::Idle);

        let pos = Vec2Fixed::from_num(3, 2) + half();
        sim.context_mut().entities.agent_mut(sneaky).unwrap().position = pos;
        sim.context_mut().entities.agent_mut(sneaky).unwrap().order = Order::Idle;
        targeting_phase(sim.context_mut());
        assert_eq!(sim.agent(me).unwrap().order.target(), Some(sneaky));
    }

    #[test]
    fn test_guard_leash_returns_home() {
        let mut sim = Simulation::new(32, 32);
        let me = sim.spawn_agent(soldier(1, 20, 2)).unwrap();
        let enemy = sim.spawn_agent(soldier(2, 22, 2)).unwrap();
        let anchor = Vec2Fixed::from_num(2, 2) + half();
        sim.context_mut().entities.agent_mut(me).unwrap().order = Order::Attack {
            target: enemy,
            resume: Resume::Guard(anchor),
            manual: false,
            forced: false,
            slot: None,
        };

        targeting_phase(sim.context_mut());
        let agent = sim.agent(me).unwrap();
        assert_eq!(agent.order, Order::GuardReturn { anchor });
        assert_eq!(agent.goal_tile, Some(Tile::new(2, 2)));
    }

    #[test]
    fn test_structure_approach_tile_borders_footprint() {
        let mut sim = Simulation::new(16, 16);
        let building = sim
            .spawn_structure(Structure::new(1, Tile::new(5, 5), 2, 2, 100))
            .unwrap();
        let tile = structure_approach_tile(sim.context(), building, Vec2Fixed::from_num(0, 0))
            .unwrap();
        assert_eq!(tile, Tile::new(4, 4));
    }
}
