//! Standoff selection and hold/approach hysteresis.
//!
//! An engaging agent keeps a stable compass bearing per target and walks to
//! a tile on a ring around it. Rings shrink inward when the outer one is
//! full. Once inside weapon range it holds until it drifts out past range
//! plus a margin.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::components::{Agent, AgentClass, AngularSeed};
use crate::entity::{EntityId, EntityStorage};
use crate::grid::Tile;
use crate::math::{ratio, Fixed, Vec2Fixed};
use crate::occupancy::{is_standable, SUBSLOT_COUNT};
use crate::simulation::SimulationContext;
use crate::targeting::{order_aim, TargetShape};

/// Number of compass bearings.
pub const COMPASS_POINTS: u8 = 16;

// Unit vectors in 1/10000ths, counter-clockwise from east.
const COMPASS: [(i32, i32); COMPASS_POINTS as usize] = [
    (10000, 0),
    (9239, 3827),
    (7071, 7071),
    (3827, 9239),
    (0, 10000),
    (-3827, 9239),
    (-7071, 7071),
    (-9239, 3827),
    (-10000, 0),
    (-9239, -3827),
    (-7071, -7071),
    (-3827, -9239),
    (0, -10000),
    (3827, -9239),
    (7071, -7071),
    (9239, -3827),
];

/// Unit vector of a compass bearing.
#[must_use]
pub fn compass_dir(index: u8) -> Vec2Fixed {
    let (x, y) = COMPASS[usize::from(index % COMPASS_POINTS)];
    Vec2Fixed::new(ratio(x, 10000), ratio(y, 10000))
}

/// Bearing closest to `v`. Ties go to the lower index; zero maps to east.
#[must_use]
pub fn compass_index(v: Vec2Fixed) -> u8 {
    (0..COMPASS_POINTS)
        .map(|i| (i, v.dot(compass_dir(i))))
        .fold((0, Fixed::MIN), |best, (i, d)| if d > best.1 { (i, d) } else { best })
        .0
}

/// Rotate a bearing by `steps`, wrapping around.
#[must_use]
pub fn compass_add(index: u8, steps: i32) -> u8 {
    (i32::from(index) + steps).rem_euclid(i32::from(COMPASS_POINTS)) as u8
}

/// Per-agent spread in `[-span, span]` compass steps.
#[must_use]
pub fn jitter(id: EntityId, span: u8) -> i32 {
    let width = 2 * u32::from(span) + 1;
    (id.mix() % width) as i32 - i32::from(span)
}

// ============================================================================
// Goal claims
// ============================================================================

/// Tiles already chosen as destinations this phase.
///
/// A vehicle claims a whole tile; infantry claim one sub-slot each.
#[derive(Debug, Clone, Default)]
pub struct GoalClaims {
    weight: HashMap<Tile, usize>,
}

impl GoalClaims {
    fn class_weight(class: AgentClass) -> usize {
        match class {
            AgentClass::Vehicle => SUBSLOT_COUNT,
            AgentClass::Infantry => 1,
        }
    }

    /// Claims from every agent's current destination.
    #[must_use]
    pub fn from_agents(entities: &EntityStorage) -> Self {
        let mut claims = Self::default();
        for (_, agent) in entities.agents() {
            if let Some(goal) = agent.goal_tile {
                claims.claim(goal, agent.class);
            }
        }
        claims
    }

    /// Whether `class` still fits on `tile`.
    #[must_use]
    pub fn admits(&self, tile: Tile, class: AgentClass) -> bool {
        self.weight.get(&tile).copied().unwrap_or(0) + Self::class_weight(class) <= SUBSLOT_COUNT
    }

    /// Add a claim.
    pub fn claim(&mut self, tile: Tile, class: AgentClass) {
        *self.weight.entry(tile).or_insert(0) += Self::class_weight(class);
    }

    /// Remove a claim.
    pub fn release(&mut self, tile: Tile, class: AgentClass) {
        if let Some(w) = self.weight.get_mut(&tile) {
            *w = w.saturating_sub(Self::class_weight(class));
        }
    }
}

// ============================================================================
// Standoff search
// ============================================================================

/// Everything the standoff search needs to know about the attacker.
#[derive(Debug, Clone, Copy)]
pub struct Attacker {
    /// Handle.
    pub id: EntityId,
    /// Movement class.
    pub class: AgentClass,
    /// Team.
    pub team: crate::components::TeamId,
    /// Tile it stands on.
    pub tile: Tile,
    /// Weapon range.
    pub range: Fixed,
}

/// A chosen firing position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standoff {
    /// Destination tile.
    pub tile: Tile,
    /// Ring the tile was found on.
    pub ring: u8,
    /// Bearing the tile was found on.
    pub angle: u8,
}

/// Offsets tried around the seed bearing, nearest first.
const PROBES: [i32; 7] = [0, 1, -1, 2, -2, 3, -3];

/// Search rings inward from `seed.ring` for a free, standable tile whose
/// centre puts the target within range.
#[must_use]
pub fn find_standoff(
    ctx: &SimulationContext,
    attacker: Attacker,
    target: TargetShape,
    seed: AngularSeed,
    claims: &GoalClaims,
) -> Option<Standoff> {
    let config = &ctx.config;
    let mover = crate::occupancy::Mover {
        id: attacker.id,
        class: attacker.class,
        team: attacker.team,
    };
    let slot_reach = match attacker.class {
        AgentClass::Vehicle => Fixed::ZERO,
        AgentClass::Infantry => config.subslot_spacing,
    };
    let base = attacker.range * config.standoff_range_factor
        + match target {
            TargetShape::Circle { radius, .. } => radius,
            TargetShape::Rect(_) | TargetShape::Point(_) => Fixed::ZERO,
        };

    for ring in seed.ring..=config.max_rings {
        let raw = base - config.ring_step * Fixed::from_num(ring);
        let distance = raw.max(config.min_standoff);
        for offset in PROBES {
            let angle = compass_add(seed.angle, offset);
            let point = standoff_point(target, compass_dir(angle), distance);
            let tile = ctx.nav.tile_of(point);
            if !is_standable(&ctx.nav, tile) {
                continue;
            }
            if tile != attacker.tile && !ctx.occupancy.can_enter(&ctx.nav, mover, tile) {
                continue;
            }
            if !claims.admits(tile, attacker.class) {
                continue;
            }
            if target.edge_distance(ctx.nav.tile_center(tile)) + slot_reach > attacker.range {
                continue;
            }
            return Some(Standoff { tile, ring, angle });
        }
        if raw <= config.min_standoff {
            break;
        }
    }
    None
}

/// World point at `distance` from the target along `dir`.
///
/// Structures use the nearest point of the footprint grown by `distance`.
#[must_use]
pub fn standoff_point(target: TargetShape, dir: Vec2Fixed, distance: Fixed) -> Vec2Fixed {
    match target {
        TargetShape::Circle { center, .. } | TargetShape::Point(center) => {
            center + dir.scale(distance)
        }
        TargetShape::Rect(rect) => {
            let span = (rect.max - rect.min).length() + distance + Fixed::ONE;
            let far = rect.center() + dir.scale(span);
            rect.expand(distance).closest_point(far)
        }
    }
}

// ============================================================================
// Per-agent update
// ============================================================================

/// Hysteresis and approach planning for one engaging agent.
pub fn update(ctx: &SimulationContext, id: EntityId, agent: &mut Agent, claims: &mut GoalClaims) {
    let Some(weapon) = agent.weapon().copied() else {
        return;
    };
    let Some((info, shape)) = order_aim(ctx, &agent.order) else {
        return;
    };
    let range = weapon.range;
    let distance = shape.edge_distance(agent.position);
    let target_speed = info.map_or(Fixed::ZERO, |i| i.speed);
    let engagement = &mut agent.engagement;

    if engagement.hold_attack {
        if distance > range + ctx.config.hold_margin(target_speed) {
            debug!(agent = %id, %distance, "Target drifted out of range, approaching");
            engagement.hold_attack = false;
            engagement.approach_attempts = 0;
            engagement.planned_for = None;
        } else {
            return;
        }
    } else if distance <= range {
        debug!(agent = %id, %distance, "In range, holding");
        engagement.hold_attack = true;
        engagement.approach_attempts = 0;
        engagement.force_repath = false;
        if let Some(goal) = agent.goal_tile {
            claims.release(goal, agent.class);
        }
        agent.halt();
        if agent.class == AgentClass::Infantry {
            agent.hold_pos = true;
        }
        return;
    }

    let target_tile = info.map_or_else(|| ctx.nav.tile_of(shape.center()), |i| i.tile);
    let idle = agent.path.is_none() && agent.goal_tile.is_none();
    let moved = engagement.planned_for != Some(target_tile);
    if !(idle || moved || engagement.force_repath) {
        return;
    }
    if moved {
        engagement.approach_attempts = 0;
    } else if engagement.approach_attempts >= ctx.config.max_approach_attempts
        && !engagement.force_repath
    {
        // Parked until the target moves.
        return;
    }

    let seed_target = info.map(|i| i.id);
    let seed = match agent.engagement.seed {
        Some(seed) if seed.target == seed_target => seed,
        _ => initial_seed(ctx, id, agent, shape.center(), seed_target),
    };

    let engagement = &mut agent.engagement;
    engagement.seed = Some(seed);
    engagement.approach_attempts += 1;
    engagement.force_repath = false;
    engagement.planned_for = Some(target_tile);

    let attacker = Attacker {
        id,
        class: agent.class,
        team: agent.team,
        tile: ctx.nav.tile_of(agent.position),
        range,
    };
    if let Some(goal) = agent.goal_tile {
        claims.release(goal, agent.class);
    }
    match find_standoff(ctx, attacker, shape, seed, claims) {
        Some(standoff) => {
            trace!(agent = %id, tile = ?standoff.tile, ring = standoff.ring, "Standoff chosen");
            if let Some(s) = agent.engagement.seed.as_mut() {
                s.ring = standoff.ring;
            }
            claims.claim(standoff.tile, agent.class);
            agent.set_destination(standoff.tile);
        }
        None => {
            debug!(agent = %id, attempts = agent.engagement.approach_attempts, "No standoff tile");
            agent.halt();
        }
    }
}

/// Bearing for a freshly engaged target: the group slot if one was assigned,
/// else the agent's own bearing plus its jitter.
fn initial_seed(
    ctx: &SimulationContext,
    id: EntityId,
    agent: &Agent,
    center: Vec2Fixed,
    target: Option<EntityId>,
) -> AngularSeed {
    if let crate::orders::Order::Attack {
        slot: Some(slot), ..
    } = agent.order
    {
        return AngularSeed {
            target,
            angle: slot.angle % COMPASS_POINTS,
            ring: slot.ring.min(ctx.config.max_rings),
        };
    }
    let natural = compass_index(agent.position - center);
    AngularSeed {
        target,
        angle: compass_add(natural, jitter(id, ctx.config.compass_jitter)),
        ring: 0,
    }
}
