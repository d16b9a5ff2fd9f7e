//! Agent and structure data.
//!
//! Components are plain data. Behaviour lives in the systems
//! ([`crate::motion`], [`crate::targeting`], [`crate::engagement`],
//! [`crate::weapons`]).

use serde::{Deserialize, Serialize};

use crate::combat::{ArmorClass, Weapon};
use crate::entity::EntityId;
use crate::grid::{NavGrid, Tile};
use crate::math::{fixed_serde, ratio, Fixed, RectFixed, Vec2Fixed};
use crate::occupancy::Mover;
use crate::orders::Order;

/// Team identifier.
pub type TeamId = u8;

/// Team that is hostile to nobody (capturable buildings, neutral props).
pub const NEUTRAL_TEAM: TeamId = TeamId::MAX;

/// Whether two teams fight each other.
#[must_use]
pub const fn are_hostile(a: TeamId, b: TeamId) -> bool {
    a != b && a != NEUTRAL_TEAM && b != NEUTRAL_TEAM
}

// ============================================================================
// Classification
// ============================================================================

/// Movement class. Decides tile capacity rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentClass {
    /// Up to four share a tile, one per sub-slot, same team only.
    Infantry,
    /// Exclusive tile occupancy.
    Vehicle,
}

impl AgentClass {
    /// Armor class for damage effectiveness.
    #[must_use]
    pub const fn armor(self) -> ArmorClass {
        match self {
            Self::Infantry => ArmorClass::Light,
            Self::Vehicle => ArmorClass::Heavy,
        }
    }

    /// Target kind as seen by an attacker.
    #[must_use]
    pub const fn target_kind(self) -> TargetKind {
        match self {
            Self::Infantry => TargetKind::Infantry,
            Self::Vehicle => TargetKind::Vehicle,
        }
    }
}

/// What kind of thing a target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    /// Infantry agent.
    Infantry,
    /// Vehicle agent.
    Vehicle,
    /// Structure.
    Structure,
}

/// Targeting doctrine, a per-class filter on automatic target choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Doctrine {
    /// Engages anything hostile.
    #[default]
    Standard,
    /// Only ever auto-engages infantry.
    Sniper,
}

impl Doctrine {
    /// Whether automatic targeting may pick this kind of target.
    #[must_use]
    pub const fn permits(self, kind: TargetKind) -> bool {
        match self {
            Self::Standard => true,
            Self::Sniper => matches!(kind, TargetKind::Infantry),
        }
    }
}

/// What an agent is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    /// Mounted weapon. `None` for non-combatants.
    pub weapon: Option<Weapon>,
    /// Vision radius for automatic targeting.
    #[serde(with = "fixed_serde")]
    pub vision: Fixed,
    /// Automatic targeting filter.
    pub doctrine: Doctrine,
    /// Accepts harvest orders.
    pub can_harvest: bool,
    /// Accepts capture orders.
    pub can_capture: bool,
    /// Accepts repair-enter orders.
    pub can_repair: bool,
    /// Hidden from distant enemies while idle.
    pub cloak_when_idle: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            weapon: None,
            vision: Fixed::from_num(6),
            doctrine: Doctrine::Standard,
            can_harvest: false,
            can_capture: false,
            can_repair: false,
            cloak_when_idle: false,
        }
    }
}

// ============================================================================
// Health
// ============================================================================

/// Health component for damageable entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create new health component at full health.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Check if entity is dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Apply damage, returning actual damage dealt.
    /// Uses saturating subtraction to prevent underflow.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current = self.current.saturating_sub(actual);
        actual
    }
}

// ============================================================================
// Movement bookkeeping
// ============================================================================

/// Tile waypoints plus a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Path {
    waypoints: Vec<Tile>,
    cursor: usize,
}

impl Path {
    /// Path over the given waypoints, cursor at the first.
    #[must_use]
    pub fn new(waypoints: Vec<Tile>) -> Self {
        Self {
            waypoints,
            cursor: 0,
        }
    }

    /// Waypoint currently being walked to.
    #[must_use]
    pub fn current(&self) -> Option<Tile> {
        self.waypoints.get(self.cursor).copied()
    }

    /// Waypoint after the current one.
    #[must_use]
    pub fn after_current(&self) -> Option<Tile> {
        self.waypoints.get(self.cursor + 1).copied()
    }

    /// Final waypoint.
    #[must_use]
    pub fn goal(&self) -> Option<Tile> {
        self.waypoints.last().copied()
    }

    /// Whether the cursor sits on the final waypoint.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.cursor + 1 >= self.waypoints.len()
    }

    /// Whether every waypoint has been consumed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.waypoints.len()
    }

    /// Move the cursor forward.
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1).min(self.waypoints.len());
    }

    /// Splice a detour in front of the current waypoint.
    pub fn insert_before_current(&mut self, tile: Tile) {
        self.waypoints.insert(self.cursor, tile);
    }

    /// Swap the current waypoint for another tile.
    pub fn replace_current(&mut self, tile: Tile) {
        if let Some(slot) = self.waypoints.get_mut(self.cursor) {
            *slot = tile;
        }
    }

    /// Waypoints not yet reached.
    #[must_use]
    pub fn remaining(&self) -> &[Tile] {
        &self.waypoints[self.cursor.min(self.waypoints.len())..]
    }
}

/// A claimed next tile, with the sub-slot an infantry agent will take there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reservation {
    /// Claimed tile.
    pub tile: Tile,
    /// Sub-slot inside the tile (infantry only).
    pub subslot: u8,
}

/// Progress timer toward the current waypoint.
///
/// Progress is a consumed path node or a new closest approach to the
/// waypoint. Shuffling back and forth never counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StuckTracker {
    /// Consecutive ticks without meaningful progress.
    pub ticks: u32,
    /// Waypoint `best` was measured against.
    pub waypoint: Option<Tile>,
    /// Path nodes left at the last observation.
    pub remaining: u32,
    /// Closest approach to `waypoint` so far.
    #[serde(with = "fixed_serde")]
    pub best: Fixed,
    /// Queued behind a goal another agent holds. Pauses the timer for one tick.
    pub waiting: bool,
}

impl StuckTracker {
    /// Fold one tick into the timer.
    ///
    /// Returns the stuck count when this tick made no progress, `None` when
    /// it did or the timer is paused.
    pub fn observe(
        &mut self,
        waypoint: Option<Tile>,
        remaining: u32,
        distance: Fixed,
        epsilon: Fixed,
    ) -> Option<u32> {
        let advanced = remaining < self.remaining;
        let closer = waypoint == self.waypoint && distance + epsilon <= self.best;
        if advanced || closer || waypoint != self.waypoint {
            self.best = distance;
        }
        self.waypoint = waypoint;
        self.remaining = remaining;

        if std::mem::take(&mut self.waiting) {
            return None;
        }
        if advanced || closer {
            self.ticks = 0;
            return None;
        }
        self.ticks += 1;
        Some(self.ticks)
    }
}

/// Rate limiter on path searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RepathBudget {
    window_start: u64,
    in_window: u32,
    /// Searches performed over the agent's lifetime.
    pub total: u32,
    /// Highest count seen in any one window.
    pub peak: u32,
}

impl RepathBudget {
    /// Spend one search if the current window has room.
    pub fn try_consume(&mut self, tick: u64, window_ticks: u32, max_per_window: u32) -> bool {
        if tick >= self.window_start + u64::from(window_ticks) {
            self.window_start = tick;
            self.in_window = 0;
        }
        if self.in_window >= max_per_window {
            return false;
        }
        self.in_window += 1;
        self.total += 1;
        self.peak = self.peak.max(self.in_window);
        true
    }
}

// ============================================================================
// Combat bookkeeping
// ============================================================================

/// Stable approach bearing chosen when a target is first engaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AngularSeed {
    /// Target the seed belongs to; `None` for a ground point.
    pub target: Option<EntityId>,
    /// Compass index.
    pub angle: u8,
    /// Ring index, counted inward.
    pub ring: u8,
}

/// Per-agent engagement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Engagement {
    /// Approach bearing, kept until the target changes.
    pub seed: Option<AngularSeed>,
    /// In range and holding fire position.
    pub hold_attack: bool,
    /// Target tile the current approach was planned against.
    pub planned_for: Option<Tile>,
    /// Approach plans made against the same target tile.
    pub approach_attempts: u32,
    /// Set by stuck escalation: replan next tick.
    pub force_repath: bool,
}

// ============================================================================
// Entities
// ============================================================================

/// A mobile agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Agent {
    /// Movement class.
    pub class: AgentClass,
    /// Owning team.
    pub team: TeamId,
    /// World position.
    pub position: Vec2Fixed,
    /// Collision radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Movement speed in world units per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Hit points.
    pub health: Health,
    /// Abilities.
    pub caps: Capabilities,
    /// Standing order.
    pub order: Order,
    /// Tile being navigated to.
    pub goal_tile: Option<Tile>,
    /// A path search toward `goal_tile` is pending.
    pub repath_requested: bool,
    /// Current path.
    pub path: Option<Path>,
    /// Outstanding claim on the next tile.
    pub reservation: Option<Reservation>,
    /// Sub-slot inside the current tile (infantry only).
    pub subslot: u8,
    /// Settled infantry: keep pulling toward the sub-slot.
    pub hold_pos: bool,
    /// Combat state.
    pub engagement: Engagement,
    /// Stuck timer.
    pub stuck: StuckTracker,
    /// Path search rate limiter.
    pub repaths: RepathBudget,
    /// Last entity that damaged this agent.
    pub last_attacker: Option<EntityId>,
    /// Ticks until the weapon is ready.
    pub cooldown: u32,
    /// Facing direction for renderers.
    pub facing: Vec2Fixed,
    /// Fired this tick (renderer flag).
    pub just_fired: bool,
    /// Distance moved last tick.
    #[serde(with = "fixed_serde")]
    pub last_step: Fixed,
}

impl Agent {
    /// New agent with class defaults and no weapon.
    #[must_use]
    pub fn new(class: AgentClass, team: TeamId, position: Vec2Fixed) -> Self {
        let (radius, speed, hp) = match class {
            AgentClass::Infantry => (ratio(1, 5), ratio(2, 25), 100),
            AgentClass::Vehicle => (ratio(7, 20), ratio(1, 10), 300),
        };
        Self {
            class,
            team,
            position,
            radius,
            speed,
            health: Health::new(hp),
            caps: Capabilities::default(),
            order: Order::Idle,
            goal_tile: None,
            repath_requested: false,
            path: None,
            reservation: None,
            subslot: 0,
            hold_pos: false,
            engagement: Engagement::default(),
            stuck: StuckTracker::default(),
            repaths: RepathBudget::default(),
            last_attacker: None,
            cooldown: 0,
            facing: Vec2Fixed::new(Fixed::ONE, Fixed::ZERO),
            just_fired: false,
            last_step: Fixed::ZERO,
        }
    }

    /// Builder: weapon.
    #[must_use]
    pub fn with_weapon(mut self, weapon: Weapon) -> Self {
        self.caps.weapon = Some(weapon);
        self
    }

    /// Builder: movement speed.
    #[must_use]
    pub fn with_speed(mut self, speed: Fixed) -> Self {
        self.speed = speed;
        self
    }

    /// Builder: maximum health.
    #[must_use]
    pub fn with_health(mut self, max: u32) -> Self {
        self.health = Health::new(max);
        self
    }

    /// Builder: vision radius.
    #[must_use]
    pub fn with_vision(mut self, vision: Fixed) -> Self {
        self.caps.vision = vision;
        self
    }

    /// Builder: targeting doctrine.
    #[must_use]
    pub fn with_doctrine(mut self, doctrine: Doctrine) -> Self {
        self.caps.doctrine = doctrine;
        self
    }

    /// Builder: full capability set.
    #[must_use]
    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Occupancy identity.
    #[must_use]
    pub const fn mover(&self, id: EntityId) -> Mover {
        Mover {
            id,
            class: self.class,
            team: self.team,
        }
    }

    /// Mounted weapon.
    #[must_use]
    pub const fn weapon(&self) -> Option<&Weapon> {
        self.caps.weapon.as_ref()
    }

    /// Whether distant enemies can see this agent.
    #[must_use]
    pub const fn is_cloaked(&self) -> bool {
        self.caps.cloak_when_idle
            && !self.just_fired
            && matches!(self.order, Order::Idle | Order::Guard { .. })
    }

    /// Replace the order wholesale.
    ///
    /// Path, reservation, destination, combat state and stuck timers of the
    /// previous order are dropped in the same step.
    pub fn assign_order(&mut self, order: Order) {
        self.order = order;
        self.goal_tile = None;
        self.repath_requested = false;
        self.path = None;
        self.reservation = None;
        self.hold_pos = false;
        self.engagement = Engagement::default();
        self.stuck = StuckTracker::default();
    }

    /// Start navigating to a tile.
    pub fn set_destination(&mut self, tile: Tile) {
        self.goal_tile = Some(tile);
        self.repath_requested = true;
        self.path = None;
        self.reservation = None;
        self.hold_pos = false;
        self.stuck = StuckTracker::default();
    }

    /// Stop navigating. Keeps the order.
    pub fn halt(&mut self) {
        self.goal_tile = None;
        self.repath_requested = false;
        self.path = None;
        self.reservation = None;
        self.stuck = StuckTracker::default();
    }
}

/// A static structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Structure {
    /// Owning team.
    pub team: TeamId,
    /// Top-left footprint tile.
    pub origin: Tile,
    /// Footprint width in tiles.
    pub width: u32,
    /// Footprint height in tiles.
    pub height: u32,
    /// Hit points.
    pub health: Health,
    /// Whether agents may target it.
    pub attackable: bool,
}

impl Structure {
    /// New attackable structure.
    #[must_use]
    pub const fn new(team: TeamId, origin: Tile, width: u32, height: u32, max_health: u32) -> Self {
        Self {
            team,
            origin,
            width,
            height,
            health: Health::new(max_health),
            attackable: true,
        }
    }

    /// Builder: attackable flag.
    #[must_use]
    pub const fn with_attackable(mut self, attackable: bool) -> Self {
        self.attackable = attackable;
        self
    }

    /// World-space footprint.
    #[must_use]
    pub fn rect(&self, grid: &NavGrid) -> RectFixed {
        grid.footprint_rect(self.origin, self.width, self.height)
    }

    /// Whether a tile is part of the footprint.
    #[must_use]
    pub fn covers(&self, tile: Tile) -> bool {
        tile.x >= self.origin.x
            && tile.y >= self.origin.y
            && tile.x < self.origin.x + self.width as i32
            && tile.y < self.origin.y + self.height as i32
    }
}
