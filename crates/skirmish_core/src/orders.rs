//! Standing orders.
//!
//! Each variant carries exactly the data it needs. Orders are replaced
//! wholesale; see [`crate::components::Agent::assign_order`].

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::grid::Tile;
use crate::math::Vec2Fixed;

/// Where an attack order goes once its target is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resume {
    /// Drop to idle.
    Idle,
    /// Walk back to the guard anchor.
    Guard(Vec2Fixed),
    /// Continue the interrupted attack-move.
    AttackMove(Tile),
}

/// Pre-assigned approach slot from a group attack command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackSlot {
    /// Compass direction index around the target.
    pub angle: u8,
    /// Ring index, counted inward from the weapon-range ring.
    pub ring: u8,
}

/// The standing order of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Order {
    /// No order. Auto-engages enemies in vision.
    #[default]
    Idle,
    /// Walk to a tile.
    Move {
        /// Destination tile.
        goal: Tile,
    },
    /// Walk to a tile, engaging anything met on the way.
    AttackMove {
        /// Destination tile.
        goal: Tile,
    },
    /// Engage one entity.
    Attack {
        /// Target handle. Checked lazily every tick.
        target: EntityId,
        /// Fallback once the target is gone.
        resume: Resume,
        /// Player-issued: never switched by auto-targeting.
        manual: bool,
        /// May target friendly entities.
        forced: bool,
        /// Slot assigned by a group command.
        slot: Option<AttackSlot>,
    },
    /// Fire at a ground point.
    ForceFire {
        /// Aim point.
        point: Vec2Fixed,
    },
    /// Hold position and defend the anchor.
    Guard {
        /// Position to return to after a fight.
        anchor: Vec2Fixed,
    },
    /// Walking back to a guard anchor.
    GuardReturn {
        /// Position to return to.
        anchor: Vec2Fixed,
    },
    /// Travel to a resource node, then hand off to the economy.
    Harvest {
        /// Node tile.
        node: Tile,
    },
    /// Travel to a structure, then hand off a capture.
    Capture {
        /// Structure to capture.
        structure: EntityId,
    },
    /// Travel to a structure, then hand off a repair entry.
    RepairEnter {
        /// Structure to enter.
        structure: EntityId,
    },
}

impl Order {
    /// Whether the order lets the agent pick its own targets.
    #[must_use]
    pub const fn allows_auto_engage(&self) -> bool {
        matches!(self, Self::Idle | Self::Guard { .. } | Self::AttackMove { .. })
    }

    /// Whether the agent is currently fighting.
    #[must_use]
    pub const fn is_combat(&self) -> bool {
        matches!(self, Self::Attack { .. } | Self::ForceFire { .. })
    }

    /// Current attack target, if any.
    #[must_use]
    pub const fn target(&self) -> Option<EntityId> {
        match self {
            Self::Attack { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Where an auto-acquired attack returns to when this order is interrupted.
    #[must_use]
    pub const fn resume_point(&self) -> Resume {
        match *self {
            Self::Guard { anchor } | Self::GuardReturn { anchor } => Resume::Guard(anchor),
            Self::AttackMove { goal } => Resume::AttackMove(goal),
            _ => Resume::Idle,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Move { .. } => "move",
            Self::AttackMove { .. } => "attack-move",
            Self::Attack { .. } => "attack",
            Self::ForceFire { .. } => "force-fire",
            Self::Guard { .. } => "guard",
            Self::GuardReturn { .. } => "guard-return",
            Self::Harvest { .. } => "harvest",
            Self::Capture { .. } => "capture",
            Self::RepairEnter { .. } => "repair-enter",
        }
    }
}

impl Resume {
    /// The order to fall back to.
    #[must_use]
    pub const fn into_order(self) -> Order {
        match self {
            Self::Idle => Order::Idle,
            Self::Guard(anchor) => Order::GuardReturn { anchor },
            Self::AttackMove(goal) => Order::AttackMove { goal },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_engage_permissions() {
        assert!(Order::Idle.allows_auto_engage());
        assert!(Order::Guard {
            anchor: Vec2Fixed::ZERO
        }
        .allows_auto_engage());
        assert!(!Order::Move {
            goal: Tile::new(1, 1)
        }
        .allows_auto_engage());
        assert!(!Order::ForceFire {
            point: Vec2Fixed::ZERO
        }
        .allows_auto_engage());
    }

    #[test]
    fn test_resume_round_trip_through_states() {
        let anchor = Vec2Fixed::from_num(3, 4);
        let guard = Order::Guard { anchor };
        assert_eq!(
            guard.resume_point().into_order(),
            Order::GuardReturn { anchor }
        );

        let march = Order::AttackMove {
            goal: Tile::new(9, 9),
        };
        assert_eq!(march.resume_point().into_order(), march);
        assert_eq!(Order::Idle.resume_point().into_order(), Order::Idle);
    }
}
