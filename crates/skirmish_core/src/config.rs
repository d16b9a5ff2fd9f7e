//! Simulation tunables.
//!
//! Every threshold the systems compare against lives here. Timers are in
//! ticks, distances in world units, speeds in world units per tick.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::{decimal_serde, ratio, Fixed};

/// Tunable thresholds for one simulation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// World units per tile.
    #[serde(with = "decimal_serde")]
    pub tile_size: Fixed,
    /// Ticks per simulated second.
    pub tick_rate: u32,
    /// Distance at which a waypoint counts as reached.
    #[serde(with = "decimal_serde")]
    pub arrival_epsilon: Fixed,
    /// Distance between neighbouring infantry sub-slots.
    #[serde(with = "decimal_serde")]
    pub subslot_spacing: Fixed,
    /// Radius of local separation steering.
    #[serde(with = "decimal_serde")]
    pub separation_radius: Fixed,
    /// Separation weight against same-team agents.
    #[serde(with = "decimal_serde")]
    pub separation_ally_weight: Fixed,
    /// Separation weight against enemy agents.
    #[serde(with = "decimal_serde")]
    pub separation_enemy_weight: Fixed,
    /// Maximum separation displacement per tick.
    #[serde(with = "decimal_serde")]
    pub separation_cap: Fixed,
    /// Closer approach to the waypoint that counts as progress.
    #[serde(with = "decimal_serde")]
    pub stuck_epsilon: Fixed,
    /// Stuck ticks before a repath is requested.
    pub stuck_bypass_ticks: u32,
    /// Stuck ticks before the agent settles in place.
    pub stuck_settle_ticks: u32,
    /// Path searches allowed per agent per second.
    pub max_repaths_per_second: u32,
    /// Extra step cost for tiles held by other agents.
    pub agent_path_penalty: u32,
    /// Hold exit margin against a stationary target.
    #[serde(with = "decimal_serde")]
    pub hold_exit_margin: Fixed,
    /// Smallest hold exit margin, reached against fast targets.
    #[serde(with = "decimal_serde")]
    pub hold_exit_margin_min: Fixed,
    /// How much each unit of target speed shrinks the exit margin.
    #[serde(with = "decimal_serde")]
    pub hold_margin_speed_factor: Fixed,
    /// Fraction of weapon range for the first standoff ring.
    #[serde(with = "decimal_serde")]
    pub standoff_range_factor: Fixed,
    /// Inward step between standoff rings.
    #[serde(with = "decimal_serde")]
    pub ring_step: Fixed,
    /// Innermost standoff distance.
    #[serde(with = "decimal_serde")]
    pub min_standoff: Fixed,
    /// Most rings an agent compresses inward.
    pub max_rings: u8,
    /// Per-agent jitter, in compass steps either side of the seed.
    pub compass_jitter: u8,
    /// Approach plans against an unchanged target tile before parking.
    pub max_approach_attempts: u32,
    /// Distance from the last known target position at which an expiring
    /// missile still detonates.
    #[serde(with = "decimal_serde")]
    pub missile_expiry_radius: Fixed,
    /// Splash damage as a fraction of direct damage.
    #[serde(with = "decimal_serde")]
    pub splash_factor: Fixed,
    /// Maximum per-tick pull toward a settled sub-slot.
    #[serde(with = "decimal_serde")]
    pub settle_cap: Fixed,
    /// Distance within which an idle cloaked agent can still be acquired.
    #[serde(with = "decimal_serde")]
    pub cloak_reveal_radius: Fixed,
    /// Distance from the anchor at which a guard gives up a chase.
    #[serde(with = "decimal_serde")]
    pub guard_leash: Fixed,
    /// Ring radius searched for formation and fallback tiles.
    pub formation_search_radius: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tile_size: Fixed::ONE,
            tick_rate: 20,
            arrival_epsilon: ratio(1, 20),
            subslot_spacing: ratio(1, 2),
            separation_radius: ratio(3, 5),
            separation_ally_weight: Fixed::ONE,
            separation_enemy_weight: ratio(7, 20),
            separation_cap: ratio(1, 50),
            stuck_epsilon: ratio(1, 200),
            stuck_bypass_ticks: 9,
            stuck_settle_ticks: 18,
            max_repaths_per_second: 4,
            agent_path_penalty: crate::pathfinding::AGENT_PENALTY,
            hold_exit_margin: ratio(3, 4),
            hold_exit_margin_min: ratio(1, 4),
            hold_margin_speed_factor: Fixed::from_num(4),
            standoff_range_factor: ratio(22, 25),
            ring_step: ratio(3, 4),
            min_standoff: ratio(1, 2),
            max_rings: 4,
            compass_jitter: 1,
            max_approach_attempts: 4,
            missile_expiry_radius: ratio(3, 4),
            splash_factor: ratio(2, 5),
            settle_cap: ratio(1, 50),
            cloak_reveal_radius: Fixed::from_num(2),
            guard_leash: Fixed::from_num(8),
            formation_search_radius: 6,
        }
    }
}

impl SimConfig {
    /// Parse a configuration from RON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ConfigParse`] on malformed input or values that
    /// fail validation.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| GameError::ConfigParse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the systems rely on being positive.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ConfigParse`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("tile_size", self.tile_size),
            ("arrival_epsilon", self.arrival_epsilon),
            ("standoff_range_factor", self.standoff_range_factor),
        ];
        for (name, value) in positive {
            if value <= Fixed::ZERO {
                return Err(GameError::ConfigParse {
                    message: format!("{name} must be positive"),
                });
            }
        }
        if self.tick_rate == 0 {
            return Err(GameError::ConfigParse {
                message: "tick_rate must be positive".into(),
            });
        }
        if self.stuck_settle_ticks <= self.stuck_bypass_ticks {
            return Err(GameError::ConfigParse {
                message: "stuck_settle_ticks must exceed stuck_bypass_ticks".into(),
            });
        }
        Ok(())
    }

    /// Exit margin for the hold band against a target moving at `target_speed`.
    #[must_use]
    pub fn hold_margin(&self, target_speed: Fixed) -> Fixed {
        (self.hold_exit_margin - target_speed * self.hold_margin_speed_factor)
            .max(self.hold_exit_margin_min)
    }
}
