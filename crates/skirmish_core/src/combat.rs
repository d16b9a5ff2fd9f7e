//! Weapon definitions and damage calculation.
//!
//! Damage is scaled by a small effectiveness matrix between the weapon's
//! damage type and the target's armor class. The delivery model decides how
//! the damage travels (instant, straight-line missile, arced shell).

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, ratio, Fixed};

/// Damage type classification for weapons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DamageType {
    /// Bullets and shells. Best against infantry.
    #[default]
    Kinetic,
    /// Shaped charges. Best against vehicles.
    ArmorPiercing,
    /// High explosive. Best against structures.
    Explosive,
}

/// Armor class of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ArmorClass {
    /// Infantry.
    #[default]
    Light,
    /// Vehicles.
    Heavy,
    /// Structures.
    Building,
}

impl DamageType {
    /// Damage multiplier against an armor class.
    #[must_use]
    pub fn effectiveness_vs(self, armor: ArmorClass) -> Fixed {
        let percent = match (self, armor) {
            (Self::Kinetic, ArmorClass::Light) => 100,
            (Self::Kinetic, ArmorClass::Heavy) => 50,
            (Self::Kinetic, ArmorClass::Building) => 35,

            (Self::ArmorPiercing, ArmorClass::Light) => 60,
            (Self::ArmorPiercing, ArmorClass::Heavy) => 100,
            (Self::ArmorPiercing, ArmorClass::Building) => 75,

            (Self::Explosive, ArmorClass::Light) => 90,
            (Self::Explosive, ArmorClass::Heavy) => 75,
            (Self::Explosive, ArmorClass::Building) => 125,
        };
        ratio(percent, 100)
    }
}

/// How a weapon's damage reaches the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Delivery {
    /// Instant damage along the line of fire. The tracer is cosmetic.
    Hitscan,
    /// Straight-line projectile with swept collision.
    Missile {
        /// Distance travelled per tick.
        #[serde(with = "fixed_serde")]
        speed: Fixed,
        /// Ticks before the missile expires.
        max_ticks: u32,
    },
    /// Arced shell interpolated over a fixed flight time.
    Shell {
        /// Ticks from launch to impact.
        flight_ticks: u32,
    },
}

/// A weapon mounted on an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Weapon {
    /// Base damage per shot.
    pub damage: u32,
    /// Engagement range, measured from the shooter centre to the target edge.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Ticks between shots.
    pub cooldown_ticks: u32,
    /// Delivery model.
    pub delivery: Delivery,
    /// Damage type for the effectiveness matrix.
    pub damage_type: DamageType,
    /// Splash radius (zero for none).
    #[serde(with = "fixed_serde")]
    pub splash_radius: Fixed,
}

impl Weapon {
    /// Create a hitscan weapon with no splash.
    #[must_use]
    pub fn hitscan(damage: u32, range: Fixed, cooldown_ticks: u32) -> Self {
        Self {
            damage,
            range,
            cooldown_ticks,
            delivery: Delivery::Hitscan,
            damage_type: DamageType::Kinetic,
            splash_radius: Fixed::ZERO,
        }
    }

    /// Builder: missile delivery.
    #[must_use]
    pub fn with_missile(mut self, speed: Fixed, max_ticks: u32) -> Self {
        self.delivery = Delivery::Missile { speed, max_ticks };
        self
    }

    /// Builder: arced shell delivery.
    #[must_use]
    pub fn with_shell(mut self, flight_ticks: u32) -> Self {
        self.delivery = Delivery::Shell { flight_ticks };
        self
    }

    /// Builder: splash radius.
    #[must_use]
    pub fn with_splash(mut self, radius: Fixed) -> Self {
        self.splash_radius = radius;
        self
    }

    /// Builder: damage type.
    #[must_use]
    pub fn with_damage_type(mut self, damage_type: DamageType) -> Self {
        self.damage_type = damage_type;
        self
    }
}

/// Final damage of a hit after effectiveness and an optional scale factor.
///
/// Never rounds a non-zero hit down to zero.
#[must_use]
pub fn calculate_damage(base: u32, damage_type: DamageType, armor: ArmorClass, scale: Fixed) -> u32 {
    if base == 0 || scale <= Fixed::ZERO {
        return 0;
    }
    let raw = Fixed::from_num(base) * damage_type.effectiveness_vs(armor) * scale;
    raw.to_num::<u32>().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effectiveness_matrix() {
        assert_eq!(
            DamageType::Kinetic.effectiveness_vs(ArmorClass::Light),
            Fixed::ONE
        );
        assert!(
            DamageType::ArmorPiercing.effectiveness_vs(ArmorClass::Heavy)
                > DamageType::Kinetic.effectiveness_vs(ArmorClass::Heavy)
        );
        assert!(DamageType::Explosive.effectiveness_vs(ArmorClass::Building) > Fixed::ONE);
    }

    #[test]
    fn test_calculate_damage_scales() {
        assert_eq!(
            calculate_damage(100, DamageType::Kinetic, ArmorClass::Heavy, Fixed::ONE),
            50
        );
        assert_eq!(
            calculate_damage(100, DamageType::Kinetic, ArmorClass::Light, ratio(2, 5)),
            40
        );
    }

    #[test]
    fn test_calculate_damage_never_rounds_to_zero() {
        assert_eq!(
            calculate_damage(1, DamageType::Kinetic, ArmorClass::Building, ratio(1, 10)),
            1
        );
        assert_eq!(
            calculate_damage(0, DamageType::Kinetic, ArmorClass::Light, Fixed::ONE),
            0
        );
    }

    #[test]
    fn test_weapon_builders() {
        let weapon = Weapon::hitscan(10, Fixed::from_num(4), 20)
            .with_shell(15)
            .with_splash(Fixed::ONE)
            .with_damage_type(DamageType::Explosive);
        assert_eq!(weapon.delivery, Delivery::Shell { flight_ticks: 15 });
        assert_eq!(weapon.splash_radius, Fixed::ONE);
        assert_eq!(weapon.damage_type, DamageType::Explosive);
    }
}
