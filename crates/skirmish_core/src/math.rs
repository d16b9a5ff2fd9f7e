//! Fixed-point math utilities for deterministic simulation.
//!
//! All simulation uses fixed-point arithmetic to ensure deterministic
//! behavior across platforms. Floating-point operations can produce
//! different results on different CPUs.

use fixed::traits::ToFixed;
use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Build the fixed-point ratio `num / den` without touching floats.
#[must_use]
pub fn ratio(num: i32, den: i32) -> Fixed {
    Fixed::from_num(num) / Fixed::from_num(den)
}

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for fixed-point numbers in human-edited files.
///
/// Config and scenario files write `0.88` rather than raw bits. The decimal
/// is converted once at load time; nothing inside a tick sees a float.
pub mod decimal_serde {
    use super::Fixed;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_num::<f64>().serialize(serializer)
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| D::Error::custom(format!("{value} is out of fixed-point range")))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Create a vector from any numeric type convertible to fixed-point.
    #[must_use]
    pub fn from_num<T: ToFixed>(x: T, y: T) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// Squared length.
    #[must_use]
    pub fn length_squared(self) -> Fixed {
        self.dot(self)
    }

    /// Length of the vector.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.length_squared())
    }

    /// Whether both components are exactly zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.x == Fixed::ZERO && self.y == Fixed::ZERO
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Rotate 90 degrees counter-clockwise.
    #[must_use]
    pub fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len_sq = self.dot(self);

        if len_sq == Fixed::ZERO {
            return Self::ZERO;
        }

        let len = fixed_sqrt(len_sq);
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len)
    }

    /// Shorten the vector to at most `max` length, keeping its direction.
    #[must_use]
    pub fn clamp_length(self, max: Fixed) -> Self {
        if self.length_squared() <= max * max {
            self
        } else {
            self.normalize().scale(max)
        }
    }

    /// Step from `self` toward `target` by at most `max_step`.
    ///
    /// Lands exactly on `target` when it is within reach, so repeated calls
    /// converge without residual error.
    #[must_use]
    pub fn move_toward(self, target: Self, max_step: Fixed) -> Self {
        let delta = target - self;
        if delta.length_squared() <= max_step * max_step {
            target
        } else {
            self + delta.normalize().scale(max_step)
        }
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..48 {
        let mid = (low + high) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::AddAssign for Vec2Fixed {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Axis-aligned rectangle in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RectFixed {
    /// Minimum corner (inclusive).
    pub min: Vec2Fixed,
    /// Maximum corner (inclusive).
    pub max: Vec2Fixed,
}

impl RectFixed {
    /// Create a rectangle from its corners.
    #[must_use]
    pub const fn new(min: Vec2Fixed, max: Vec2Fixed) -> Self {
        Self { min, max }
    }

    /// Grow the rectangle by `pad` on every side.
    #[must_use]
    pub fn expand(self, pad: Fixed) -> Self {
        Self {
            min: Vec2Fixed::new(self.min.x - pad, self.min.y - pad),
            max: Vec2Fixed::new(self.max.x + pad, self.max.y + pad),
        }
    }

    /// Centre point.
    #[must_use]
    pub fn center(self) -> Vec2Fixed {
        self.min.lerp(self.max, ratio(1, 2))
    }

    /// Whether the point lies inside or on the boundary.
    #[must_use]
    pub fn contains(self, p: Vec2Fixed) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Whether the point lies strictly inside.
    #[must_use]
    pub fn contains_strict(self, p: Vec2Fixed) -> bool {
        p.x > self.min.x && p.x < self.max.x && p.y > self.min.y && p.y < self.max.y
    }

    /// Closest point of the (filled) rectangle to `p`.
    #[must_use]
    pub fn closest_point(self, p: Vec2Fixed) -> Vec2Fixed {
        Vec2Fixed::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
        )
    }

    /// Distance from `p` to the rectangle edge; zero when inside.
    #[must_use]
    pub fn distance_to(self, p: Vec2Fixed) -> Fixed {
        p.distance(self.closest_point(p))
    }
}

/// Whether segment `a`→`b` passes within `radius` of `center`.
#[must_use]
pub fn segment_hits_circle(a: Vec2Fixed, b: Vec2Fixed, center: Vec2Fixed, radius: Fixed) -> bool {
    let d = b - a;
    let len_sq = d.length_squared();
    let closest = if len_sq == Fixed::ZERO {
        a
    } else {
        let t = (center - a)
            .dot(d)
            .saturating_div(len_sq)
            .clamp(Fixed::ZERO, Fixed::ONE);
        a + d.scale(t)
    };
    closest.distance_squared(center) <= radius * radius
}

/// Whether segment `a`→`b` touches `rect` (slab clipping).
#[must_use]
pub fn segment_hits_rect(a: Vec2Fixed, b: Vec2Fixed, rect: RectFixed) -> bool {
    let d = b - a;
    let mut t_enter = Fixed::ZERO;
    let mut t_exit = Fixed::ONE;

    let slabs = [
        (-d.x, a.x - rect.min.x),
        (d.x, rect.max.x - a.x),
        (-d.y, a.y - rect.min.y),
        (d.y, rect.max.y - a.y),
    ];

    for (p, q) in slabs {
        if p == Fixed::ZERO {
            if q < Fixed::ZERO {
                return false;
            }
            continue;
        }
        let r = q.saturating_div(p);
        if p < Fixed::ZERO {
            if r > t_exit {
                return false;
            }
            t_enter = t_enter.max(r);
        } else {
            if r < t_enter {
                return false;
            }
            t_exit = t_exit.min(r);
        }
    }

    t_enter <= t_exit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_num(x, y)
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = vec2(3, 0);
        let b = vec2(0, 4);
        // 3² + 4² = 25
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
    }

    #[test]
    fn test_vec2_dot() {
        let dot = vec2(2, 3).dot(vec2(4, -1));
        assert_eq!(dot, Fixed::from_num(5));
    }

    #[test]
    fn test_vec2_lerp() {
        let mid = vec2(0, 0).lerp(vec2(10, 20), ratio(1, 2));
        assert_eq!(mid, vec2(5, 10));
    }

    #[test]
    fn test_vec2_normalize() {
        let norm = vec2(3, 4).normalize();
        let len_sq = norm.dot(norm);
        let epsilon = Fixed::ONE / Fixed::from_num(10000);
        assert!(
            (len_sq - Fixed::ONE).abs() < epsilon,
            "normalized vector length² should be ~1, got {len_sq:?}"
        );
        let ratio_diff = (norm.x * Fixed::from_num(4)) - (norm.y * Fixed::from_num(3));
        assert!(ratio_diff.abs() < epsilon, "direction not preserved");
    }

    #[test]
    fn test_sqrt_of_perfect_square() {
        let root = fixed_sqrt(Fixed::from_num(49));
        assert!((root - Fixed::from_num(7)).abs() < ratio(1, 100_000));
        assert_eq!(fixed_sqrt(Fixed::from_num(-4)), Fixed::ZERO);
    }

    #[test]
    fn test_move_toward_lands_exactly() {
        let start = vec2(0, 0);
        let target = vec2(1, 0);
        let step = start.move_toward(target, Fixed::from_num(2));
        assert_eq!(step, target);

        let partial = start.move_toward(vec2(10, 0), Fixed::ONE);
        assert!((partial.x - Fixed::ONE).abs() < ratio(1, 10_000));
        assert_eq!(partial.y, Fixed::ZERO);
    }

    #[test]
    fn test_clamp_length() {
        let v = vec2(6, 8).clamp_length(Fixed::from_num(5));
        assert!((v.length() - Fixed::from_num(5)).abs() < ratio(1, 10_000));
        assert_eq!(vec2(1, 0).clamp_length(Fixed::from_num(5)), vec2(1, 0));
    }

    #[test]
    fn test_rect_distance_and_closest_point() {
        let rect = RectFixed::new(vec2(2, 2), vec2(4, 4));
        assert_eq!(rect.closest_point(vec2(0, 3)), vec2(2, 3));
        assert!((rect.distance_to(vec2(0, 3)) - Fixed::from_num(2)).abs() < ratio(1, 10_000));
        assert_eq!(rect.distance_to(vec2(3, 3)), Fixed::ZERO);
        assert_eq!(rect.center(), vec2(3, 3));
    }

    #[test]
    fn test_segment_hits_circle_catches_tunneling() {
        // Both endpoints are far outside the circle but the segment crosses it.
        assert!(segment_hits_circle(
            vec2(-10, 0),
            vec2(10, 0),
            vec2(0, 0),
            ratio(1, 2)
        ));
        assert!(!segment_hits_circle(
            vec2(-10, 2),
            vec2(10, 2),
            vec2(0, 0),
            ratio(1, 2)
        ));
    }

    #[test]
    fn test_segment_hits_rect() {
        let rect = RectFixed::new(vec2(4, -1), vec2(5, 1));
        assert!(segment_hits_rect(vec2(0, 0), vec2(10, 0), rect));
        assert!(!segment_hits_rect(vec2(0, 3), vec2(10, 3), rect));
        assert!(!segment_hits_rect(vec2(0, 0), vec2(3, 0), rect));
        // Vertical segment through the slab.
        assert!(segment_hits_rect(vec2(4, -5), vec2(4, 5), rect));
    }

    #[test]
    fn test_decimal_serde_reads_human_numbers() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(with = "decimal_serde")]
            value: Fixed,
        }
        let parsed: Wrapper = ron::from_str("(value: 0.5)").unwrap();
        assert_eq!(parsed.value, ratio(1, 2));
    }
}
