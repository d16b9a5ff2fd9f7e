//! Static navigation grid: terrain and structure footprints.
//!
//! The grid answers "can anything ever stand here". Who is standing here
//! right now lives in [`crate::occupancy`].

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, RectFixed, Vec2Fixed};

/// Integer tile coordinate. May lie outside the grid; check with
/// [`NavGrid::in_bounds`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Tile {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Tile {
    /// Create a tile coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Tile shifted by `(dx, dy)`.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Chebyshev (king-move) distance.
    #[must_use]
    pub fn chebyshev(self, other: Self) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Whether `other` is one of the eight neighbours.
    #[must_use]
    pub fn is_adjacent(self, other: Self) -> bool {
        self != other && self.chebyshev(other) == 1
    }
}

/// Cell types for the navigation grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellType {
    /// Normal walkable terrain.
    #[default]
    Walkable,
    /// Walkable terrain with doubled step cost.
    SlowTerrain,
    /// Impassable terrain.
    Blocked,
    /// Covered by a structure footprint.
    Structure,
}

impl CellType {
    /// Step cost multiplier for entering this cell, `None` when impassable.
    #[must_use]
    pub const fn cost_multiplier(self) -> Option<u32> {
        match self {
            Self::Walkable => Some(1),
            Self::SlowTerrain => Some(2),
            Self::Blocked | Self::Structure => None,
        }
    }

    /// Returns true if this cell is walkable.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        matches!(self, Self::Walkable | Self::SlowTerrain)
    }
}

/// Navigation grid for pathfinding and occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NavGrid {
    /// Grid width in cells.
    width: u32,
    /// Grid height in cells.
    height: u32,
    /// Cell data stored in row-major order.
    cells: Vec<CellType>,
    /// Size of each cell in world units.
    #[serde(with = "fixed_serde")]
    cell_size: Fixed,
}

impl NavGrid {
    /// Create a new navigation grid with all cells walkable.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero, or if `cell_size` is not positive.
    #[must_use]
    pub fn new(width: u32, height: u32, cell_size: Fixed) -> Self {
        assert!(width > 0, "NavGrid width must be positive");
        assert!(height > 0, "NavGrid height must be positive");
        assert!(cell_size > Fixed::ZERO, "NavGrid cell_size must be positive");

        let cell_count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            cells: vec![CellType::Walkable; cell_count],
            cell_size,
        }
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Cell size in world units.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    /// Row-major index of an in-bounds tile.
    #[must_use]
    pub fn index(&self, tile: Tile) -> Option<usize> {
        if self.in_bounds(tile) {
            Some((tile.y as usize) * (self.width as usize) + (tile.x as usize))
        } else {
            None
        }
    }

    /// Check if a tile is within grid bounds.
    #[must_use]
    pub fn in_bounds(&self, tile: Tile) -> bool {
        tile.x >= 0 && tile.y >= 0 && (tile.x as u32) < self.width && (tile.y as u32) < self.height
    }

    /// Get cell type at a tile. Returns `None` if out of bounds.
    #[must_use]
    pub fn cell(&self, tile: Tile) -> Option<CellType> {
        self.index(tile).map(|i| self.cells[i])
    }

    /// Set cell type at a tile. Returns `false` if out of bounds.
    pub fn set_cell(&mut self, tile: Tile, cell_type: CellType) -> bool {
        match self.index(tile) {
            Some(i) => {
                self.cells[i] = cell_type;
                true
            }
            None => false,
        }
    }

    /// Check if a tile is walkable (out of bounds is not).
    #[must_use]
    pub fn is_walkable(&self, tile: Tile) -> bool {
        self.cell(tile).is_some_and(CellType::is_walkable)
    }

    /// Check if a tile is covered by a structure.
    #[must_use]
    pub fn is_structure(&self, tile: Tile) -> bool {
        self.cell(tile) == Some(CellType::Structure)
    }

    /// Step cost multiplier for entering `tile`.
    #[must_use]
    pub fn cost_multiplier(&self, tile: Tile) -> Option<u32> {
        self.cell(tile).and_then(CellType::cost_multiplier)
    }

    /// Tile containing a world position. The result may be out of bounds.
    #[must_use]
    pub fn tile_of(&self, pos: Vec2Fixed) -> Tile {
        Tile::new(
            (pos.x / self.cell_size).floor().to_num::<i32>(),
            (pos.y / self.cell_size).floor().to_num::<i32>(),
        )
    }

    /// World position of a tile's centre.
    #[must_use]
    pub fn tile_center(&self, tile: Tile) -> Vec2Fixed {
        let half = self.cell_size / Fixed::from_num(2);
        Vec2Fixed::new(
            Fixed::from_num(tile.x) * self.cell_size + half,
            Fixed::from_num(tile.y) * self.cell_size + half,
        )
    }

    /// World-space rectangle of a block of tiles.
    #[must_use]
    pub fn footprint_rect(&self, origin: Tile, width: u32, height: u32) -> RectFixed {
        let min = Vec2Fixed::new(
            Fixed::from_num(origin.x) * self.cell_size,
            Fixed::from_num(origin.y) * self.cell_size,
        );
        let max = Vec2Fixed::new(
            min.x + Fixed::from_num(width) * self.cell_size,
            min.y + Fixed::from_num(height) * self.cell_size,
        );
        RectFixed::new(min, max)
    }

    /// Iterate the tiles of a footprint that fall inside the grid.
    pub fn footprint_tiles(
        &self,
        origin: Tile,
        width: u32,
        height: u32,
    ) -> impl Iterator<Item = Tile> + '_ {
        let (w, h) = (width as i32, height as i32);
        (0..h)
            .flat_map(move |dy| (0..w).map(move |dx| origin.offset(dx, dy)))
            .filter(|t| self.in_bounds(*t))
    }

    /// Mark a footprint as structure-covered.
    pub fn stamp_structure(&mut self, origin: Tile, width: u32, height: u32) {
        let tiles: Vec<Tile> = self.footprint_tiles(origin, width, height).collect();
        for tile in tiles {
            self.set_cell(tile, CellType::Structure);
        }
    }

    /// Return a structure footprint to walkable terrain.
    pub fn clear_structure(&mut self, origin: Tile, width: u32, height: u32) {
        let tiles: Vec<Tile> = self.footprint_tiles(origin, width, height).collect();
        for tile in tiles {
            if self.is_structure(tile) {
                self.set_cell(tile, CellType::Walkable);
            }
        }
    }

    /// Build a grid from ASCII rows: `.` walkable, `#` blocked, `~` slow,
    /// `B` structure. Rows shorter than the first are padded as walkable.
    #[must_use]
    pub fn from_ascii(rows: &[&str], cell_size: Fixed) -> Self {
        let height = rows.len().max(1) as u32;
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(1).max(1) as u32;
        let mut grid = Self::new(width, height, cell_size);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                let cell = match ch {
                    '#' => CellType::Blocked,
                    '~' => CellType::SlowTerrain,
                    'B' => CellType::Structure,
                    _ => CellType::Walkable,
                };
                grid.set_cell(Tile::new(x as i32, y as i32), cell);
            }
        }
        grid
    }
}

impl Default for NavGrid {
    /// A 64x64 grid with unit-sized tiles.
    fn default() -> Self {
        Self::new(64, 64, Fixed::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navgrid_creation() {
        let grid = NavGrid::new(10, 8, Fixed::ONE);
        assert_eq!(grid.width(), 10);
        assert_eq!(grid.height(), 8);
        assert!(grid.is_walkable(Tile::new(0, 0)));
        assert!(grid.is_walkable(Tile::new(9, 7)));
    }

    #[test]
    fn test_out_of_bounds_is_not_walkable() {
        let grid = NavGrid::new(4, 4, Fixed::ONE);
        assert!(!grid.in_bounds(Tile::new(-1, 0)));
        assert!(!grid.in_bounds(Tile::new(4, 0)));
        assert!(!grid.is_walkable(Tile::new(0, 4)));
        assert_eq!(grid.cell(Tile::new(7, 7)), None);
    }

    #[test]
    fn test_tile_of_and_center() {
        let grid = NavGrid::new(10, 10, Fixed::from_num(2));
        let tile = grid.tile_of(Vec2Fixed::from_num(5, 3));
        assert_eq!(tile, Tile::new(2, 1));
        assert_eq!(grid.tile_center(tile), Vec2Fixed::from_num(5, 3));
        // Negative positions floor away from zero.
        assert_eq!(grid.tile_of(Vec2Fixed::from_num(-1, 0)), Tile::new(-1, 0));
    }

    #[test]
    fn test_structure_stamp_and_clear() {
        let mut grid = NavGrid::new(8, 8, Fixed::ONE);
        grid.set_cell(Tile::new(3, 3), CellType::Blocked);
        grid.stamp_structure(Tile::new(2, 2), 3, 2);
        assert!(grid.is_structure(Tile::new(2, 2)));
        assert!(grid.is_structure(Tile::new(4, 3)));
        assert!(!grid.is_walkable(Tile::new(4, 3)));

        grid.clear_structure(Tile::new(2, 2), 3, 2);
        assert!(grid.is_walkable(Tile::new(2, 2)));
        // Stamping overwrites terrain under the footprint.
        assert_eq!(grid.cell(Tile::new(3, 3)), Some(CellType::Walkable));
    }

    #[test]
    fn test_footprint_rect() {
        let grid = NavGrid::new(8, 8, Fixed::ONE);
        let rect = grid.footprint_rect(Tile::new(2, 3), 2, 1);
        assert_eq!(rect.min, Vec2Fixed::from_num(2, 3));
        assert_eq!(rect.max, Vec2Fixed::from_num(4, 4));
    }

    #[test]
    fn test_from_ascii() {
        let grid = NavGrid::from_ascii(&[".#~", "B.."], Fixed::ONE);
        assert_eq!(grid.cell(Tile::new(1, 0)), Some(CellType::Blocked));
        assert_eq!(grid.cost_multiplier(Tile::new(2, 0)), Some(2));
        assert!(grid.is_structure(Tile::new(0, 1)));
    }

    #[test]
    fn test_adjacency() {
        let t = Tile::new(3, 3);
        assert!(t.is_adjacent(Tile::new(4, 4)));
        assert!(!t.is_adjacent(t));
        assert!(!t.is_adjacent(Tile::new(5, 3)));
    }
}
