//! Grid-based pathfinding using the A* algorithm.
//!
//! Costs are integers (10 orthogonal, 14 diagonal) with an octile heuristic,
//! so every result is exact and identical on every platform.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::grid::{NavGrid, Tile};
use crate::occupancy::{is_squeezed, is_standable, Mover, OccupancyGrid};

/// Cost of an orthogonal step.
pub const ORTHOGONAL_COST: u32 = 10;

/// Cost of a diagonal step.
pub const DIAGONAL_COST: u32 = 14;

/// Default extra cost for stepping onto a tile another agent holds.
pub const AGENT_PENALTY: u32 = 40;

/// Direction offsets for 8-directional movement.
pub const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),   // East
    (1, 1),   // Southeast
    (0, 1),   // South
    (-1, 1),  // Southwest
    (-1, 0),  // West
    (-1, -1), // Northwest
    (0, -1),  // North
    (1, -1),  // Northeast
];

/// Octile distance between two tiles in step-cost units.
///
/// Admissible and consistent for 8-connected movement with the step costs
/// above, since no step is ever cheaper than its base cost.
#[must_use]
pub fn octile_distance(a: Tile, b: Tile) -> u32 {
    let dx = a.x.abs_diff(b.x);
    let dy = a.y.abs_diff(b.y);
    let (short, long) = if dx < dy { (dx, dy) } else { (dy, dx) };
    DIAGONAL_COST * short + ORTHOGONAL_COST * (long - short)
}

/// Whether a single step from `from` to the neighbouring tile `to` is legal.
///
/// The destination must be walkable and not squeezed. A diagonal step also
/// needs both orthogonal tiles of the corner to be walkable.
#[must_use]
pub fn can_step(grid: &NavGrid, from: Tile, to: Tile) -> bool {
    if !from.is_adjacent(to) || !grid.is_walkable(to) || is_squeezed(grid, to) {
        return false;
    }
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    if dx != 0 && dy != 0 {
        grid.is_walkable(from.offset(dx, 0)) && grid.is_walkable(from.offset(0, dy))
    } else {
        true
    }
}

/// Terrain cost of one legal step, `None` if the step is illegal.
#[must_use]
pub fn step_cost(grid: &NavGrid, from: Tile, to: Tile) -> Option<u32> {
    if !can_step(grid, from, to) {
        return None;
    }
    let base = if from.x != to.x && from.y != to.y {
        DIAGONAL_COST
    } else {
        ORTHOGONAL_COST
    };
    grid.cost_multiplier(to).map(|m| base * m)
}

/// Total terrain cost of a path, `None` if any step is illegal.
#[must_use]
pub fn path_cost(grid: &NavGrid, path: &[Tile]) -> Option<u32> {
    path.windows(2)
        .try_fold(0, |total, pair| step_cost(grid, pair[0], pair[1]).map(|c| total + c))
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    index: usize,
    g_score: u32,
    f_score: u32,
    h_score: u32,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: lower f first, then nodes closer to the
        // goal, then the lower row-major index.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.h_score.cmp(&self.h_score))
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find a path from `start` to `goal` over terrain only.
///
/// Returns the waypoints including `start`, or `None` when the goal is not
/// reachable. Unreachable is an ordinary outcome, not an error.
#[must_use]
pub fn find_path(grid: &NavGrid, start: Tile, goal: Tile) -> Option<Vec<Tile>> {
    search(grid, start, goal, |_| 0)
}

/// Find a path that prefers tiles free of other agents.
///
/// Tiles `mover` may not currently enter cost `penalty` extra. The start and
/// goal are exempt, so this never fails where [`find_path`] succeeds.
#[must_use]
pub fn find_path_avoiding_agents(
    grid: &NavGrid,
    occupancy: &OccupancyGrid,
    mover: Mover,
    start: Tile,
    goal: Tile,
    penalty: u32,
) -> Option<Vec<Tile>> {
    search(grid, start, goal, |tile| {
        if tile == start || tile == goal || occupancy.can_enter(grid, mover, tile) {
            0
        } else {
            penalty
        }
    })
}

fn search(
    grid: &NavGrid,
    start: Tile,
    goal: Tile,
    penalty: impl Fn(Tile) -> u32,
) -> Option<Vec<Tile>> {
    let start_index = grid.index(start)?;
    let goal_index = grid.index(goal)?;
    if start == goal {
        return Some(vec![goal]);
    }
    if !is_standable(grid, goal) {
        return None;
    }

    let cell_count = (grid.width() as usize) * (grid.height() as usize);
    let mut g_score = vec![u32::MAX; cell_count];
    let mut came_from = vec![usize::MAX; cell_count];
    let mut open_set = BinaryHeap::new();

    g_score[start_index] = 0;
    let h = octile_distance(start, goal);
    open_set.push(AStarNode {
        index: start_index,
        g_score: 0,
        f_score: h,
        h_score: h,
    });

    let width = grid.width() as usize;
    let tile_at = |index: usize| Tile::new((index % width) as i32, (index / width) as i32);

    while let Some(current) = open_set.pop() {
        if current.index == goal_index {
            return Some(reconstruct_path(&came_from, goal_index, tile_at));
        }
        if current.g_score > g_score[current.index] {
            continue;
        }
        let here = tile_at(current.index);

        for &(dx, dy) in &DIRECTIONS {
            let next = here.offset(dx, dy);
            let Some(cost) = step_cost(grid, here, next) else {
                continue;
            };
            let Some(next_index) = grid.index(next) else {
                continue;
            };
            let tentative = current.g_score + cost + penalty(next);
            if tentative < g_score[next_index] {
                g_score[next_index] = tentative;
                came_from[next_index] = current.index;
                let h = octile_distance(next, goal);
                open_set.push(AStarNode {
                    index: next_index,
                    g_score: tentative,
                    f_score: tentative + h,
                    h_score: h,
                });
            }
        }
    }

    None
}

fn reconstruct_path(came_from: &[usize], goal: usize, tile_at: impl Fn(usize) -> Tile) -> Vec<Tile> {
    let mut path = vec![tile_at(goal)];
    let mut current = goal;
    while came_from[current] != usize::MAX {
        current = came_from[current];
        path.push(tile_at(current));
    }
    path.reverse();
    path
}

/// Closest tile to `goal` an agent can stand on, searching rings outward.
///
/// Within a ring the lowest octile distance wins, then row-major order.
#[must_use]
pub fn nearest_open_tile(grid: &NavGrid, goal: Tile, max_radius: u32) -> Option<Tile> {
    if is_standable(grid, goal) {
        return Some(goal);
    }
    (1..=max_radius as i32).find_map(|r| {
        ring(goal, r)
            .filter(|t| is_standable(grid, *t))
            .min_by_key(|t| (octile_distance(goal, *t), t.y, t.x))
    })
}

/// Tiles at Chebyshev distance exactly `r` from `center`, row-major.
pub fn ring(center: Tile, r: i32) -> impl Iterator<Item = Tile> {
    (-r..=r).flat_map(move |dy| {
        (-r..=r)
            .filter(move |dx| dx.abs() == r || dy.abs() == r)
            .map(move |dx| center.offset(dx, dy))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::AgentClass;
    use crate::entity::{Entity, EntityStorage};
    use crate::components::Agent;
    use crate::grid::CellType;
    use crate::math::{Fixed, Vec2Fixed};
    use crate::occupancy::Occupant;

    fn open(width: u32, height: u32) -> NavGrid {
        NavGrid::new(width, height, Fixed::ONE)
    }

    #[test]
    fn test_octile_heuristic() {
        assert_eq!(octile_distance(Tile::new(0, 0), Tile::new(5, 5)), 70);
        assert_eq!(octile_distance(Tile::new(0, 0), Tile::new(3, 7)), 3 * 14 + 4 * 10);
        assert_eq!(octile_distance(Tile::new(5, 5), Tile::new(5, 5)), 0);
    }

    #[test]
    fn test_simple_path() {
        let grid = open(10, 10);
        let path = find_path(&grid, Tile::new(0, 0), Tile::new(5, 5)).unwrap();
        assert_eq!(path.first(), Some(&Tile::new(0, 0)));
        assert_eq!(path.last(), Some(&Tile::new(5, 5)));
        assert_eq!(path.len(), 6);
        assert_eq!(path_cost(&grid, &path), Some(70));
    }

    #[test]
    fn test_path_around_obstacle() {
        let mut grid = open(10, 10);
        for y in 2..8 {
            grid.set_cell(Tile::new(5, y), CellType::Blocked);
        }
        let path = find_path(&grid, Tile::new(2, 5), Tile::new(8, 5)).unwrap();
        for tile in &path {
            assert!(grid.is_walkable(*tile), "path goes through blocked {tile:?}");
        }
        assert!(path_cost(&grid, &path).is_some());
    }

    #[test]
    fn test_no_path_exists() {
        let mut grid = open(10, 10);
        for y in 0..10 {
            grid.set_cell(Tile::new(5, y), CellType::Blocked);
        }
        assert_eq!(find_path(&grid, Tile::new(2, 5), Tile::new(8, 5)), None);
    }

    #[test]
    fn test_path_to_same_cell() {
        let grid = open(10, 10);
        assert_eq!(
            find_path(&grid, Tile::new(5, 5), Tile::new(5, 5)),
            Some(vec![Tile::new(5, 5)])
        );
    }

    #[test]
    fn test_blocked_goal_and_out_of_bounds() {
        let mut grid = open(10, 10);
        grid.set_cell(Tile::new(5, 5), CellType::Blocked);
        assert_eq!(find_path(&grid, Tile::new(0, 0), Tile::new(5, 5)), None);
        assert_eq!(find_path(&grid, Tile::new(0, 0), Tile::new(50, 5)), None);
        assert_eq!(find_path(&grid, Tile::new(-1, 0), Tile::new(5, 6)), None);
    }

    #[test]
    fn test_no_corner_cutting() {
        // The only diagonal shortcut passes between two blocked tiles.
        let grid = NavGrid::from_ascii(&["..#", ".#.", "..."], Fixed::ONE);
        assert!(!can_step(&grid, Tile::new(1, 0), Tile::new(2, 1)));
        let path = find_path(&grid, Tile::new(0, 0), Tile::new(2, 2)).unwrap();
        for pair in path.windows(2) {
            assert!(can_step(&grid, pair[0], pair[1]));
        }
    }

    #[test]
    fn test_diagonal_blocked_by_single_corner() {
        let grid = NavGrid::from_ascii(&[".#", ".."], Fixed::ONE);
        assert!(!can_step(&grid, Tile::new(0, 0), Tile::new(1, 1)));
        let path = find_path(&grid, Tile::new(0, 0), Tile::new(1, 1)).unwrap();
        assert_eq!(path, vec![Tile::new(0, 0), Tile::new(0, 1), Tile::new(1, 1)]);
    }

    #[test]
    fn test_squeezed_corridor_is_avoided() {
        // Gap at (2, 2) between two buildings; detour around is open.
        let grid = NavGrid::from_ascii(
            &[".....", ".....", "BB.BB", ".....", "....."],
            Fixed::ONE,
        );
        assert!(is_squeezed(&grid, Tile::new(2, 2)));
        let path = find_path(&grid, Tile::new(2, 0), Tile::new(2, 4));
        // The row is sealed apart from the squeezed gap.
        assert_eq!(path, None);
        // Squeezed goal is rejected, the nearest open tile is not.
        assert_eq!(find_path(&grid, Tile::new(0, 0), Tile::new(2, 2)), None);
        let fallback = nearest_open_tile(&grid, Tile::new(2, 2), 3).unwrap();
        assert!(is_standable(&grid, fallback));
        assert_eq!(fallback.chebyshev(Tile::new(2, 2)), 1);
    }

    #[test]
    fn test_slow_terrain_is_avoided_when_cheaper() {
        let grid = NavGrid::from_ascii(&[".....", ".~~~.", "....."], Fixed::ONE);
        let path = find_path(&grid, Tile::new(0, 1), Tile::new(4, 1)).unwrap();
        assert!(path.iter().all(|t| grid.cost_multiplier(*t) == Some(1)));
        assert_eq!(path_cost(&grid, &path), Some(14 + 10 + 10 + 14));
    }

    #[test]
    fn test_determinism() {
        let mut grid = open(20, 20);
        for i in 5..15 {
            grid.set_cell(Tile::new(10, i), CellType::Blocked);
        }
        let first = find_path(&grid, Tile::new(5, 10), Tile::new(15, 10));
        for _ in 0..3 {
            assert_eq!(find_path(&grid, Tile::new(5, 10), Tile::new(15, 10)), first);
        }
    }

    #[test]
    fn test_avoiding_agents_routes_around_and_exempts_goal() {
        let grid = open(7, 3);
        let mut storage = EntityStorage::new();
        let mut spawn = |class| {
            storage.insert(Entity::Agent(Agent::new(class, 1, Vec2Fixed::ZERO)))
        };
        let me = spawn(AgentClass::Vehicle);
        let blocker = spawn(AgentClass::Vehicle);
        let parked = spawn(AgentClass::Vehicle);

        let mut occupancy = OccupancyGrid::new(&grid);
        let mover = Mover {
            id: me,
            class: AgentClass::Vehicle,
            team: 1,
        };
        let other = |id, tile| Occupant {
            mover: Mover { id, ..mover },
            tile,
            subslot: 0,
            reservation: None,
        };
        occupancy.rebuild(&mut [
            Occupant {
                mover,
                tile: Tile::new(0, 1),
                subslot: 0,
                reservation: None,
            },
            other(blocker, Tile::new(3, 1)),
            other(parked, Tile::new(6, 1)),
        ]);

        let plain = find_path(&grid, Tile::new(0, 1), Tile::new(6, 1)).unwrap();
        assert!(plain.contains(&Tile::new(3, 1)));

        let soft = find_path_avoiding_agents(
            &grid,
            &occupancy,
            mover,
            Tile::new(0, 1),
            Tile::new(6, 1),
            AGENT_PENALTY,
        )
        .unwrap();
        assert!(!soft.contains(&Tile::new(3, 1)));
        assert_eq!(soft.last(), Some(&Tile::new(6, 1)));
    }

    #[test]
    fn test_ring_tiles() {
        let tiles: Vec<_> = ring(Tile::new(0, 0), 1).collect();
        assert_eq!(tiles.len(), 8);
        assert!(!tiles.contains(&Tile::new(0, 0)));
        assert_eq!(ring(Tile::new(0, 0), 2).count(), 16);
    }
}
