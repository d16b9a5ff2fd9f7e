//! Per-tile occupancy and reservations.
//!
//! The grid is rebuilt from scratch at the start of every tick from live
//! agent positions and their outstanding reservations. It is never patched
//! across ticks; within a tick only reservations are added.

use serde::{Deserialize, Serialize};

use crate::components::{AgentClass, TeamId};
use crate::entity::EntityId;
use crate::grid::{NavGrid, Tile};

/// Sub-slots per tile.
pub const SUBSLOT_COUNT: usize = 4;

/// Identity of an agent for occupancy checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mover {
    /// Agent handle.
    pub id: EntityId,
    /// Movement class.
    pub class: AgentClass,
    /// Team.
    pub team: TeamId,
}

/// One agent's input to [`OccupancyGrid::rebuild`].
///
/// `subslot` and `reservation` are corrected in place when they conflict
/// with an earlier agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    /// Agent identity.
    pub mover: Mover,
    /// Tile the agent stands on.
    pub tile: Tile,
    /// Claimed sub-slot (infantry).
    pub subslot: u8,
    /// Outstanding reservation.
    pub reservation: Option<Tile>,
}

/// Counters for one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TileOccupancy {
    slot_owners: [Option<EntityId>; SUBSLOT_COUNT],
    infantry_count: u8,
    vehicle: Option<EntityId>,
    vehicle_count: u8,
    team: Option<TeamId>,
    mixed_teams: bool,
    reserved_by: Option<EntityId>,
    /// Agents that claimed the tile; more than one is a conflict.
    claims: u8,
}

impl TileOccupancy {
    /// Bit `i` set when sub-slot `i` is taken.
    #[must_use]
    pub fn infantry_mask(&self) -> u8 {
        self.slot_owners
            .iter()
            .enumerate()
            .filter(|(_, owner)| owner.is_some())
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }

    /// Infantry standing here.
    #[must_use]
    pub const fn infantry_count(&self) -> u8 {
        self.infantry_count
    }

    /// Vehicles standing here.
    #[must_use]
    pub const fn vehicle_count(&self) -> u8 {
        self.vehicle_count
    }

    /// Team of the occupants.
    #[must_use]
    pub const fn team(&self) -> Option<TeamId> {
        self.team
    }

    /// Reservation owner.
    #[must_use]
    pub const fn reserved_by(&self) -> Option<EntityId> {
        self.reserved_by
    }

    /// Whether nothing stands here.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.infantry_count == 0 && self.vehicle_count == 0
    }

    fn holds(&self, id: EntityId) -> bool {
        self.vehicle == Some(id) || self.slot_owners.contains(&Some(id))
    }
}

/// A broken occupancy invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyViolation {
    /// More than one vehicle on a tile.
    TooManyVehicles {
        /// Tile.
        tile: Tile,
        /// Vehicles found.
        count: u8,
    },
    /// More than four infantry on a tile.
    TooManyInfantry {
        /// Tile.
        tile: Tile,
        /// Infantry found.
        count: u8,
    },
    /// Infantry and a vehicle share a tile.
    MixedClasses {
        /// Tile.
        tile: Tile,
    },
    /// Infantry of different teams share a tile.
    MixedTeams {
        /// Tile.
        tile: Tile,
    },
    /// Two agents hold a reservation on the same tile.
    DuplicateReservation {
        /// Tile.
        tile: Tile,
    },
}

/// What a rebuild had to correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebuildReport {
    /// Reservations dropped because a lower id already held the tile.
    pub reservation_conflicts: u32,
    /// Infantry moved to a different sub-slot.
    pub slot_reassignments: u32,
}

/// Occupancy for every tile of the navigation grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OccupancyGrid {
    width: u32,
    height: u32,
    tiles: Vec<TileOccupancy>,
}

impl OccupancyGrid {
    /// Empty grid sized to match `grid`.
    #[must_use]
    pub fn new(grid: &NavGrid) -> Self {
        Self {
            width: grid.width(),
            height: grid.height(),
            tiles: vec![TileOccupancy::default(); (grid.width() * grid.height()) as usize],
        }
    }

    fn index(&self, tile: Tile) -> Option<usize> {
        if tile.x >= 0 && tile.y >= 0 && (tile.x as u32) < self.width && (tile.y as u32) < self.height
        {
            Some((tile.y as usize) * (self.width as usize) + (tile.x as usize))
        } else {
            None
        }
    }

    /// Counters for a tile.
    #[must_use]
    pub fn tile(&self, tile: Tile) -> Option<&TileOccupancy> {
        self.index(tile).map(|i| &self.tiles[i])
    }

    /// Clear and repopulate from the agent list.
    ///
    /// Occupants must be given in processing order; on conflicts the earlier
    /// entry keeps its sub-slot and reservation.
    pub fn rebuild(&mut self, occupants: &mut [Occupant]) -> RebuildReport {
        let mut report = RebuildReport::default();
        self.tiles.fill(TileOccupancy::default());

        for occ in occupants.iter_mut() {
            let Some(i) = self.index(occ.tile) else {
                continue;
            };
            let cell = &mut self.tiles[i];
            match occ.mover.team {
                team if cell.team.is_some_and(|t| t != team) => cell.mixed_teams = true,
                team => cell.team = Some(team),
            }
            match occ.mover.class {
                AgentClass::Vehicle => {
                    cell.vehicle_count = cell.vehicle_count.saturating_add(1);
                    cell.vehicle.get_or_insert(occ.mover.id);
                }
                AgentClass::Infantry => {
                    cell.infantry_count = cell.infantry_count.saturating_add(1);
                    let wanted = usize::from(occ.subslot);
                    if wanted < SUBSLOT_COUNT && cell.slot_owners[wanted].is_none() {
                        cell.slot_owners[wanted] = Some(occ.mover.id);
                    } else if let Some(free) = cell.slot_owners.iter().position(Option::is_none) {
                        cell.slot_owners[free] = Some(occ.mover.id);
                        occ.subslot = free as u8;
                        report.slot_reassignments += 1;
                    }
                }
            }
        }

        for occ in occupants.iter_mut() {
            let Some(tile) = occ.reservation else {
                continue;
            };
            let Some(i) = self.index(tile) else {
                occ.reservation = None;
                continue;
            };
            let cell = &mut self.tiles[i];
            cell.claims = cell.claims.saturating_add(1);
            match cell.reserved_by {
                None => cell.reserved_by = Some(occ.mover.id),
                Some(owner) if owner == occ.mover.id => {}
                Some(_) => {
                    occ.reservation = None;
                    report.reservation_conflicts += 1;
                }
            }
        }

        report
    }

    /// Whether the class capacity rule admits `mover` and no other agent
    /// has reserved the tile.
    #[must_use]
    pub fn can_enter(&self, grid: &NavGrid, mover: Mover, tile: Tile) -> bool {
        self.has_capacity(grid, mover, tile)
            && self
                .reservation_owner(tile)
                .map_or(true, |owner| owner == mover.id)
    }

    /// Capacity rule alone, ignoring reservations.
    #[must_use]
    pub fn has_capacity(&self, grid: &NavGrid, mover: Mover, tile: Tile) -> bool {
        if !grid.is_walkable(tile) {
            return false;
        }
        let Some(cell) = self.tile(tile) else {
            return false;
        };
        let own = u8::from(cell.holds(mover.id));
        match mover.class {
            AgentClass::Vehicle => {
                cell.infantry_count == 0 && cell.vehicle_count.saturating_sub(own) == 0
            }
            AgentClass::Infantry => {
                let others = cell.infantry_count.saturating_sub(own);
                cell.vehicle_count == 0
                    && usize::from(others) < SUBSLOT_COUNT
                    && (others == 0 || (cell.team == Some(mover.team) && !cell.mixed_teams))
            }
        }
    }

    /// Claim a tile for the rest of this tick.
    ///
    /// Succeeds when unclaimed or already claimed by the same agent, and the
    /// capacity rule admits it.
    pub fn reserve(&mut self, grid: &NavGrid, mover: Mover, tile: Tile) -> bool {
        if !self.can_enter(grid, mover, tile) {
            return false;
        }
        match self.index(tile) {
            Some(i) => {
                self.tiles[i].reserved_by = Some(mover.id);
                self.tiles[i].claims = 1;
                true
            }
            None => false,
        }
    }

    /// Drop a reservation held by `id`.
    pub fn release(&mut self, id: EntityId, tile: Tile) {
        if let Some(i) = self.index(tile) {
            if self.tiles[i].reserved_by == Some(id) {
                self.tiles[i].reserved_by = None;
                self.tiles[i].claims = 0;
            }
        }
    }

    /// Every reserved tile with its owner, in row-major order.
    pub fn reservations(&self) -> impl Iterator<Item = (Tile, EntityId)> + '_ {
        let width = self.width as usize;
        self.tiles.iter().enumerate().filter_map(move |(i, cell)| {
            cell.reserved_by
                .map(|owner| (Tile::new((i % width) as i32, (i / width) as i32), owner))
        })
    }

    /// Reservation owner of a tile.
    #[must_use]
    pub fn reservation_owner(&self, tile: Tile) -> Option<EntityId> {
        self.tile(tile).and_then(|c| c.reserved_by)
    }

    /// Lowest sub-slot free for `id` on `tile`.
    #[must_use]
    pub fn free_subslot(&self, id: EntityId, tile: Tile) -> Option<u8> {
        let cell = self.tile(tile)?;
        cell.slot_owners
            .iter()
            .position(|owner| owner.map_or(true, |o| o == id))
            .map(|i| i as u8)
    }

    /// Whether another agent stands on or has reserved the tile.
    #[must_use]
    pub fn is_claimed_by_other(&self, id: EntityId, tile: Tile) -> bool {
        self.tile(tile).is_some_and(|cell| {
            let standing = cell.infantry_count.saturating_add(cell.vehicle_count);
            cell.reserved_by.is_some_and(|owner| owner != id)
                || standing.saturating_sub(u8::from(cell.holds(id))) > 0
        })
    }

    /// Check capacity invariants on every tile.
    #[must_use]
    pub fn validate(&self) -> Vec<OccupancyViolation> {
        let mut violations = Vec::new();
        for (i, cell) in self.tiles.iter().enumerate() {
            let tile = Tile::new(
                (i % self.width as usize) as i32,
                (i / self.width as usize) as i32,
            );
            if cell.vehicle_count > 1 {
                violations.push(OccupancyViolation::TooManyVehicles {
                    tile,
                    count: cell.vehicle_count,
                });
            }
            if usize::from(cell.infantry_count) > SUBSLOT_COUNT {
                violations.push(OccupancyViolation::TooManyInfantry {
                    tile,
                    count: cell.infantry_count,
                });
            }
            if cell.vehicle_count > 0 && cell.infantry_count > 0 {
                violations.push(OccupancyViolation::MixedClasses { tile });
            }
            if cell.mixed_teams {
                violations.push(OccupancyViolation::MixedTeams { tile });
            }
            if cell.claims > 1 {
                violations.push(OccupancyViolation::DuplicateReservation { tile });
            }
        }
        violations
    }
}

/// Whether agents cannot stand on `tile` without clipping a structure.
///
/// True for walkable tiles with two or more structure tiles among their
/// four orthogonal neighbours: one-wide corridors and inside corners.
#[must_use]
pub fn is_squeezed(grid: &NavGrid, tile: Tile) -> bool {
    if !grid.is_walkable(tile) {
        return false;
    }
    let walls = [(1, 0), (-1, 0), (0, 1), (0, -1)]
        .iter()
        .filter(|(dx, dy)| grid.is_structure(tile.offset(*dx, *dy)))
        .count();
    walls >= 2
}

/// Whether an agent may stand on `tile` at all.
#[must_use]
pub fn is_standable(grid: &NavGrid, tile: Tile) -> bool {
    grid.is_walkable(tile) && !is_squeezed(grid, tile)
}
