//! Test fixtures and helpers.
//!
//! Pre-built maps, loadouts and scenarios for consistent testing.

use skirmish_core::combat::Weapon;
use skirmish_core::components::{Agent, AgentClass, Structure, TeamId};
use skirmish_core::entity::EntityId;
use skirmish_core::grid::Tile;
use skirmish_core::math::{ratio, Fixed, Vec2Fixed};
use skirmish_core::simulation::Simulation;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Centre of tile `(x, y)` on a unit-tile map.
#[must_use]
pub fn center(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_num(x, y) + Vec2Fixed::new(ratio(1, 2), ratio(1, 2))
}

// ============================================================================
// Loadouts
// ============================================================================

/// Short-range hitscan rifle.
#[must_use]
pub fn rifle() -> Weapon {
    Weapon::hitscan(8, fixed(3), 10)
}

/// Vehicle cannon.
#[must_use]
pub fn cannon() -> Weapon {
    Weapon::hitscan(30, fixed(4), 25)
}

/// Homing-free rocket that flies in a straight line.
#[must_use]
pub fn rocket() -> Weapon {
    Weapon::hitscan(40, fixed(5), 40).with_missile(ratio(1, 2), 20)
}

/// Lobbed shell with splash.
#[must_use]
pub fn artillery() -> Weapon {
    Weapon::hitscan(60, fixed(7), 60)
        .with_shell(12)
        .with_splash(ratio(3, 2))
}

/// Armed infantry standing at the centre of tile `(x, y)`.
#[must_use]
pub fn rifleman(team: TeamId, x: i32, y: i32) -> Agent {
    Agent::new(AgentClass::Infantry, team, center(x, y)).with_weapon(rifle())
}

/// Armed vehicle standing at the centre of tile `(x, y)`.
#[must_use]
pub fn tank(team: TeamId, x: i32, y: i32) -> Agent {
    Agent::new(AgentClass::Vehicle, team, center(x, y)).with_weapon(cannon())
}

/// Spawn every agent, panicking on placement errors.
///
/// # Panics
///
/// Panics if any agent lands on an unwalkable tile.
pub fn spawn_all(sim: &mut Simulation, agents: impl IntoIterator<Item = Agent>) -> Vec<EntityId> {
    agents
        .into_iter()
        .map(|agent| sim.spawn_agent(agent).expect("fixture agent placement"))
        .collect()
}

// ============================================================================
// Scenarios
// ============================================================================

/// Two opposing squads on an open map, ordered to attack-move through
/// each other.
///
/// # Panics
///
/// Panics if the fixed layout fails to place.
#[must_use]
pub fn skirmish_scenario() -> Simulation {
    let mut sim = Simulation::new(32, 32);
    let blue = spawn_all(
        &mut sim,
        (0..4)
            .map(|i| rifleman(1, 3 + i, 4))
            .chain((0..2).map(|i| tank(1, 3 + 2 * i, 2))),
    );
    let red = spawn_all(
        &mut sim,
        (0..4)
            .map(|i| rifleman(2, 24 + i, 27))
            .chain((0..2).map(|i| tank(2, 24 + 2 * i, 29))),
    );
    sim.issue_attack_move(&blue, center(26, 27))
        .expect("blue attack-move");
    sim.issue_attack_move(&red, center(4, 4)).expect("red attack-move");
    sim
}

/// Twelve infantry facing a one-tile gap between two structures, with a
/// detour around either end.
///
/// Returns the simulation, the walkers and the goal point beyond the gap.
///
/// # Panics
///
/// Panics if the fixed layout fails to place.
#[must_use]
pub fn corridor_scenario() -> (Simulation, Vec<EntityId>, Vec2Fixed) {
    let mut sim = Simulation::new(24, 16);
    sim.spawn_structure(Structure::new(0, Tile::new(10, 2), 3, 5, 1000))
        .expect("north wall");
    sim.spawn_structure(Structure::new(0, Tile::new(10, 8), 3, 5, 1000))
        .expect("south wall");
    let walkers = spawn_all(
        &mut sim,
        (0..12).map(|i| {
            Agent::new(
                AgentClass::Infantry,
                1,
                center(2 + i % 3, 5 + i / 3),
            )
        }),
    );
    let goal = center(19, 7);
    (sim, walkers, goal)
}

/// Ten attackers around one enemy structure.
///
/// Returns the simulation, the attackers and the structure.
///
/// # Panics
///
/// Panics if the fixed layout fails to place.
#[must_use]
pub fn siege_scenario() -> (Simulation, Vec<EntityId>, EntityId) {
    let mut sim = Simulation::new(32, 32);
    let depot = sim
        .spawn_structure(Structure::new(2, Tile::new(14, 14), 3, 3, 2000))
        .expect("depot");
    let attackers = spawn_all(
        &mut sim,
        (0..6)
            .map(|i| rifleman(1, 4 + i, 4))
            .chain((0..4).map(|i| tank(1, 4 + 2 * i, 26))),
    );
    (sim, attackers, depot)
}

/// `count` vehicles in a column ordered to a shared point.
///
/// # Panics
///
/// Panics if `count` does not fit in the column.
#[must_use]
pub fn convoy_scenario(count: i32) -> (Simulation, Vec<EntityId>) {
    let mut sim = Simulation::new(40, 40);
    let ids = spawn_all(
        &mut sim,
        (0..count).map(|i| Agent::new(AgentClass::Vehicle, 1, center(2 + i % 4, 2 + i / 4))),
    );
    sim.issue_move(&ids, center(30, 30)).expect("convoy move");
    (sim, ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenarios_start_valid() {
        assert!(skirmish_scenario().check_invariants().is_empty());
        assert!(corridor_scenario().0.check_invariants().is_empty());
        assert!(siege_scenario().0.check_invariants().is_empty());
        assert!(convoy_scenario(12).0.check_invariants().is_empty());
    }

    #[test]
    fn test_corridor_gap_is_squeezed() {
        let (sim, _, _) = corridor_scenario();
        let nav = sim.context().nav();
        let open: Vec<i32> = (2..13)
            .filter(|&y| nav.is_walkable(Tile::new(11, y)))
            .collect();
        assert_eq!(open, vec![7]);
        assert!(skirmish_core::occupancy::is_squeezed(nav, Tile::new(11, 7)));
    }
}
