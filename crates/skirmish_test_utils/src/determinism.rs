//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Lockstep play and replays need bit-identical results. Sources of
//! non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`skirmish_core::math::Fixed`]
//!   throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Agents are always processed in handle order.
//!
//! - **System randomness**: Per-agent spread comes from handle hashes,
//!   never from an RNG.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual phase determinism (motion, weapons, etc.)
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full scenarios are reproducible
//! 4. **Parallel tests**: Running N simulations on threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use skirmish_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();
        for _ in 0..ticks {
            step(&mut state);
        }
        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a [`Simulation`] twice from the same setup and compare final hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        Simulation::state_hash,
    )
    .is_deterministic
}

/// Run N simulations on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling or
/// memory layout differences.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        sim1.tick();
        sim2.tick();
        if sim1.state_hash() != sim2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Verify that a serialization round-trip mid-run changes nothing: the
/// restored copy must track the original for another `num_ticks`.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();
    for _ in 0..num_ticks {
        sim.tick();
    }

    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(mut restored) = Simulation::deserialize(&bytes) else {
        return false;
    };
    if restored.state_hash() != sim.state_hash() {
        return false;
    }

    for _ in 0..num_ticks {
        sim.tick();
        restored.tick();
    }
    restored.state_hash() == sim.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for maps, agents and command scripts.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing.
pub mod strategies {
    use proptest::prelude::*;
    use skirmish_core::components::{AgentClass, TeamId};
    use skirmish_core::grid::{NavGrid, Tile};
    use skirmish_core::math::{Fixed, Vec2Fixed};

    /// A tile inside a `width` × `height` map.
    pub fn arb_tile(width: i32, height: i32) -> impl Strategy<Value = Tile> {
        (0..width, 0..height).prop_map(|(x, y)| Tile::new(x, y))
    }

    /// Infantry or vehicle.
    pub fn arb_agent_class() -> impl Strategy<Value = AgentClass> {
        prop_oneof![Just(AgentClass::Infantry), Just(AgentClass::Vehicle)]
    }

    /// Team 1 or 2.
    pub fn arb_team() -> impl Strategy<Value = TeamId> {
        1u8..=2u8
    }

    /// A point anywhere inside a `width` × `height` unit-tile map, on a
    /// quarter-tile lattice.
    pub fn arb_point(width: i32, height: i32) -> impl Strategy<Value = Vec2Fixed> {
        (0..width * 4, 0..height * 4).prop_map(|(x, y)| {
            Vec2Fixed::new(Fixed::from_num(x) / 4, Fixed::from_num(y) / 4)
        })
    }

    /// ASCII rows with roughly `wall_percent` percent blocked terrain and a
    /// sprinkling of slow terrain.
    pub fn arb_ascii_map(
        width: usize,
        height: usize,
        wall_percent: u32,
    ) -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec(
            proptest::collection::vec(0u32..100, width),
            height,
        )
        .prop_map(move |rows| {
            rows.into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|roll| match roll {
                            r if r < wall_percent => '#',
                            r if r < wall_percent + 10 => '~',
                            _ => '.',
                        })
                        .collect()
                })
                .collect()
        })
    }

    /// A unit-tile navigation grid built from [`arb_ascii_map`].
    pub fn arb_nav_grid(
        width: usize,
        height: usize,
        wall_percent: u32,
    ) -> impl Strategy<Value = NavGrid> {
        arb_ascii_map(width, height, wall_percent).prop_map(|rows| {
            let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
            NavGrid::from_ascii(&refs, Fixed::ONE)
        })
    }

    /// One entry of a scripted move order: tick, mover index and goal.
    #[derive(Debug, Clone, Copy)]
    pub struct ScriptedMove {
        /// Tick the order is issued before.
        pub tick: u64,
        /// Index into the spawned agent list.
        pub agent: usize,
        /// Destination.
        pub goal: Vec2Fixed,
    }

    /// A list of move orders spread over `max_tick` ticks.
    pub fn arb_move_script(
        agents: usize,
        width: i32,
        height: i32,
        max_tick: u64,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<ScriptedMove>> {
        proptest::collection::vec(
            (0..max_tick, 0..agents.max(1), arb_point(width, height)).prop_map(
                |(tick, agent, goal)| ScriptedMove { tick, agent, goal },
            ),
            0..max_len,
        )
        .prop_map(|mut script| {
            script.sort_by_key(|m| m.tick);
            script
        })
    }
}
