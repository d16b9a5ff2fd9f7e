//! Replay recording and playback.
//!
//! A replay stores the serialized starting state and every accepted
//! command with the tick it was applied on. Because the simulation is
//! deterministic, replaying the commands reproduces the final state hash
//! exactly.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::commands::Command;
use crate::error::{GameError, Result};
use crate::simulation::Simulation;

/// A command and the tick it was applied on, before that tick ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayCommand {
    /// Simulation tick when the command was issued.
    pub tick: u64,
    /// The command that was issued.
    pub command: Command,
}

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Complete replay data structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Scenario identifier or name.
    pub scenario_id: String,
    /// Serialized starting simulation state.
    pub initial_state: Vec<u8>,
    /// Accepted commands in tick order.
    pub commands: Vec<ReplayCommand>,
    /// Tick the recording stopped at.
    pub final_tick: u64,
    /// State hash at `final_tick`.
    pub final_hash: u64,
}

impl Replay {
    /// Create a replay starting from the simulation's current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized.
    pub fn new(scenario_id: impl Into<String>, initial_state: &Simulation) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            initial_state: initial_state.serialize()?,
            commands: Vec::new(),
            final_tick: initial_state.get_tick(),
            final_hash: initial_state.state_hash(),
        })
    }

    /// Append a command.
    pub fn record_command(&mut self, tick: u64, command: Command) {
        self.commands.push(ReplayCommand { tick, command });
    }

    /// Stamp the end state.
    pub fn finalize(&mut self, final_tick: u64, final_hash: u64) {
        self.final_tick = final_tick;
        self.final_hash = final_hash;
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to write replay file: {e}")))?;
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or decoding fails, or
    /// [`GameError::ReplayVersion`] for a file from another format version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| GameError::InvalidState(format!("Failed to read replay file: {e}")))?;
        let replay: Self = bincode::deserialize(&bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::ReplayVersion {
                expected: REPLAY_VERSION,
                found: replay.version,
            });
        }
        Ok(replay)
    }

    /// Decode the starting state.
    ///
    /// # Errors
    ///
    /// Returns an error if state deserialization fails.
    pub fn restore_initial_state(&self) -> Result<Simulation> {
        Simulation::deserialize(&self.initial_state)
    }

    /// Commands applied on a given tick.
    #[must_use]
    pub fn commands_at_tick(&self, tick: u64) -> Vec<&ReplayCommand> {
        self.commands.iter().filter(|c| c.tick == tick).collect()
    }

    /// Final tick of the recording.
    #[must_use]
    pub const fn duration(&self) -> u64 {
        self.final_tick
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

/// Collects accepted commands while a simulation runs.
#[derive(Debug, Clone)]
pub struct ReplayRecorder {
    replay: Replay,
}

impl ReplayRecorder {
    /// Start recording into an empty replay.
    #[must_use]
    pub const fn new(replay: Replay) -> Self {
        Self { replay }
    }

    /// Record an accepted command.
    pub fn record(&mut self, tick: u64, command: Command) {
        self.replay.record_command(tick, command);
    }

    /// Finish and stamp the end state.
    #[must_use]
    pub fn finish(mut self, final_tick: u64, final_hash: u64) -> Replay {
        self.replay.finalize(final_tick, final_hash);
        debug!(
            scenario = %self.replay.scenario_id,
            commands = self.replay.command_count(),
            final_tick,
            "Replay recorded"
        );
        self.replay
    }
}

/// Replay playback controller.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    simulation: Simulation,
    command_index: usize,
}

impl ReplayPlayer {
    /// Create a player positioned at the replay's starting state.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial state cannot be restored.
    pub fn new(replay: Replay) -> Result<Self> {
        let simulation = replay.restore_initial_state()?;
        Ok(Self {
            replay,
            simulation,
            command_index: 0,
        })
    }

    fn step(&mut self) {
        let tick = self.simulation.get_tick();
        while let Some(cmd) = self.replay.commands.get(self.command_index) {
            if cmd.tick > tick {
                break;
            }
            if let Err(err) = self.simulation.apply_command(cmd.command.clone()) {
                debug!(tick, command = cmd.command.name(), %err, "Replayed command rejected");
            }
            self.command_index += 1;
        }
        self.simulation.tick();
    }

    /// Advance the replay by one tick.
    ///
    /// Returns true if there are more ticks to play.
    pub fn advance(&mut self) -> bool {
        if !self.is_finished() {
            self.step();
        }
        !self.is_finished()
    }

    /// Restart from the initial state and play up to `target_tick`.
    ///
    /// # Errors
    ///
    /// Returns an error if state restoration fails.
    pub fn seek(&mut self, target_tick: u64) -> Result<()> {
        self.simulation = self.replay.restore_initial_state()?;
        self.command_index = 0;
        let target = target_tick.min(self.replay.final_tick);
        while self.simulation.get_tick() < target {
            self.step();
        }
        Ok(())
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.simulation.get_tick()
    }

    /// Simulation state at the current tick.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Whether playback reached the final tick.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.simulation.get_tick() >= self.replay.final_tick
    }

    /// Replay from the start and compare the final hash.
    ///
    /// # Errors
    ///
    /// Returns an error if state restoration fails.
    pub fn verify(&mut self) -> Result<bool> {
        self.seek(self.replay.final_tick)?;
        let actual = self.simulation.state_hash();
        if actual != self.replay.final_hash {
            debug!(
                expected = self.replay.final_hash,
                actual,
                "Replay hash mismatch"
            );
        }
        Ok(actual == self.replay.final_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::Weapon;
    use crate::components::{Agent, AgentClass};
    use crate::math::{Fixed, Vec2Fixed};

    fn skirmish() -> (Simulation, Vec<crate::entity::EntityId>) {
        let mut sim = Simulation::new(24, 24);
        let gun = Weapon::hitscan(10, Fixed::from_num(3), 15);
        let ids = [(2, 2, 1), (3, 2, 1), (20, 20, 2)]
            .iter()
            .map(|&(x, y, team)| {
                sim.spawn_agent(
                    Agent::new(AgentClass::Infantry, team, Vec2Fixed::from_num(x, y))
                        .with_weapon(gun),
                )
                .unwrap()
            })
            .collect();
        (sim, ids)
    }

    fn record(ticks: u64) -> Replay {
        let (mut sim, ids) = skirmish();
        sim.start_recording("skirmish").unwrap();
        for tick in 0..ticks {
            if tick == 3 {
                sim.issue_attack_move(&ids[..2], Vec2Fixed::from_num(19, 19))
                    .unwrap();
            }
            if tick == 10 {
                sim.issue_attack_move(&ids[2..], Vec2Fixed::from_num(4, 4))
                    .unwrap();
            }
            sim.tick();
        }
        sim.finish_recording().unwrap()
    }

    #[test]
    fn test_replay_create() {
        let (sim, _) = skirmish();
        let replay = Replay::new("test_scenario", &sim).unwrap();
        assert_eq!(replay.version, REPLAY_VERSION);
        assert_eq!(replay.scenario_id, "test_scenario");
        assert!(replay.commands.is_empty());
        assert_eq!(replay.final_hash, sim.state_hash());
    }

    #[test]
    fn test_recorder_captures_command_ticks() {
        let replay = record(20);
        assert_eq!(replay.command_count(), 2);
        assert_eq!(replay.commands_at_tick(3).len(), 1);
        assert_eq!(replay.commands_at_tick(10).len(), 1);
        assert!(replay.commands_at_tick(7).is_empty());
        assert_eq!(replay.duration(), 20);
    }

    #[test]
    fn test_replay_verifies() {
        let replay = record(120);
        let mut player = ReplayPlayer::new(replay).unwrap();
        assert!(player.verify().unwrap());
        assert!(player.is_finished());
    }

    #[test]
    fn test_tampered_replay_fails_verification() {
        let mut replay = record(60);
        replay.commands.remove(0);
        let mut player = ReplayPlayer::new(replay).unwrap();
        assert!(!player.verify().unwrap());
    }

    #[test]
    fn test_replay_player_advance_and_seek() {
        let replay = record(30);
        let mut player = ReplayPlayer::new(replay).unwrap();
        for _ in 0..5 {
            assert!(player.advance());
        }
        assert_eq!(player.current_tick(), 5);

        player.seek(25).unwrap();
        assert_eq!(player.current_tick(), 25);
        player.seek(10).unwrap();
        assert_eq!(player.current_tick(), 10);
        player.seek(500).unwrap();
        assert_eq!(player.current_tick(), 30);
        assert!(!player.advance());
    }

    #[test]
    fn test_replay_save_load() {
        let replay = record(15);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skirmish.replay");
        replay.save(&path).unwrap();

        let loaded = Replay::load(&path).unwrap();
        assert_eq!(loaded.scenario_id, "skirmish");
        assert_eq!(loaded.command_count(), replay.command_count());
        assert_eq!(loaded.final_hash, replay.final_hash);
    }

    #[test]
    fn test_replay_version_mismatch() {
        let mut replay = record(1);
        replay.version = REPLAY_VERSION + 1;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.replay");
        replay.save(&path).unwrap();

        assert!(matches!(
            Replay::load(&path),
            Err(GameError::ReplayVersion { found, .. }) if found == REPLAY_VERSION + 1
        ));
    }
}
