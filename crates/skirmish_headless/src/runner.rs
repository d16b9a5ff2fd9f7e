//! Headless scenario runner.
//!
//! Builds a scenario, feeds its script through the command API tick by
//! tick, and condenses the tick events into a JSON-friendly summary.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use skirmish_core::components::TeamId;
use skirmish_core::replay::Replay;
use skirmish_core::weapons::CombatEvent;

use crate::scenario::{Scenario, ScenarioError};

/// Runner options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Override the scenario's run length.
    pub ticks: Option<u64>,
    /// Check occupancy invariants after every tick.
    pub check_invariants: bool,
    /// Record a replay of the accepted commands.
    pub record: bool,
}

/// Per-team totals at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeamSummary {
    /// Agents still alive.
    pub agents_alive: usize,
    /// Structures still standing.
    pub structures_alive: usize,
    /// Shots fired.
    pub shots_fired: u64,
    /// Damage dealt to others.
    pub damage_dealt: u64,
}

/// Outcome of a headless run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Scenario name.
    pub scenario: String,
    /// Ticks simulated.
    pub ticks: u64,
    /// State hash after the last tick.
    pub final_hash: u64,
    /// Per-team totals.
    pub teams: BTreeMap<TeamId, TeamSummary>,
    /// Entities destroyed.
    pub deaths: usize,
    /// Harvest, capture and repair arrivals.
    pub handoffs: usize,
    /// Scripted commands the simulation rejected.
    pub rejected_commands: usize,
    /// Reservation conflicts resolved by occupancy rebuilds.
    pub reservation_conflicts: u64,
    /// Ticks on which the invariant check found a violation.
    pub invariant_failures: u64,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunOutput {
    /// Summary for printing.
    pub summary: RunSummary,
    /// Replay, when requested.
    pub replay: Option<Replay>,
}

/// Run a scenario to completion.
///
/// # Errors
///
/// Returns an error if the scenario cannot be built or a scripted command
/// names an unknown label.
pub fn run_scenario(scenario: &Scenario, options: &RunOptions) -> Result<RunOutput, ScenarioError> {
    let mut setup = scenario.build()?;
    let ticks = options.ticks.unwrap_or(scenario.ticks);
    let commands = scenario
        .script
        .iter()
        .map(|s| Ok((s.tick, setup.to_command(&s.command)?)))
        .collect::<Result<Vec<_>, ScenarioError>>()?;

    let mut summary = RunSummary {
        scenario: scenario.name.clone(),
        ..RunSummary::default()
    };
    let sim = &mut setup.simulation;
    if options.record {
        if let Err(err) = sim.start_recording(scenario.name.clone()) {
            warn!(%err, "Replay recording unavailable");
        }
    }
    info!(scenario = %scenario.name, ticks, agents = scenario.agents.len(), "Running scenario");

    let mut pending = commands.into_iter().peekable();
    for tick in 0..ticks {
        while let Some((_, command)) = pending.next_if(|(t, _)| *t <= tick) {
            let name = command.name();
            if let Err(err) = sim.apply_command(command) {
                warn!(tick, command = name, %err, "Scripted command rejected");
                summary.rejected_commands += 1;
            }
        }

        let events = sim.tick();
        summary.deaths += events.deaths.len();
        summary.handoffs += events.handoffs.len();
        summary.reservation_conflicts += u64::from(events.occupancy.reservation_conflicts);
        for event in &events.combat {
            tally(&mut summary, sim, event);
        }

        if options.check_invariants {
            let violations = sim.check_invariants();
            if !violations.is_empty() {
                warn!(tick, ?violations, "Occupancy invariant violated");
                summary.invariant_failures += 1;
            }
        }
    }

    for (_, agent) in sim.entities().agents() {
        summary.teams.entry(agent.team).or_default().agents_alive += 1;
    }
    for (_, structure) in sim.entities().structures() {
        summary.teams.entry(structure.team).or_default().structures_alive += 1;
    }
    summary.ticks = sim.get_tick();
    summary.final_hash = sim.state_hash();
    let replay = sim.finish_recording();

    info!(
        scenario = %summary.scenario,
        hash = summary.final_hash,
        deaths = summary.deaths,
        "Scenario finished"
    );
    Ok(RunOutput { summary, replay })
}

fn tally(summary: &mut RunSummary, sim: &skirmish_core::simulation::Simulation, event: &CombatEvent) {
    let team_of = |id| sim.agent(id).map(|a| a.team);
    match event {
        CombatEvent::ShotFired { shooter, .. } => {
            if let Some(team) = team_of(*shooter) {
                summary.teams.entry(team).or_default().shots_fired += 1;
            }
        }
        CombatEvent::DamageDealt { source, amount, .. } => {
            if let Some(team) = team_of(*source) {
                summary.teams.entry(team).or_default().damage_dealt += u64::from(*amount);
            }
        }
        CombatEvent::ProjectileExpired { projectile, detonated } => {
            debug!(projectile, detonated, "Projectile expired");
        }
    }
}
