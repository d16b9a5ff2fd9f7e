//! Runs the bundled scenario files end to end.

use std::path::PathBuf;

use skirmish_core::replay::{Replay, ReplayPlayer};
use skirmish_headless::runner::{run_scenario, RunOptions};
use skirmish_headless::scenario::Scenario;

fn load(name: &str) -> Scenario {
    let path: PathBuf = [env!("CARGO_MANIFEST_DIR"), "scenarios", name].iter().collect();
    Scenario::load(path).unwrap()
}

fn checked() -> RunOptions {
    RunOptions {
        check_invariants: true,
        ..RunOptions::default()
    }
}

#[test]
fn test_bundled_scenarios_parse_and_build() {
    for name in ["corridor.ron", "siege.ron", "skirmish.ron"] {
        let scenario = load(name);
        let setup = scenario.build().unwrap();
        for scripted in &scenario.script {
            setup.to_command(&scripted.command).unwrap();
        }
    }
}

#[test]
fn test_corridor_keeps_invariants() {
    let output = run_scenario(&load("corridor.ron"), &checked()).unwrap();
    assert_eq!(output.summary.invariant_failures, 0);
    assert_eq!(output.summary.rejected_commands, 0);
    assert_eq!(output.summary.teams[&1].agents_alive, 12);
}

#[test]
fn test_siege_levels_depot() {
    let output = run_scenario(&load("siege.ron"), &checked()).unwrap();
    let summary = &output.summary;
    assert_eq!(summary.invariant_failures, 0);
    assert_eq!(summary.deaths, 1);
    assert_eq!(summary.teams[&1].agents_alive, 10);
    assert_eq!(summary.teams[&1].structures_alive, 0);
}

#[test]
fn test_skirmish_replay_round_trip() {
    let options = RunOptions {
        record: true,
        ..checked()
    };
    let output = run_scenario(&load("skirmish.ron"), &options).unwrap();
    assert_eq!(output.summary.invariant_failures, 0);
    assert!(output.summary.deaths > 0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skirmish.replay");
    output.replay.unwrap().save(&path).unwrap();

    let replay = Replay::load(&path).unwrap();
    assert_eq!(replay.final_hash, output.summary.final_hash);
    let mut player = ReplayPlayer::new(replay).unwrap();
    assert!(player.verify().unwrap());
}
