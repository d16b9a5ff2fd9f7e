//! Headless skirmish runner.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario and print a JSON summary
//! cargo run -p skirmish_headless -- run --scenario scenarios/corridor.ron
//!
//! # Check occupancy invariants every tick and save a replay
//! cargo run -p skirmish_headless -- run -s scenarios/siege.ron --check --replay out.replay
//!
//! # Re-run a replay and compare the final state hash
//! cargo run -p skirmish_headless -- verify --replay out.replay
//! ```
//!
//! Summaries go to stdout; logs go to stderr and honour `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skirmish_core::replay::{Replay, ReplayPlayer};
use skirmish_headless::runner::{run_scenario, RunOptions};
use skirmish_headless::scenario::Scenario;

#[derive(Parser)]
#[command(name = "skirmish_headless")]
#[command(about = "Headless skirmish simulation runner")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print a summary
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override the scenario's tick count
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Check occupancy invariants after every tick
        #[arg(long)]
        check: bool,

        /// Save a replay of the run to this path
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Replay a recording and compare the final state hash
    Verify {
        /// Replay file
        #[arg(short, long)]
        replay: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            ticks,
            check,
            replay,
        } => cmd_run(&scenario, ticks, check, replay),
        Commands::Verify { replay } => cmd_verify(&replay),
    }
}

fn cmd_run(path: &Path, ticks: Option<u64>, check: bool, replay_path: Option<PathBuf>) -> ExitCode {
    let scenario = match Scenario::load(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to load scenario: {e}");
            return ExitCode::FAILURE;
        }
    };

    let options = RunOptions {
        ticks,
        check_invariants: check,
        record: replay_path.is_some(),
    };
    let output = match run_scenario(&scenario, &options) {
        Ok(o) => o,
        Err(e) => {
            tracing::error!("Scenario failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let (Some(path), Some(replay)) = (replay_path, output.replay.as_ref()) {
        match replay.save(&path) {
            Ok(()) => tracing::info!("Replay saved to {}", path.display()),
            Err(e) => {
                tracing::error!("Failed to save replay: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    match serde_json::to_string_pretty(&output.summary) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!("Failed to encode summary: {e}");
            return ExitCode::FAILURE;
        }
    }

    if check && output.summary.invariant_failures > 0 {
        tracing::warn!(
            failures = output.summary.invariant_failures,
            "Invariant check failed"
        );
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn cmd_verify(path: &Path) -> ExitCode {
    let result = Replay::load(path)
        .and_then(ReplayPlayer::new)
        .and_then(|mut player| player.verify());
    match result {
        Ok(true) => {
            tracing::info!("Replay verified");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            tracing::error!("Replay diverged from the recorded final hash");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("Failed to verify replay: {e}");
            ExitCode::FAILURE
        }
    }
}
