//! # Skirmish Headless
//!
//! Runs RON scenarios against the simulation core without graphics:
//! - Scenario loading and label resolution
//! - Scripted command playback with invariant checks
//! - JSON run summaries and replay files

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod runner;
pub mod scenario;
