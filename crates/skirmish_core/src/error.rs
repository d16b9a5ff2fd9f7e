//! Error types for the simulation core.
//!
//! Only API-boundary failures are errors. Unreachable paths, reservation
//! conflicts and stale targets are ordinary outcomes handled in-tick.

use thiserror::Error;

use crate::entity::EntityId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Invalid or stale entity handle.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// A command that cannot apply to the given entities.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Invalid simulation state (serialization, corrupted data).
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),

    /// Configuration text could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        /// Parser message.
        message: String,
    },

    /// Replay file written by an incompatible format version.
    #[error("Replay version mismatch: expected {expected}, found {found}")]
    ReplayVersion {
        /// Version this build reads.
        expected: u32,
        /// Version found in the file.
        found: u32,
    },
}
