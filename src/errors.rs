//! Error types for the battle engine.
//!
//! Gameplay failures (missed moves, blocked statuses, dropped actions) are not
//! errors: they become battle log records. The types here cover data loading,
//! configuration, hook dispatch and the session boundary.
use std::path::PathBuf;

use thiserror::Error;

use crate::battle::state::CombatantId;

/// Main error type for the battle engine
#[derive(Debug, Error)]
pub enum BattleEngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Failures while loading species or move data
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to parse {kind} data")]
    Parse {
        kind: &'static str,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("duplicate {kind} entry '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("unknown species '{0}'")]
    UnknownSpecies(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse battle config")]
    Parse(#[source] ron::error::SpannedError),

    #[error("invalid battle config: {0}")]
    Invalid(String),
}

/// Raised by an effect hook. The engine records it and keeps resolving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("hook '{hook}' references missing combatant {id}")]
    MissingCombatant { hook: String, id: CombatantId },

    #[error("hook '{hook}' failed: {reason}")]
    Failed { hook: String, reason: String },

    #[error("hook '{hook}' panicked: {message}")]
    Panicked { hook: String, message: String },
}

/// Failures while applying a command to the battle state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("no combatant with id {0}")]
    NoCombatant(CombatantId),

    #[error("combatant {0} is not on the field")]
    NotActive(CombatantId),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to encode battle snapshot")]
    Encode(#[source] postcard::Error),

    #[error("failed to decode battle snapshot")]
    Decode(#[source] postcard::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timed out after {0}ms waiting for committed actions")]
    InputTimeout(u64),

    #[error("action channel closed before both sides committed")]
    ChannelClosed,

    #[error("battle {0} has already ended")]
    BattleOver(String),

    #[error("battle outcome could not be persisted: {0}")]
    Persist(String),
}

/// Type alias for Results using BattleEngineError
pub type BattleResult<T> = Result<T, BattleEngineError>;

/// Result of a single effect hook: the commands it wants applied, or a failure
/// that the engine logs before moving on.
pub type HookResult = Result<Vec<crate::battle::commands::BattleCommand>, HookError>;
