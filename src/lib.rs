//! Monster Battle Engine
//!
//! A deterministic, turn-based battle engine: typed combatants with statuses,
//! abilities and graded talents fight over a battlefield with weather, terrain,
//! hazards and screens. Every turn is a pure function of the previous state,
//! the committed actions and a seed derived from the battle id and turn number.

// --- MODULE DECLARATIONS ---
pub mod battle;
pub mod combatant;
pub mod config;
pub mod errors;
pub mod move_data;
pub mod species;

// --- PUBLIC API RE-EXPORTS ---

// --- From the `schema` crate ---
pub use schema::{
    effectiveness, ElementType, HazardId, MoveCategory, MoveDescriptor, MoveEffect, ScreenId,
    SpeciesData, StatType, StatusId, TalentGrade, TargetScope, TerrainId, WeatherId,
};

// --- From this crate's modules (`src/`) ---

// Turn resolution and battle state.
pub use battle::action_stack::{Choice, CommittedAction};
pub use battle::engine::{is_battle_over, BattleEngine};
pub use battle::session::{BattleRecord, BattleSession, OutcomeSink, SessionContext};
pub use battle::state::{
    BattleEvent, BattleState, CombatantId, Outcome, SideId, TurnLog, TurnPhase, TurnRecord,
};
pub use battle::talents::{EffectHooks, EffectRegistry};

// Runtime combatants and data access.
pub use combatant::{Combatant, Stats};
pub use config::BattleConfig;
pub use move_data::{MoveRegistry, MoveResolver};
pub use species::SpeciesRegistry;

// Crate-specific error and result types.
pub use errors::{
    BattleEngineError, BattleResult, ConfigError, ExecutionError, HookError, HookResult,
    RegistryError, SessionError, SnapshotError,
};
