use std::collections::VecDeque;
use std::fmt;

use schema::TargetScope;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::battle::state::{BattleEvent, BattleState, CombatantId, SideId};
use crate::battle::stats::effective_speed;
use crate::move_data::{normalize_id, MoveResolver};

pub const SWITCH_PRIORITY: i8 = 6;
pub const FORFEIT_PRIORITY: i8 = 10;
pub const STRUGGLE: &str = "Struggle";

/// What a side asked one of its combatants to do this turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    UseMove {
        name: String,
        target: Option<CombatantId>,
    },
    Switch {
        into: CombatantId,
    },
    Forfeit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedAction {
    pub combatant_id: CombatantId,
    pub choice: Choice,
}

impl CommittedAction {
    pub fn use_move(combatant_id: impl Into<CombatantId>, name: impl Into<String>) -> Self {
        Self {
            combatant_id: combatant_id.into(),
            choice: Choice::UseMove {
                name: name.into(),
                target: None,
            },
        }
    }

    pub fn use_move_on(
        combatant_id: impl Into<CombatantId>,
        name: impl Into<String>,
        target: impl Into<CombatantId>,
    ) -> Self {
        Self {
            combatant_id: combatant_id.into(),
            choice: Choice::UseMove {
                name: name.into(),
                target: Some(target.into()),
            },
        }
    }

    pub fn switch(combatant_id: impl Into<CombatantId>, into: impl Into<CombatantId>) -> Self {
        Self {
            combatant_id: combatant_id.into(),
            choice: Choice::Switch { into: into.into() },
        }
    }

    pub fn forfeit(combatant_id: impl Into<CombatantId>) -> Self {
        Self {
            combatant_id: combatant_id.into(),
            choice: Choice::Forfeit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Move,
    Switch,
    Forfeit,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Move => write!(f, "move"),
            ActionKind::Switch => write!(f, "switch"),
            ActionKind::Forfeit => write!(f, "forfeit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionPayload {
    Move { name: String, scope: TargetScope },
    Switch { into: CombatantId },
    Forfeit,
}

/// A validated, targeted action ready for ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub combatant_id: CombatantId,
    pub side: SideId,
    pub payload: ActionPayload,
    pub defender_ids: Vec<CombatantId>,
    pub priority: i8,
    pub speed: u16,
}

impl Action {
    /// Short label for the turn log.
    pub fn label(&self) -> String {
        match &self.payload {
            ActionPayload::Move { name, .. } => name.clone(),
            ActionPayload::Switch { into } => format!("switch:{}", into),
            ActionPayload::Forfeit => "forfeit".to_string(),
        }
    }
}

/// FNV-1a, 64 bit.
pub fn fnv1a64(input: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    input.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(PRIME)
    })
}

/// Tiebreak key for actions with equal priority and speed. Fixed for a given
/// seed key, different from one turn to the next.
pub fn tiebreak_hash(seed_key: &str, action: &Action) -> u64 {
    fnv1a64(&format!(
        "{}|{}|{}|{}",
        seed_key, action.combatant_id, action.kind, action.side
    ))
}

/// Orders actions by priority (high first), then speed (fast first), then
/// tiebreak hash (low first). Equal keys keep their input order.
pub fn sort_actions(actions: &mut [Action], seed_key: &str) {
    actions.sort_by_cached_key(|action| {
        (
            std::cmp::Reverse(action.priority),
            std::cmp::Reverse(action.speed),
            tiebreak_hash(seed_key, action),
        )
    });
}

/// Target set for a move, resolved against live hp.
///
/// A requested single target is honoured while it is still a living, active
/// opponent; otherwise the first living active opponent is used.
pub fn resolve_targets(
    state: &BattleState,
    actor: &str,
    side: SideId,
    scope: TargetScope,
    requested: Option<&str>,
) -> Vec<CombatantId> {
    match scope {
        TargetScope::User => vec![actor.to_string()],
        TargetScope::AllOpponents => state.living_active(side.opponent()),
        TargetScope::SingleOpponent => {
            let opponents = state.living_active(side.opponent());
            match requested.filter(|id| opponents.iter().any(|o| o == id)) {
                Some(id) => vec![id.to_string()],
                None => opponents.into_iter().take(1).collect(),
            }
        }
    }
}

pub struct ActionStack {
    actions: VecDeque<Action>,
}

impl ActionStack {
    /// Creates a new, empty ActionStack.
    pub fn new() -> Self {
        Self {
            actions: VecDeque::new(),
        }
    }

    /// Validates committed actions against the state, resolves their targets
    /// and returns them in execution order, plus a log event for every
    /// action that had to be dropped.
    pub fn build_initial(
        battle_state: &BattleState,
        committed: &[CommittedAction],
        resolver: &MoveResolver,
    ) -> (Self, Vec<BattleEvent>) {
        let mut actions = Vec::new();
        let mut dropped = Vec::new();

        for entry in committed {
            let already_queued = actions
                .iter()
                .any(|action: &Action| action.combatant_id == entry.combatant_id);
            let built = if already_queued {
                Err("already has an action this turn".to_string())
            } else {
                Self::build_action(battle_state, entry, resolver)
            };

            match built {
                Ok(action) => actions.push(action),
                Err(reason) => {
                    warn!(actor = %entry.combatant_id, %reason, "dropping committed action");
                    dropped.push(BattleEvent::ActionDropped {
                        actor: entry.combatant_id.clone(),
                        reason,
                    });
                }
            }
        }

        sort_actions(&mut actions, &battle_state.seed_key());

        let mut stack = Self::new();
        for action in actions {
            stack.push_back(action);
        }
        (stack, dropped)
    }

    /// Adds an action to the end of the execution queue.
    pub fn push_back(&mut self, action: Action) {
        self.actions.push_back(action);
    }

    /// Removes and returns the next action to be executed from the front of the queue.
    pub fn pop_front(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    // --- Private Helper Functions ---

    fn build_action(
        state: &BattleState,
        entry: &CommittedAction,
        resolver: &MoveResolver,
    ) -> Result<Action, String> {
        let actor_id = entry.combatant_id.as_str();
        let combatant = state
            .combatant(actor_id)
            .ok_or_else(|| "unknown combatant".to_string())?;
        let side = state
            .side_of(actor_id)
            .ok_or_else(|| "combatant is not on either side".to_string())?;
        if !state.is_active(actor_id) {
            return Err("combatant is not on the field".to_string());
        }
        if !state.is_alive(actor_id) {
            return Err("combatant has fainted".to_string());
        }
        let speed = effective_speed(combatant);

        match &entry.choice {
            Choice::Forfeit => Ok(Action {
                kind: ActionKind::Forfeit,
                combatant_id: actor_id.to_string(),
                side,
                payload: ActionPayload::Forfeit,
                defender_ids: Vec::new(),
                priority: FORFEIT_PRIORITY,
                speed,
            }),
            Choice::Switch { into } => {
                let on_bench = state.side(side).bench.iter().any(|id| id == into);
                if !on_bench || !state.is_alive(into) {
                    return Err(format!("cannot switch into {}", into));
                }
                Ok(Action {
                    kind: ActionKind::Switch,
                    combatant_id: actor_id.to_string(),
                    side,
                    payload: ActionPayload::Switch { into: into.clone() },
                    defender_ids: Vec::new(),
                    priority: SWITCH_PRIORITY,
                    speed,
                })
            }
            Choice::UseMove { name, target } => {
                let move_name = if combatant.moves.is_empty() {
                    name.clone()
                } else {
                    let key = normalize_id(name);
                    let slot = combatant
                        .moves
                        .iter()
                        .find(|slot| normalize_id(&slot.name) == key)
                        .ok_or_else(|| format!("does not know {}", name))?;
                    if slot.pp == 0 {
                        STRUGGLE.to_string()
                    } else {
                        slot.name.clone()
                    }
                };

                if let Some(requested) = target {
                    if state.side_of(requested) != Some(side.opponent()) {
                        return Err(format!("illegal target {}", requested));
                    }
                }

                let descriptor = resolver.resolve(&move_name, Some(combatant));
                let defender_ids =
                    resolve_targets(state, actor_id, side, descriptor.target, target.as_deref());

                Ok(Action {
                    kind: ActionKind::Move,
                    combatant_id: actor_id.to_string(),
                    side,
                    payload: ActionPayload::Move {
                        name: move_name,
                        scope: descriptor.target,
                    },
                    defender_ids,
                    priority: descriptor.priority,
                    speed,
                })
            }
        }
    }
}

impl Default for ActionStack {
    fn default() -> Self {
        Self::new()
    }
}
