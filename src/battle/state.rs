use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use schema::{HazardId, ScreenId, StatType, StatusId, TerrainId, WeatherId};
use serde::{Deserialize, Serialize};

use crate::battle::action_stack::{fnv1a64, Action};
use crate::battle::field::BattlefieldState;
use crate::combatant::{Combatant, VolatileKind};
use crate::errors::SnapshotError;

pub type CombatantId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum SideId {
    #[default]
    Player,
    Opponent,
}

impl SideId {
    pub const ALL: [SideId; 2] = [SideId::Player, SideId::Opponent];

    pub fn index(self) -> usize {
        match self {
            SideId::Player => 0,
            SideId::Opponent => 1,
        }
    }

    pub fn opponent(self) -> SideId {
        match self {
            SideId::Player => SideId::Opponent,
            SideId::Opponent => SideId::Player,
        }
    }
}

impl fmt::Display for SideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideId::Player => write!(f, "player"),
            SideId::Opponent => write!(f, "opponent"),
        }
    }
}

/// Roster positions of one side. Fainted members move out of `active` and
/// never come back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BattleSide {
    pub active: Vec<CombatantId>,
    pub bench: Vec<CombatantId>,
    pub fainted: Vec<CombatantId>,
}

impl BattleSide {
    pub fn members(&self) -> impl Iterator<Item = &CombatantId> {
        self.active.iter().chain(&self.bench).chain(&self.fainted)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members().any(|member| member == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TurnPhase {
    #[default]
    BuildQueue,
    PreTurnHooks,
    ExecuteActions,
    PostActionChecks,
    ForcedSwitch,
    EndTurnHooks,
    Terminal,
}

/// Final result, always from the player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Victory,
    Defeat,
    Draw,
    /// The named side gave up a trainer battle.
    Forfeit(SideId),
    /// The player ran from a wild battle.
    Escaped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Victory => write!(f, "victory"),
            Outcome::Defeat => write!(f, "defeat"),
            Outcome::Draw => write!(f, "draw"),
            Outcome::Forfeit(side) => write!(f, "{} forfeited", side),
            Outcome::Escaped => write!(f, "escaped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreventionReason {
    Asleep,
    Frozen,
    Paralyzed,
    Flinched,
    Trapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusFailure {
    AlreadyAfflicted(StatusId),
    Immune,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BattleEvent {
    // Battle and turn management
    BattleStarted {
        battle_id: String,
    },
    TurnStarted {
        turn_number: u32,
    },
    TurnEnded {
        turn_number: u32,
    },

    // Actions
    MoveUsed {
        user: CombatantId,
        move_name: String,
    },
    MoveMissed {
        user: CombatantId,
        target: CombatantId,
    },
    MoveFailed {
        user: CombatantId,
        move_name: String,
    },
    Switched {
        side: SideId,
        out: Option<CombatantId>,
        into: CombatantId,
    },
    ActionPrevented {
        actor: CombatantId,
        reason: PreventionReason,
    },
    ActionDropped {
        actor: CombatantId,
        reason: String,
    },
    ActionRejected {
        reason: String,
    },
    Forfeited {
        side: SideId,
    },

    // Damage and healing
    CriticalHit {
        target: CombatantId,
    },
    Effectiveness {
        multiplier: f64,
    },
    DamageDealt {
        target: CombatantId,
        damage: u16,
        remaining_hp: u16,
    },
    Healed {
        target: CombatantId,
        amount: u16,
        new_hp: u16,
    },
    Fainted {
        target: CombatantId,
        side: SideId,
    },
    SurvivedFatalHit {
        target: CombatantId,
        source: String,
    },

    // Status
    StatusInflicted {
        target: CombatantId,
        status: StatusId,
    },
    StatusFailed {
        target: CombatantId,
        status: StatusId,
        reason: StatusFailure,
    },
    StatusCured {
        target: CombatantId,
        status: StatusId,
    },
    StatusDamage {
        target: CombatantId,
        status: StatusId,
        damage: u16,
    },
    ConfusionSelfHit {
        target: CombatantId,
        damage: u16,
    },
    StillAsleep {
        target: CombatantId,
    },

    // Stats and volatiles
    StatStageChanged {
        target: CombatantId,
        stat: StatType,
        old_stage: i8,
        new_stage: i8,
    },
    StatChangeBlocked {
        target: CombatantId,
        stat: StatType,
        rising: bool,
    },
    VolatileApplied {
        target: CombatantId,
        kind: VolatileKind,
    },
    VolatileExpired {
        target: CombatantId,
        kind: VolatileKind,
    },
    PassiveApplied {
        target: CombatantId,
        source: String,
        stat: StatType,
    },
    PassiveReverted {
        target: CombatantId,
        source: String,
        stat: StatType,
    },

    // Battlefield
    WeatherStarted {
        weather: WeatherId,
    },
    WeatherEnded {
        weather: WeatherId,
    },
    WeatherDamage {
        target: CombatantId,
        weather: WeatherId,
    },
    TerrainStarted {
        terrain: TerrainId,
    },
    TerrainEnded {
        terrain: TerrainId,
    },
    HazardSet {
        side: SideId,
        hazard: HazardId,
    },
    HazardTriggered {
        target: CombatantId,
        hazard: HazardId,
    },
    HazardsCleared {
        side: SideId,
    },
    ScreenRaised {
        side: SideId,
        screen: ScreenId,
    },
    ScreenEnded {
        side: SideId,
        screen: ScreenId,
    },

    // Failures and battle end
    HookFailed {
        source: String,
        error: String,
    },
    SideDefeated {
        side: SideId,
    },
    BattleEnded {
        outcome: Outcome,
    },
}

impl BattleEvent {
    /// Formats the event into a human-readable string using battle context.
    /// Returns None for silent events that should not produce user-visible text.
    pub fn format(&self, battle_state: &BattleState) -> Option<String> {
        let name = |id: &CombatantId| battle_state.display_name(id);

        match self {
            // === Battle and Turn Events ===
            BattleEvent::BattleStarted { .. } => Some("The battle began!".to_string()),
            BattleEvent::TurnStarted { turn_number } => {
                Some(format!("=== Turn {} ===", turn_number))
            }
            BattleEvent::TurnEnded { .. } => None,

            // === Action Events ===
            BattleEvent::MoveUsed { user, move_name } => {
                Some(format!("{} used {}!", name(user), move_name))
            }
            BattleEvent::MoveMissed { user, .. } => {
                Some(format!("{}'s attack missed!", name(user)))
            }
            BattleEvent::MoveFailed { .. } => Some("But it failed!".to_string()),
            BattleEvent::Switched { side, out, into } => match out {
                Some(previous) => Some(format!(
                    "The {} side withdrew {} and sent out {}!",
                    side,
                    name(previous),
                    name(into)
                )),
                None => Some(format!("The {} side sent out {}!", side, name(into))),
            },
            BattleEvent::ActionPrevented { actor, reason } => Some(format!(
                "{} {}",
                name(actor),
                Self::format_prevention_reason(reason)
            )),
            BattleEvent::ActionDropped { actor, reason } => {
                Some(format!("{}'s action was dropped ({}).", actor, reason))
            }
            BattleEvent::ActionRejected { reason } => {
                Some(format!("Action rejected: {}", reason))
            }
            BattleEvent::Forfeited { side } => Some(format!("The {} side forfeited!", side)),

            // === Damage and Healing Events ===
            BattleEvent::CriticalHit { .. } => Some("A critical hit!".to_string()),
            BattleEvent::Effectiveness { multiplier } => match *multiplier {
                m if m > 1.0 => Some("It's super effective!".to_string()),
                m if m < 1.0 && m > 0.0 => Some("It's not very effective...".to_string()),
                0.0 => Some("It had no effect!".to_string()),
                _ => None, // Normal effectiveness, no message
            },
            BattleEvent::DamageDealt { target, damage, .. } => {
                Some(format!("{} took {} damage!", name(target), damage))
            }
            BattleEvent::Healed { target, amount, .. } => {
                Some(format!("{} recovered {} HP!", name(target), amount))
            }
            BattleEvent::Fainted { target, .. } => Some(format!("{} fainted!", name(target))),
            BattleEvent::SurvivedFatalHit { target, source } => {
                Some(format!("{} endured the hit with {}!", name(target), source))
            }

            // === Status Events ===
            BattleEvent::StatusInflicted { target, status } => Some(format!(
                "{} {}",
                name(target),
                Self::format_status_applied(*status)
            )),
            BattleEvent::StatusFailed { target, reason, .. } => match reason {
                StatusFailure::AlreadyAfflicted(existing) => Some(format!(
                    "{} is already afflicted by {}!",
                    name(target),
                    existing
                )),
                StatusFailure::Immune => Some(format!("It doesn't affect {}...", name(target))),
            },
            BattleEvent::StatusCured { target, status } => Some(format!(
                "{} {}",
                name(target),
                Self::format_status_removed(*status)
            )),
            BattleEvent::StatusDamage { target, status, .. } => {
                Some(format!("{} is hurt by its {}!", name(target), status))
            }
            BattleEvent::ConfusionSelfHit { target, .. } => {
                Some(format!("{} hurt itself in its confusion!", name(target)))
            }
            BattleEvent::StillAsleep { target } => {
                Some(format!("{} is fast asleep.", name(target)))
            }

            // === Stat and Volatile Events ===
            BattleEvent::StatStageChanged {
                target,
                stat,
                old_stage,
                new_stage,
            } => {
                let verb = match (new_stage - old_stage).abs() {
                    1 => "",
                    2 => " sharply",
                    _ => " drastically",
                };
                if new_stage > old_stage {
                    Some(format!("{}'s {}{} rose!", name(target), stat, verb))
                } else {
                    Some(format!("{}'s {}{} fell!", name(target), stat, verb))
                }
            }
            BattleEvent::StatChangeBlocked { target, stat, rising } => {
                let direction = if *rising { "higher" } else { "lower" };
                Some(format!("{}'s {} won't go any {}!", name(target), stat, direction))
            }
            BattleEvent::VolatileApplied { target, kind } => match kind {
                VolatileKind::Trapped => Some(format!("{} can no longer escape!", name(target))),
                VolatileKind::Flinched => None,
            },
            BattleEvent::VolatileExpired { target, kind } => match kind {
                VolatileKind::Trapped => Some(format!("{} was freed!", name(target))),
                VolatileKind::Flinched => None,
            },
            BattleEvent::PassiveApplied { .. } | BattleEvent::PassiveReverted { .. } => None,

            // === Battlefield Events ===
            BattleEvent::WeatherStarted { weather } => Some(match weather {
                WeatherId::Sun => "The sunlight turned harsh!".to_string(),
                WeatherId::Rain => "It started to rain!".to_string(),
                WeatherId::Sandstorm => "A sandstorm kicked up!".to_string(),
                WeatherId::Hail => "It started to hail!".to_string(),
            }),
            BattleEvent::WeatherEnded { weather } => Some(format!("The {} subsided.", weather)),
            BattleEvent::WeatherDamage { target, weather } => {
                Some(format!("{} is buffeted by the {}!", name(target), weather))
            }
            BattleEvent::TerrainStarted { terrain } => {
                Some(format!("{} spread across the battlefield!", terrain))
            }
            BattleEvent::TerrainEnded { terrain } => Some(format!("The {} faded.", terrain)),
            BattleEvent::HazardSet { side, hazard } => {
                Some(format!("{} was laid on the {} side!", hazard, side))
            }
            BattleEvent::HazardTriggered { target, hazard } => {
                Some(format!("{} was hurt by {}!", name(target), hazard))
            }
            BattleEvent::HazardsCleared { side } => {
                Some(format!("Hazards were cleared from the {} side!", side))
            }
            BattleEvent::ScreenRaised { side, screen } => {
                Some(format!("{} protects the {} side!", screen, side))
            }
            BattleEvent::ScreenEnded { side, screen } => {
                Some(format!("The {} side's {} wore off.", side, screen))
            }

            // === Failures and Battle End ===
            BattleEvent::HookFailed { source, .. } => {
                Some(format!("{} misfired and had no effect.", source))
            }
            BattleEvent::SideDefeated { side } => {
                Some(format!("The {} side has no usable fighters left!", side))
            }
            BattleEvent::BattleEnded { outcome } => Some(match outcome {
                Outcome::Victory => "You won the battle!".to_string(),
                Outcome::Defeat => "You lost the battle...".to_string(),
                Outcome::Draw => "The battle ended in a draw!".to_string(),
                Outcome::Forfeit(side) => format!("The {} side forfeited the battle.", side),
                Outcome::Escaped => "Got away safely!".to_string(),
            }),
        }
    }

    // --- Private Helper Functions ---

    fn format_status_applied(status: StatusId) -> &'static str {
        match status {
            StatusId::Sleep => "fell asleep!",
            StatusId::Poison => "was poisoned!",
            StatusId::Burn => "was burned!",
            StatusId::Freeze => "was frozen solid!",
            StatusId::Paralysis => "is paralyzed! It may be unable to move!",
            StatusId::Confusion => "became confused!",
        }
    }

    fn format_status_removed(status: StatusId) -> String {
        match status {
            StatusId::Sleep => "woke up!".to_string(),
            StatusId::Freeze => "thawed out!".to_string(),
            StatusId::Confusion => "snapped out of its confusion!".to_string(),
            other => format!("was cured of its {}!", other),
        }
    }

    fn format_prevention_reason(reason: &PreventionReason) -> &'static str {
        match reason {
            PreventionReason::Asleep => "is fast asleep.",
            PreventionReason::Frozen => "is frozen solid!",
            PreventionReason::Paralyzed => "is fully paralyzed!",
            PreventionReason::Flinched => "flinched and couldn't move!",
            PreventionReason::Trapped => "can't escape!",
        }
    }
}

/// One line of the turn log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn: u32,
    pub actor: Option<CombatantId>,
    pub action: Option<String>,
    pub event: BattleEvent,
    /// Rendered text, `None` for silent events.
    pub result: Option<String>,
    /// Set when an ability or talent hook produced this record.
    pub synergy_triggered: bool,
}

pub type TurnLog = Vec<TurnRecord>;

#[derive(Debug, Clone, Default, PartialEq)]
struct RecordContext {
    actor: Option<CombatantId>,
    action: Option<String>,
    synergy: bool,
}

/// Event bus for collecting battle events along with the actor and action
/// that produced them.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    events: Vec<BattleEvent>,
    contexts: Vec<RecordContext>,
    current: RecordContext,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: BattleEvent) {
        self.events.push(event);
        self.contexts.push(self.current.clone());
    }

    pub fn events(&self) -> &[BattleEvent] {
        &self.events
    }

    /// Attributes subsequent events to `actor` performing `action`.
    pub fn set_actor(&mut self, actor: Option<CombatantId>, action: Option<String>) {
        self.current.actor = actor;
        self.current.action = action;
    }

    pub fn clear_actor(&mut self) {
        self.set_actor(None, None);
    }

    pub fn set_synergy(&mut self, synergy: bool) {
        self.current.synergy = synergy;
    }

    /// Return true if the event bus contains no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Return the number of events in the bus.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Renders every collected event into a turn record.
    pub fn into_records(self, turn: u32, battle_state: &BattleState) -> TurnLog {
        self.events
            .into_iter()
            .zip(self.contexts)
            .map(|(event, context)| TurnRecord {
                turn,
                result: event.format(battle_state),
                actor: context.actor,
                action: context.action,
                synergy_triggered: context.synergy,
                event,
            })
            .collect()
    }
}

impl fmt::Display for EventBus {
    /// Format the EventBus for printing. Shows debug format of all events.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.events {
            writeln!(f, "  {:?}", event)?;
        }
        Ok(())
    }
}

/// Source of d100 rolls for one turn. Seeded turns are reproducible from the
/// battle's seed key; scripted turns replay fixed outcomes for tests.
#[derive(Debug, Clone)]
pub enum TurnRng {
    Seeded(StdRng),
    Scripted { outcomes: Vec<u8>, index: usize },
}

impl TurnRng {
    pub fn new_for_seed(seed_key: &str) -> Self {
        TurnRng::Seeded(StdRng::seed_from_u64(fnv1a64(seed_key)))
    }

    /// Scripted outcomes are consumed in order and wrap around when exhausted.
    pub fn new_for_test(outcomes: Vec<u8>) -> Self {
        TurnRng::Scripted { outcomes, index: 0 }
    }

    /// Next roll in 1..=100.
    pub fn next_outcome(&mut self, reason: &str) -> u8 {
        let outcome = match self {
            TurnRng::Seeded(rng) => rng.random_range(1..=100),
            TurnRng::Scripted { outcomes, index } => {
                if outcomes.is_empty() {
                    50
                } else {
                    let outcome = outcomes[*index % outcomes.len()].clamp(1, 100);
                    *index += 1;
                    outcome
                }
            }
        };

        #[cfg(test)]
        println!("[RNG] Consumed {} for: {}", outcome, reason);
        #[cfg(not(test))]
        tracing::trace!(outcome, reason, "rng roll");

        outcome
    }

    /// Roll mapped onto `low..=high`.
    pub fn range_inclusive(&mut self, low: u8, high: u8, reason: &str) -> u8 {
        if high <= low {
            return low;
        }
        let span = (high - low) as u16 + 1;
        let roll = self.next_outcome(reason) as u16 - 1;
        low + (roll % span) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BattleState {
    pub battle_id: String,
    pub turn_number: u32,
    /// Side whose action ran first in the most recent turn.
    pub current_turn: SideId,
    pub sides: [BattleSide; 2],
    pub combatants: BTreeMap<CombatantId, Combatant>,
    pub hp_map: BTreeMap<CombatantId, u16>,
    pub active_slots: usize,
    pub action_queue: Vec<Action>,
    pub battle_log: Vec<TurnRecord>,
    pub battlefield: BattlefieldState,
    pub is_wild_battle: bool,
    pub phase: TurnPhase,
    pub outcome: Option<Outcome>,
}

impl BattleState {
    /// Sets up a battle at turn 1. The first `active_slots` members of each
    /// team start on the field; everyone starts at full hp.
    pub fn new(
        battle_id: impl Into<String>,
        player_team: Vec<Combatant>,
        opponent_team: Vec<Combatant>,
        active_slots: usize,
    ) -> Self {
        let mut state = Self {
            battle_id: battle_id.into(),
            turn_number: 1,
            current_turn: SideId::Player,
            sides: [BattleSide::default(), BattleSide::default()],
            combatants: BTreeMap::new(),
            hp_map: BTreeMap::new(),
            active_slots: active_slots.max(1),
            action_queue: Vec::new(),
            battle_log: Vec::new(),
            battlefield: BattlefieldState::default(),
            is_wild_battle: false,
            phase: TurnPhase::BuildQueue,
            outcome: None,
        };

        for (side, team) in [(SideId::Player, player_team), (SideId::Opponent, opponent_team)] {
            for combatant in team {
                let id = combatant.id.clone();
                state.hp_map.insert(id.clone(), combatant.max_hp());
                state.combatants.insert(id.clone(), combatant);
                let roster = &mut state.sides[side.index()];
                if roster.active.len() < state.active_slots {
                    roster.active.push(id);
                } else {
                    roster.bench.push(id);
                }
            }
        }

        state
    }

    pub fn side(&self, side: SideId) -> &BattleSide {
        &self.sides[side.index()]
    }

    pub fn side_mut(&mut self, side: SideId) -> &mut BattleSide {
        &mut self.sides[side.index()]
    }

    pub fn side_of(&self, id: &str) -> Option<SideId> {
        SideId::ALL
            .into_iter()
            .find(|side| self.side(*side).contains(id))
    }

    pub fn combatant(&self, id: &str) -> Option<&Combatant> {
        self.combatants.get(id)
    }

    pub fn combatant_mut(&mut self, id: &str) -> Option<&mut Combatant> {
        self.combatants.get_mut(id)
    }

    pub fn display_name(&self, id: &str) -> String {
        self.combatant(id)
            .map(|combatant| combatant.species.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn hp(&self, id: &str) -> u16 {
        self.hp_map.get(id).copied().unwrap_or(0)
    }

    pub fn max_hp(&self, id: &str) -> u16 {
        self.combatant(id).map(Combatant::max_hp).unwrap_or(0)
    }

    pub fn is_alive(&self, id: &str) -> bool {
        self.hp(id) > 0
    }

    /// Writes hp clamped to `[0, max_hp]`.
    pub fn set_hp(&mut self, id: &str, value: u16) {
        let clamped = value.min(self.max_hp(id));
        if let Some(hp) = self.hp_map.get_mut(id) {
            *hp = clamped;
        }
    }

    /// Returns the hp actually removed.
    pub fn apply_damage(&mut self, id: &str, amount: u16) -> u16 {
        let before = self.hp(id);
        self.set_hp(id, before.saturating_sub(amount));
        before - self.hp(id)
    }

    /// Returns the hp actually restored.
    pub fn restore_hp(&mut self, id: &str, amount: u16) -> u16 {
        let before = self.hp(id);
        self.set_hp(id, before.saturating_add(amount));
        self.hp(id) - before
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.sides.iter().any(|side| side.active.iter().any(|a| a == id))
    }

    pub fn living_active(&self, side: SideId) -> Vec<CombatantId> {
        self.side(side)
            .active
            .iter()
            .filter(|id| self.is_alive(id))
            .cloned()
            .collect()
    }

    /// Every active combatant on both sides, player side first.
    pub fn all_active(&self) -> Vec<CombatantId> {
        SideId::ALL
            .into_iter()
            .flat_map(|side| self.side(side).active.clone())
            .collect()
    }

    /// A side is defeated once none of its members has hp left.
    pub fn is_side_defeated(&self, side: SideId) -> bool {
        self.side(side).members().all(|id| !self.is_alive(id))
    }

    /// Turn-scoped key feeding the queue tiebreak and the turn rng.
    pub fn seed_key(&self) -> String {
        format!("{}:{}", self.battle_id, self.turn_number)
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == TurnPhase::Terminal
    }

    pub fn to_snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        postcard::to_allocvec(self).map_err(SnapshotError::Encode)
    }

    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, SnapshotError> {
        postcard::from_bytes(bytes).map_err(SnapshotError::Decode)
    }
}
