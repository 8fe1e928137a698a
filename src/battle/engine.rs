use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use schema::{EffectTarget, MoveDescriptor, MoveEffect, TargetScope};
use tracing::{debug, error, info, warn};

use crate::battle::action_stack::{
    resolve_targets, Action, ActionPayload, ActionStack, CommittedAction, STRUGGLE,
};
use crate::battle::calculators::{calculate_attack_outcome, move_hits};
use crate::battle::commands::{execute_command_batch, BattleCommand};
use crate::battle::conditions::{DurationRoll, StatusHooks};
use crate::battle::field::{HazardEffect, ScreenEffect, TerrainEffect, WeatherEffect};
use crate::battle::state::{
    BattleEvent, BattleState, CombatantId, EventBus, Outcome, PreventionReason, SideId, TurnLog,
    TurnPhase, TurnRng,
};
use crate::battle::talents::{panic_message, EffectRegistry, HookArgs, HookOutput, HookPoint};
use crate::combatant::{Combatant, VolatileKind};
use crate::config::BattleConfig;
use crate::errors::{HookResult, RegistryError};
use crate::move_data::{MoveRegistry, MoveResolver};
use crate::species::SpeciesRegistry;

/// Immutable rules and registries shared by every battle it resolves.
#[derive(Debug, Clone)]
pub struct BattleEngine {
    config: BattleConfig,
    moves: MoveResolver,
    effects: EffectRegistry,
}

impl BattleEngine {
    pub fn new(config: BattleConfig, moves: MoveResolver, effects: EffectRegistry) -> Self {
        Self {
            config,
            moves,
            effects,
        }
    }

    /// Engine over the embedded move and species data and the built-in effects.
    pub fn with_builtin_data(config: BattleConfig) -> Result<Self, RegistryError> {
        let resolver = MoveResolver::new(MoveRegistry::builtin()?, SpeciesRegistry::builtin()?);
        Ok(Self::new(config, resolver, EffectRegistry::builtin()))
    }

    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    pub fn moves(&self) -> &MoveResolver {
        &self.moves
    }

    pub fn effects(&self) -> &EffectRegistry {
        &self.effects
    }

    /// Sets up a battle at turn 1 in BuildQueue with its opening log records.
    pub fn new_battle(
        &self,
        battle_id: impl Into<String>,
        player_team: Vec<Combatant>,
        opponent_team: Vec<Combatant>,
        is_wild_battle: bool,
    ) -> BattleState {
        let prepare = |mut combatant: Combatant| {
            combatant
                .status_immunities
                .extend(self.effects.status_immunities(&combatant));
            combatant.status_immunities.sort();
            combatant.status_immunities.dedup();
            combatant
        };
        let player_team = player_team.into_iter().map(prepare).collect();
        let opponent_team = opponent_team.into_iter().map(prepare).collect();

        let slots = self.config.active_slots;
        let mut state = BattleState::new(battle_id, player_team, opponent_team, slots);
        state.is_wild_battle = is_wild_battle;

        let mut bus = EventBus::new();
        bus.push(BattleEvent::BattleStarted {
            battle_id: state.battle_id.clone(),
        });
        for side in SideId::ALL {
            for id in &state.side(side).active {
                bus.push(BattleEvent::Switched {
                    side,
                    out: None,
                    into: id.clone(),
                });
            }
        }
        state.battle_log = bus.into_records(0, &state);
        info!(battle_id = %state.battle_id, "battle created");
        state
    }

    /// Resolves one full turn with the rng seeded from the state's seed key.
    pub fn resolve_turn(
        &self,
        state: BattleState,
        committed: &[CommittedAction],
    ) -> (BattleState, TurnLog) {
        let rng = TurnRng::new_for_seed(&state.seed_key());
        self.resolve_turn_with_rng(state, committed, rng)
    }

    /// Same as [`resolve_turn`](Self::resolve_turn) with an explicit rng.
    ///
    /// A terminal state comes back untouched with a single rejection record.
    /// If resolution panics, the state from before the turn is returned.
    pub fn resolve_turn_with_rng(
        &self,
        state: BattleState,
        committed: &[CommittedAction],
        rng: TurnRng,
    ) -> (BattleState, TurnLog) {
        if state.is_terminal() {
            warn!(battle_id = %state.battle_id, "turn submitted after the battle ended");
            let reason = format!("battle {} has already ended", state.battle_id);
            let log = rejection(&state, reason);
            return (state, log);
        }

        let backup = state.clone();
        let resolved = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut turn = TurnResolver::new(self, state, rng);
            turn.run(committed);
            turn.finish()
        }));

        match resolved {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(battle_id = %backup.battle_id, %message, "turn resolution panicked");
                let log = rejection(&backup, format!("turn aborted: {}", message));
                (backup, log)
            }
        }
    }
}

/// Outcome of the battle if it is over: the recorded result (forfeit, escape
/// or an earlier defeat), otherwise whichever sides have nobody left standing.
pub fn is_battle_over(state: &BattleState) -> Option<Outcome> {
    if state.outcome.is_some() {
        return state.outcome;
    }
    match (
        state.is_side_defeated(SideId::Player),
        state.is_side_defeated(SideId::Opponent),
    ) {
        (true, true) => Some(Outcome::Draw),
        (false, true) => Some(Outcome::Victory),
        (true, false) => Some(Outcome::Defeat),
        (false, false) => None,
    }
}

fn rejection(state: &BattleState, reason: String) -> TurnLog {
    let mut bus = EventBus::new();
    bus.push(BattleEvent::ActionRejected { reason });
    bus.into_records(state.turn_number, state)
}

/// Working set for one turn: the state being transformed, the log being
/// written and the rng feeding every roll.
struct TurnResolver<'e> {
    engine: &'e BattleEngine,
    state: BattleState,
    bus: EventBus,
    rng: TurnRng,
    /// Hp at the start of the current action or phase.
    hp_snapshot: BTreeMap<CombatantId, u16>,
    first_side: Option<SideId>,
    reacting: bool,
}

impl<'e> TurnResolver<'e> {
    fn new(engine: &'e BattleEngine, state: BattleState, rng: TurnRng) -> Self {
        Self {
            engine,
            state,
            bus: EventBus::new(),
            rng,
            hp_snapshot: BTreeMap::new(),
            first_side: None,
            reacting: false,
        }
    }

    fn run(&mut self, committed: &[CommittedAction]) {
        // 1. Build the queue
        self.enter(TurnPhase::BuildQueue);
        self.bus.push(BattleEvent::TurnStarted {
            turn_number: self.state.turn_number,
        });
        let (mut stack, dropped) =
            ActionStack::build_initial(&self.state, committed, &self.engine.moves);
        for event in dropped {
            self.bus.push(event);
        }
        self.state.action_queue = stack.iter().cloned().collect();

        // 2. Turn-start hooks
        self.enter(TurnPhase::PreTurnHooks);
        self.pre_turn_hooks();
        self.settle();

        // 3. Actions, each followed by faint checks
        while !self.is_decided() {
            let Some(action) = stack.pop_front() else {
                break;
            };
            self.enter(TurnPhase::ExecuteActions);
            self.take_hp_snapshot();
            self.execute_action(&action);
            self.enter(TurnPhase::PostActionChecks);
            self.post_action_checks(Some(action.combatant_id.as_str()));
        }

        if self.is_decided() {
            return;
        }

        // 4. Refill empty slots
        self.enter(TurnPhase::ForcedSwitch);
        self.settle();
        if self.is_decided() {
            return;
        }

        // 5. End-of-turn hooks
        self.enter(TurnPhase::EndTurnHooks);
        self.end_turn_hooks();
        self.settle();
    }

    fn finish(mut self) -> (BattleState, TurnLog) {
        let turn = self.state.turn_number;
        if let Some(side) = self.first_side {
            self.state.current_turn = side;
        }

        match is_battle_over(&self.state) {
            Some(outcome) => {
                if self.state.outcome.is_none() {
                    for side in SideId::ALL {
                        if self.state.is_side_defeated(side) {
                            self.bus.push(BattleEvent::SideDefeated { side });
                        }
                    }
                }
                self.state.outcome = Some(outcome);
                self.bus.push(BattleEvent::BattleEnded { outcome });
                self.state.phase = TurnPhase::Terminal;
                info!(battle_id = %self.state.battle_id, %outcome, turn, "battle ended");
            }
            None => {
                self.bus.push(BattleEvent::TurnEnded { turn_number: turn });
                self.state.turn_number += 1;
                self.state.phase = TurnPhase::BuildQueue;
            }
        }

        self.state.action_queue.clear();
        let records = self.bus.into_records(turn, &self.state);
        self.state.battle_log.extend(records.iter().cloned());
        (self.state, records)
    }

    fn enter(&mut self, phase: TurnPhase) {
        if self.state.phase != phase {
            debug!(turn = self.state.turn_number, ?phase, "entering phase");
            self.state.phase = phase;
        }
    }

    fn is_decided(&self) -> bool {
        is_battle_over(&self.state).is_some()
    }

    fn take_hp_snapshot(&mut self) {
        self.hp_snapshot = self.state.hp_map.clone();
    }

    fn living_active(&self) -> Vec<CombatantId> {
        self.state
            .all_active()
            .into_iter()
            .filter(|id| self.state.is_alive(id))
            .collect()
    }

    // --- Command and hook plumbing ---

    fn apply(&mut self, commands: Vec<BattleCommand>, synergy: bool) {
        if commands.is_empty() {
            return;
        }
        self.bus.set_synergy(synergy);
        let result = execute_command_batch(commands, &mut self.state, &mut self.bus, &mut self.rng);
        self.bus.set_synergy(false);

        match result {
            Ok(outcome) => {
                if !self.reacting {
                    for slowed in outcome.speed_dropped {
                        self.notify_speed_drop(&slowed);
                    }
                }
            }
            Err(error) => warn!(%error, "command batch aborted"),
        }
    }

    fn hook_failed(&mut self, source: String, error: String) {
        warn!(%source, %error, "effect hook failed");
        self.bus.push(BattleEvent::HookFailed { source, error });
    }

    fn apply_hook_result(&mut self, source: String, result: HookResult, synergy: bool) {
        match result {
            Ok(commands) => self.apply(commands, synergy),
            Err(error) => self.hook_failed(source, error.to_string()),
        }
    }

    fn apply_hook_outputs(&mut self, outputs: Vec<HookOutput>) {
        for output in outputs {
            self.apply_hook_result(output.source, output.result, true);
        }
    }

    fn dispatch(&mut self, point: HookPoint, owner: &str, args: HookArgs<'_>) -> Vec<HookOutput> {
        self.engine
            .effects
            .dispatch(point, &self.state, owner, args, &mut self.rng)
    }

    fn react(&mut self, point: HookPoint, owner: &str, args: HookArgs<'_>) {
        let outputs = self.dispatch(point, owner, args);
        self.apply_hook_outputs(outputs);
    }

    /// Lets everyone facing `slowed` react to its speed drop.
    fn notify_speed_drop(&mut self, slowed: &str) {
        let Some(side) = self.state.side_of(slowed) else {
            return;
        };
        self.reacting = true;
        for observer in self.state.living_active(side.opponent()) {
            let args = HookArgs {
                other: Some(slowed),
                ..Default::default()
            };
            self.react(HookPoint::OpponentSpeedDrop, &observer, args);
        }
        self.reacting = false;
    }

    /// Re-evaluates weather and terrain gated passives on the field.
    fn sync_passives(&mut self) {
        for id in self.living_active() {
            self.react(HookPoint::FieldChange, &id, HookArgs::default());
        }
    }

    // --- Phases ---

    fn pre_turn_hooks(&mut self) {
        self.take_hp_snapshot();

        for id in self.living_active() {
            let Some(status) = self.state.combatant(&id).and_then(|c| c.status) else {
                continue;
            };
            let result = status.on_turn_start(&self.state, &id);
            self.apply_hook_result(format!("status:{}", status.id), result, false);
        }

        if let Some(weather) = self.state.battlefield.weather() {
            let commands = weather.on_turn_start(&self.state);
            self.apply(commands, false);
        }
        if let Some(terrain) = self.state.battlefield.terrain() {
            let commands = terrain.on_turn_start(&self.state);
            self.apply(commands, false);
        }

        for id in self.living_active() {
            self.react(HookPoint::TurnStart, &id, HookArgs::default());
        }
        self.sync_passives();
    }

    fn end_turn_hooks(&mut self) {
        self.take_hp_snapshot();

        for id in self.living_active() {
            let Some(status) = self.state.combatant(&id).and_then(|c| c.status) else {
                continue;
            };
            let result = status.on_turn_end(&self.state, &id);
            self.apply_hook_result(format!("status:{}", status.id), result, false);
        }

        for id in self.state.all_active() {
            let expired = match self.state.combatant_mut(&id) {
                Some(combatant) => combatant.tick_volatiles(),
                None => continue,
            };
            for kind in expired {
                self.bus.push(BattleEvent::VolatileExpired {
                    target: id.clone(),
                    kind,
                });
            }
        }
        for combatant in self.state.combatants.values_mut() {
            combatant.transient = Default::default();
        }

        for event in self.state.battlefield.tick() {
            self.bus.push(event);
        }
        self.sync_passives();
    }

    /// Faint checks and forced switches until nothing changes.
    fn settle(&mut self) {
        loop {
            self.post_action_checks(None);
            if self.is_decided() || !self.forced_switch() {
                break;
            }
        }
    }

    /// Handles every active combatant at 0 hp: a fatal-hit hook may keep it
    /// standing, otherwise it faints and `attacker` gets its defeat hooks.
    fn post_action_checks(&mut self, attacker: Option<&str>) {
        for id in self.state.all_active() {
            if self.state.is_alive(&id) {
                continue;
            }

            let hp_before = self.hp_snapshot.get(&id).copied().unwrap_or(0);
            let args = HookArgs {
                other: attacker,
                hp_before,
                ..Default::default()
            };
            let outputs = self.dispatch(HookPoint::FatalHit, &id, args);
            for output in outputs {
                if self.state.is_alive(&id) {
                    break;
                }
                self.apply_hook_result(output.source, output.result, true);
            }
            if self.state.is_alive(&id) {
                continue;
            }

            self.faint(&id, attacker);
        }
    }

    fn faint(&mut self, id: &str, attacker: Option<&str>) {
        let Some(side) = self.state.side_of(id) else {
            return;
        };
        self.bus.push(BattleEvent::Fainted {
            target: id.to_string(),
            side,
        });

        if let Some(attacker) = attacker {
            let opposing = self.state.side_of(attacker) == Some(side.opponent());
            if opposing && self.state.is_alive(attacker) {
                let args = HookArgs {
                    other: Some(id),
                    ..Default::default()
                };
                self.react(HookPoint::Defeat, attacker, args);
            }
        }

        if let Some(combatant) = self.state.combatant_mut(id) {
            combatant.status = None;
            combatant.clear_battle_modifiers();
        }
        let roster = self.state.side_mut(side);
        roster.active.retain(|active| active != id);
        roster.fainted.push(id.to_string());
        debug!(%id, %side, "combatant fainted");
    }

    /// Fills empty active slots from the bench. Returns whether anyone came in.
    fn forced_switch(&mut self) -> bool {
        let mut switched = false;
        for side in SideId::ALL {
            while self.state.side(side).active.len() < self.state.active_slots {
                let next = self
                    .state
                    .side(side)
                    .bench
                    .iter()
                    .find(|id| self.state.is_alive(id))
                    .cloned();
                let Some(next) = next else {
                    break;
                };
                self.switch_in(side, None, &next);
                switched = true;
            }
        }
        switched
    }

    /// Moves `into` from the bench to the field, in place of `out` when given.
    fn switch_in(&mut self, side: SideId, out: Option<&str>, into: &str) {
        let roster = self.state.side_mut(side);
        roster.bench.retain(|id| id != into);
        match out.and_then(|out| roster.active.iter().position(|id| id == out)) {
            Some(slot) => {
                let previous = std::mem::replace(&mut roster.active[slot], into.to_string());
                roster.bench.push(previous);
            }
            None => roster.active.push(into.to_string()),
        }
        if let Some(previous) = out.and_then(|out| self.state.combatant_mut(out)) {
            previous.clear_battle_modifiers();
        }

        self.bus.push(BattleEvent::Switched {
            side,
            out: out.map(str::to_string),
            into: into.to_string(),
        });

        let hazards: Vec<_> = self.state.battlefield.hazards[side.index()]
            .iter()
            .copied()
            .collect();
        for hazard in hazards {
            if !self.state.is_alive(into) {
                break;
            }
            let commands = hazard.on_switch_in(&self.state, side, into);
            self.apply(commands, false);
        }

        if self.state.is_alive(into) {
            self.react(HookPoint::FieldChange, into, HookArgs::default());
        }
    }

    // --- Actions ---

    fn execute_action(&mut self, action: &Action) {
        let actor = action.combatant_id.as_str();
        if !self.state.is_alive(actor) || !self.state.is_active(actor) {
            debug!(%actor, "actor no longer able to act");
            return;
        }

        self.first_side.get_or_insert(action.side);
        self.bus
            .set_actor(Some(actor.to_string()), Some(action.label()));

        match &action.payload {
            ActionPayload::Forfeit => {
                self.bus.push(BattleEvent::Forfeited { side: action.side });
                let outcome = if self.state.is_wild_battle && action.side == SideId::Player {
                    Outcome::Escaped
                } else {
                    Outcome::Forfeit(action.side)
                };
                self.state.outcome = Some(outcome);
            }
            ActionPayload::Switch { into } => self.execute_switch(action, into),
            ActionPayload::Move { name, scope } => self.execute_move(action, name, *scope),
        }

        self.bus.clear_actor();
        if !self.is_decided() {
            self.sync_passives();
        }
    }

    fn execute_switch(&mut self, action: &Action, into: &str) {
        let actor = action.combatant_id.as_str();
        let trapped = self
            .state
            .combatant(actor)
            .is_some_and(|c| c.has_volatile(VolatileKind::Trapped));
        if trapped {
            self.bus.push(BattleEvent::ActionPrevented {
                actor: actor.to_string(),
                reason: PreventionReason::Trapped,
            });
            return;
        }

        let available = self.state.side(action.side).bench.iter().any(|id| id == into)
            && self.state.is_alive(into);
        if !available {
            self.bus.push(BattleEvent::ActionDropped {
                actor: actor.to_string(),
                reason: format!("cannot switch into {}", into),
            });
            return;
        }

        self.switch_in(action.side, Some(actor), into);
    }

    /// Whether the actor gets to use its move at all this action.
    fn can_attempt_move(&mut self, actor: &str) -> bool {
        let Some(combatant) = self.state.combatant(actor) else {
            return false;
        };
        if combatant.has_volatile(VolatileKind::Flinched) {
            self.bus.push(BattleEvent::ActionPrevented {
                actor: actor.to_string(),
                reason: PreventionReason::Flinched,
            });
            return false;
        }

        if let Some(status) = combatant.status {
            if !combatant.transient.skip_action {
                let result = status.on_move_attempt(&self.state, actor, &mut self.rng);
                self.apply_hook_result(format!("status:{}", status.id), result, false);
            }
        }

        self.state.is_alive(actor)
            && !self
                .state
                .combatant(actor)
                .is_some_and(|c| c.transient.skip_action)
    }

    /// Spends one PP and returns the move actually used, Struggle once the
    /// chosen move has run dry.
    fn spend_pp(&mut self, actor: &str, name: &str) -> MoveDescriptor {
        let mut chosen = name.to_string();
        if let Some(slot) = self
            .state
            .combatant_mut(actor)
            .and_then(|c| c.move_slot_mut(name))
        {
            if slot.pp == 0 {
                chosen = STRUGGLE.to_string();
            } else {
                slot.pp -= 1;
            }
        }
        self.engine.moves.resolve(&chosen, self.state.combatant(actor))
    }

    fn execute_move(&mut self, action: &Action, name: &str, scope: TargetScope) {
        let actor = action.combatant_id.as_str();
        let side = action.side;

        if !self.can_attempt_move(actor) {
            return;
        }

        let descriptor = self.spend_pp(actor, name);
        self.bus.push(BattleEvent::MoveUsed {
            user: actor.to_string(),
            move_name: descriptor.name.clone(),
        });
        let args = HookArgs {
            move_used: Some(&descriptor),
            ..Default::default()
        };
        self.react(HookPoint::MoveUsed, actor, args);

        // Targets are re-resolved against live hp
        let requested = match scope {
            TargetScope::SingleOpponent => action.defender_ids.first().map(String::as_str),
            _ => None,
        };
        let targets = resolve_targets(&self.state, actor, side, descriptor.target, requested);
        if targets.is_empty() {
            self.bus.push(BattleEvent::MoveFailed {
                user: actor.to_string(),
                move_name: descriptor.name.clone(),
            });
            return;
        }

        let mut any_hit = descriptor.target == TargetScope::User;
        if descriptor.target != TargetScope::User {
            for target in &targets {
                if !self.state.is_alive(actor) {
                    break;
                }
                if self.strike(actor, target, &descriptor) {
                    any_hit = true;
                }
            }
        }

        if any_hit && self.state.is_alive(actor) {
            self.apply_once_effects(actor, side, &descriptor);
        }
    }

    /// One target of a move: accuracy, damage, reactions and per-target
    /// effects. Returns whether the move connected.
    fn strike(&mut self, actor: &str, target: &str, descriptor: &MoveDescriptor) -> bool {
        if !self.state.is_alive(target) {
            return false;
        }

        let hits = match (self.state.combatant(actor), self.state.combatant(target)) {
            (Some(attacker), Some(defender)) => {
                move_hits(attacker, defender, descriptor, &mut self.rng)
            }
            _ => false,
        };
        if !hits {
            self.bus.push(BattleEvent::MoveMissed {
                user: actor.to_string(),
                target: target.to_string(),
            });
            return false;
        }

        if descriptor.deals_damage() {
            let outcome = match (self.state.combatant(actor), self.state.combatant(target)) {
                (Some(attacker), Some(defender)) => calculate_attack_outcome(
                    &self.state,
                    &self.engine.config,
                    attacker,
                    defender,
                    descriptor,
                    &mut self.rng,
                ),
                _ => return false,
            };
            if outcome.effectiveness == 0.0 {
                self.apply(outcome.commands, false);
                return true;
            }

            let before = self.state.hp(target);
            self.apply(outcome.commands, false);
            let dealt = before - self.state.hp(target);

            let hit_args = HookArgs {
                other: Some(target),
                move_used: Some(descriptor),
                damage: dealt,
                hp_before: self.hp_snapshot.get(actor).copied().unwrap_or(0),
            };
            self.react(HookPoint::Hit, actor, hit_args);

            if descriptor.makes_contact() {
                let contact_args = HookArgs {
                    other: Some(actor),
                    move_used: Some(descriptor),
                    damage: dealt,
                    hp_before: self.hp_snapshot.get(target).copied().unwrap_or(0),
                };
                self.react(HookPoint::Contact, target, contact_args);
            }

            self.apply_damage_effects(actor, dealt, descriptor);
        }

        if self.state.is_alive(target) {
            self.apply_target_effects(target, descriptor);
        }
        true
    }

    fn apply_damage_effects(&mut self, actor: &str, dealt: u16, descriptor: &MoveDescriptor) {
        let share = |percent: u8| ((dealt as u32 * percent as u32) / 100).max(1) as u16;
        let command = match descriptor.effect {
            MoveEffect::Drain(percent) if dealt > 0 => BattleCommand::Heal {
                target: actor.to_string(),
                amount: share(percent),
            },
            MoveEffect::Recoil(percent) if dealt > 0 => BattleCommand::DealDamage {
                target: actor.to_string(),
                amount: share(percent),
            },
            _ => return,
        };
        self.apply(vec![command], false);
    }

    fn roll_chance(&mut self, chance: u8, reason: &str) -> bool {
        chance >= 100 || self.rng.next_outcome(reason) <= chance
    }

    fn apply_target_effects(&mut self, target: &str, descriptor: &MoveDescriptor) {
        let mut commands = Vec::new();
        match descriptor.effect {
            MoveEffect::InflictStatus { status, chance } => {
                if self.roll_chance(chance, "status effect") {
                    commands.push(BattleCommand::InflictStatus {
                        target: target.to_string(),
                        status,
                        duration: DurationRoll::Default,
                    });
                }
            }
            MoveEffect::Flinch(chance) => {
                if self.roll_chance(chance, "flinch") {
                    commands.push(BattleCommand::AddVolatile {
                        target: target.to_string(),
                        kind: VolatileKind::Flinched,
                        turns: 1,
                    });
                }
            }
            _ => {}
        }

        commands.extend(
            descriptor
                .stat_changes
                .iter()
                .filter(|change| change.target == EffectTarget::Target)
                .map(|change| BattleCommand::ChangeStatStage {
                    target: target.to_string(),
                    stat: change.stat,
                    delta: change.stages,
                }),
        );
        self.apply(commands, false);
    }

    /// Effects that resolve once per use: field changes, self-healing and
    /// stat changes on the user.
    fn apply_once_effects(&mut self, actor: &str, side: SideId, descriptor: &MoveDescriptor) {
        let config = &self.engine.config;
        let mut commands = Vec::new();

        match descriptor.effect {
            MoveEffect::Heal(percent) => {
                let amount = (self.state.max_hp(actor) as u32 * percent as u32 / 100) as u16;
                commands.push(BattleCommand::Heal {
                    target: actor.to_string(),
                    amount: amount.max(1),
                });
            }
            MoveEffect::SetWeather(weather) => commands.push(BattleCommand::SetWeather {
                weather,
                turns: config.weather_turns,
            }),
            MoveEffect::SetTerrain(terrain) => commands.push(BattleCommand::SetTerrain {
                terrain,
                turns: config.terrain_turns,
            }),
            MoveEffect::SetHazard(hazard) => commands.push(BattleCommand::AddHazard {
                side: side.opponent(),
                hazard,
            }),
            MoveEffect::ClearHazards => commands.push(BattleCommand::ClearHazards { side }),
            MoveEffect::RaiseScreen(screen) => {
                let weather_ok = screen
                    .required_weather()
                    .map_or(true, |required| self.state.battlefield.weather() == Some(required));
                if !weather_ok || self.state.battlefield.screen_active(side, screen) {
                    commands.push(BattleCommand::EmitEvent(BattleEvent::MoveFailed {
                        user: actor.to_string(),
                        move_name: descriptor.name.clone(),
                    }));
                } else {
                    commands.push(BattleCommand::RaiseScreen {
                        side,
                        screen,
                        turns: config.screen_turns,
                    });
                }
            }
            _ => {}
        }

        commands.extend(
            descriptor
                .stat_changes
                .iter()
                .filter(|change| change.target == EffectTarget::User)
                .map(|change| BattleCommand::ChangeStatStage {
                    target: actor.to_string(),
                    stat: change.stat,
                    delta: change.stages,
                }),
        );
        self.apply(commands, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::Stats;
    use pretty_assertions::assert_eq;

    fn stats() -> Stats {
        Stats {
            hp: 100,
            attack: 50,
            defense: 50,
            sp_attack: 50,
            sp_defense: 50,
            speed: 50,
        }
    }

    #[test]
    fn test_is_battle_over_mapping() {
        let mut state = BattleState::new(
            "over",
            vec![Combatant::new("p1", "A", 50, stats())],
            vec![Combatant::new("o1", "B", 50, stats())],
            1,
        );
        assert_eq!(is_battle_over(&state), None);

        state.set_hp("o1", 0);
        assert_eq!(is_battle_over(&state), Some(Outcome::Victory));
        state.set_hp("p1", 0);
        assert_eq!(is_battle_over(&state), Some(Outcome::Draw));
        state.set_hp("o1", 100);
        assert_eq!(is_battle_over(&state), Some(Outcome::Defeat));

        state.outcome = Some(Outcome::Escaped);
        assert_eq!(is_battle_over(&state), Some(Outcome::Escaped));
    }

    #[test]
    fn test_new_battle_records_opening_and_immunities() {
        let engine = BattleEngine::with_builtin_data(BattleConfig::default()).unwrap();
        let state = engine.new_battle(
            "opening",
            vec![Combatant::new("p1", "A", 50, stats()).with_ability("insomnia")],
            vec![Combatant::new("o1", "B", 50, stats())],
            false,
        );

        assert_eq!(state.phase, TurnPhase::BuildQueue);
        assert_eq!(state.turn_number, 1);
        assert_eq!(state.battle_log.len(), 3);
        assert_eq!(state.battle_log[0].turn, 0);
        assert_eq!(
            state.combatant("p1").unwrap().status_immunities,
            vec![schema::StatusId::Sleep]
        );
    }
}
