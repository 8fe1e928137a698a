//! Ability and talent hooks.
//!
//! Abilities are keyed by normalized id. Talents are keyed by id and grade:
//! a variant registered for a specific grade wins over the generic entry,
//! which reads the grade from its context and scales itself.
//!
//! Every hook returns commands instead of touching state. The engine applies
//! them, so a hook that fails or panics leaves the battle as it was.
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use schema::{MoveDescriptor, StatType, StatusId, TalentGrade, WeatherId};
use tracing::debug;

use crate::battle::commands::{BattleCommand, TransientModifier};
use crate::battle::conditions::{self, DurationRoll};
use crate::battle::state::{BattleEvent, BattleState, TurnRng};
use crate::combatant::{Combatant, PassiveBonus, VolatileKind};
use crate::errors::{HookError, HookResult};
use crate::move_data::normalize_id;

/// Everything a hook may look at while deciding what to do.
pub struct HookContext<'a> {
    pub state: &'a BattleState,
    /// The combatant carrying the ability or talent.
    pub owner: &'a Combatant,
    /// The other party of the event: the defender for `on_hit`, the attacker
    /// for `on_contact`, the fainted combatant for `on_defeat`, the slowed
    /// combatant for `on_opponent_speed_drop`.
    pub other: Option<&'a Combatant>,
    pub move_used: Option<&'a MoveDescriptor>,
    pub damage: u16,
    /// Owner hp before the action that triggered the hook.
    pub hp_before: u16,
    pub grade: TalentGrade,
    /// Label of the hook being run, e.g. `ability:swiftswim`.
    pub source: &'a str,
    pub rng: &'a mut TurnRng,
}

impl HookContext<'_> {
    fn owner_id(&self) -> String {
        self.owner.id.clone()
    }

    fn other_id(&self) -> Result<String, HookError> {
        self.other
            .map(|other| other.id.clone())
            .ok_or_else(|| HookError::Failed {
                hook: self.source.to_string(),
                reason: "no opposing combatant in context".to_string(),
            })
    }

    fn roll(&mut self, chance: u8, reason: &str) -> bool {
        self.rng.next_outcome(reason) <= chance
    }

    /// Keeps a passive applied exactly while `active` holds.
    fn sync_passive(&self, active: bool, stat: StatType, multiplier: f64) -> Vec<BattleCommand> {
        let applied = self.owner.applied_passives.contains_key(self.source);
        match (active, applied) {
            (true, false) => vec![BattleCommand::ApplyPassive {
                target: self.owner_id(),
                source: self.source.to_string(),
                bonus: PassiveBonus { stat, multiplier },
            }],
            (false, true) => vec![BattleCommand::RevertPassive {
                target: self.owner_id(),
                source: self.source.to_string(),
            }],
            _ => Vec::new(),
        }
    }

    fn weather_is(&self, weather: WeatherId) -> bool {
        self.state.battlefield.weather() == Some(weather)
    }
}

/// Hook points an ability or talent can react to. All default to doing
/// nothing.
pub trait EffectHooks: Send + Sync {
    fn on_turn_start(&self, _ctx: &mut HookContext<'_>) -> HookResult {
        Ok(Vec::new())
    }

    /// Owner landed a damaging move on `other`.
    fn on_hit(&self, _ctx: &mut HookContext<'_>) -> HookResult {
        Ok(Vec::new())
    }

    /// Owner was struck by a contact move from `other`.
    fn on_contact(&self, _ctx: &mut HookContext<'_>) -> HookResult {
        Ok(Vec::new())
    }

    /// Owner dropped to 0 hp. Returning `SurviveWithHp` keeps it standing.
    fn on_fatal_hit(&self, _ctx: &mut HookContext<'_>) -> HookResult {
        Ok(Vec::new())
    }

    /// Owner's action made `other` faint.
    fn on_defeat(&self, _ctx: &mut HookContext<'_>) -> HookResult {
        Ok(Vec::new())
    }

    fn on_move_used(&self, _ctx: &mut HookContext<'_>) -> HookResult {
        Ok(Vec::new())
    }

    fn on_opponent_speed_drop(&self, _ctx: &mut HookContext<'_>) -> HookResult {
        Ok(Vec::new())
    }

    /// Re-evaluates weather or terrain gated passives.
    fn on_field_change(&self, _ctx: &mut HookContext<'_>) -> HookResult {
        Ok(Vec::new())
    }

    /// Outside battle. Only `GrowStat` commands aimed at the owner are honoured.
    fn on_level_up(&self, _owner: &Combatant, _grade: TalentGrade) -> HookResult {
        Ok(Vec::new())
    }

    fn status_immunities(&self) -> &'static [StatusId] {
        &[]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    TurnStart,
    Hit,
    Contact,
    FatalHit,
    Defeat,
    MoveUsed,
    OpponentSpeedDrop,
    FieldChange,
}

/// Event details handed to every hook at one dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookArgs<'a> {
    pub other: Option<&'a str>,
    pub move_used: Option<&'a MoveDescriptor>,
    pub damage: u16,
    pub hp_before: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HookOutput {
    pub source: String,
    pub result: HookResult,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LevelUpReport {
    pub new_level: u8,
    pub growth: Vec<(String, StatType, u16)>,
}

type SharedHooks = Arc<dyn EffectHooks>;

#[derive(Clone, Default)]
pub struct EffectRegistry {
    abilities: HashMap<String, SharedHooks>,
    talents: HashMap<String, SharedHooks>,
    graded_talents: HashMap<(String, TalentGrade), SharedHooks>,
}

impl fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut abilities: Vec<_> = self.abilities.keys().collect();
        let mut talents: Vec<_> = self.talents.keys().collect();
        abilities.sort();
        talents.sort();
        f.debug_struct("EffectRegistry")
            .field("abilities", &abilities)
            .field("talents", &talents)
            .field("graded_talents", &self.graded_talents.len())
            .finish()
    }
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in ability and talent.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_ability("sturdy", Arc::new(Sturdy));
        registry.register_ability("static", Arc::new(Static));
        registry.register_ability("roughskin", Arc::new(RoughSkin));
        registry.register_ability("speedboost", Arc::new(SpeedBoost));
        registry.register_ability("moxie", Arc::new(Moxie));
        registry.register_ability("swiftswim", Arc::new(WeatherSpeed(WeatherId::Rain)));
        registry.register_ability("chlorophyll", Arc::new(WeatherSpeed(WeatherId::Sun)));
        registry.register_ability("sandveil", Arc::new(SandVeil));
        registry.register_ability("competitive", Arc::new(Competitive));
        registry.register_ability("limber", Arc::new(Immunity(&[StatusId::Paralysis])));
        registry.register_ability("insomnia", Arc::new(Immunity(&[StatusId::Sleep])));
        registry.register_ability("waterveil", Arc::new(Immunity(&[StatusId::Burn])));

        registry.register_talent("ironwill", Arc::new(IronWill));
        registry.register_talent("shadowstep", Arc::new(ShadowStep));
        registry.register_talent("snare", Arc::new(Snare));
        registry.register_talent("bloodlust", Arc::new(Bloodlust));
        registry.register_talent("thorns", Arc::new(Thorns));
        registry.register_talent("momentum", Arc::new(Momentum));
        registry.register_talent("countersprint", Arc::new(Countersprint));
        registry.register_talent("scholar", Arc::new(Scholar));
        registry
    }

    pub fn register_ability(&mut self, id: &str, hooks: SharedHooks) {
        self.abilities.insert(normalize_id(id), hooks);
    }

    pub fn register_talent(&mut self, id: &str, hooks: SharedHooks) {
        self.talents.insert(normalize_id(id), hooks);
    }

    /// Overrides a talent for one grade only.
    pub fn register_talent_variant(&mut self, id: &str, grade: TalentGrade, hooks: SharedHooks) {
        self.graded_talents.insert((normalize_id(id), grade), hooks);
    }

    pub fn ability(&self, id: &str) -> Option<&SharedHooks> {
        self.abilities.get(&normalize_id(id))
    }

    pub fn talent(&self, id: &str, grade: TalentGrade) -> Option<&SharedHooks> {
        let key = normalize_id(id);
        self.graded_talents
            .get(&(key.clone(), grade))
            .or_else(|| self.talents.get(&key))
    }

    /// Every hook the combatant carries, ability first, with its source
    /// label and grade.
    fn hooks_for(&self, combatant: &Combatant) -> Vec<(String, TalentGrade, SharedHooks)> {
        let mut hooks = Vec::new();
        if let Some(ability) = &combatant.ability {
            match self.ability(ability) {
                Some(found) => hooks.push((
                    format!("ability:{}", normalize_id(ability)),
                    TalentGrade::Basic,
                    Arc::clone(found),
                )),
                None => debug!(%ability, "ability has no registered hooks"),
            }
        }
        for talent in &combatant.talents {
            match self.talent(&talent.id, talent.grade) {
                Some(found) => hooks.push((
                    format!("talent:{}", normalize_id(&talent.id)),
                    talent.grade,
                    Arc::clone(found),
                )),
                None => debug!(talent = %talent.id, "talent has no registered hooks"),
            }
        }
        hooks
    }

    /// Statuses the combatant's ability and talents make it immune to.
    pub fn status_immunities(&self, combatant: &Combatant) -> Vec<StatusId> {
        let mut immunities: Vec<StatusId> = self
            .hooks_for(combatant)
            .iter()
            .flat_map(|(_, _, hooks)| hooks.status_immunities().iter().copied())
            .collect();
        immunities.sort();
        immunities.dedup();
        immunities
    }

    /// Raises the combatant one level and applies whatever stat growth its
    /// talents grant.
    pub fn level_up(&self, combatant: &mut Combatant) -> LevelUpReport {
        combatant.level = combatant.level.saturating_add(1);
        let mut report = LevelUpReport {
            new_level: combatant.level,
            growth: Vec::new(),
        };

        for (source, grade, hooks) in self.hooks_for(combatant) {
            let result = guarded(&source, || hooks.on_level_up(combatant, grade));
            let commands = match result {
                Ok(commands) => commands,
                Err(error) => {
                    tracing::warn!(%source, %error, "level-up hook failed");
                    continue;
                }
            };
            for command in commands {
                if let BattleCommand::GrowStat {
                    target,
                    stat,
                    amount,
                } = command
                {
                    if target == combatant.id {
                        report.growth.push((source.clone(), stat, amount));
                    }
                }
            }
        }

        for (_, stat, amount) in &report.growth {
            combatant.stats.grow(*stat, *amount);
        }
        report
    }

    /// Runs `point` for every hook `owner` carries. Each hook is isolated:
    /// an error or panic only affects its own output.
    pub fn dispatch(
        &self,
        point: HookPoint,
        state: &BattleState,
        owner: &str,
        args: HookArgs<'_>,
        rng: &mut TurnRng,
    ) -> Vec<HookOutput> {
        let Some(combatant) = state.combatant(owner) else {
            return Vec::new();
        };
        let other = args.other.and_then(|id| state.combatant(id));

        self.hooks_for(combatant)
            .into_iter()
            .map(|(source, grade, hooks)| {
                let result = guarded(&source, || {
                    let mut ctx = HookContext {
                        state,
                        owner: combatant,
                        other,
                        move_used: args.move_used,
                        damage: args.damage,
                        hp_before: args.hp_before,
                        grade,
                        source: &source,
                        rng: &mut *rng,
                    };
                    match point {
                        HookPoint::TurnStart => hooks.on_turn_start(&mut ctx),
                        HookPoint::Hit => hooks.on_hit(&mut ctx),
                        HookPoint::Contact => hooks.on_contact(&mut ctx),
                        HookPoint::FatalHit => hooks.on_fatal_hit(&mut ctx),
                        HookPoint::Defeat => hooks.on_defeat(&mut ctx),
                        HookPoint::MoveUsed => hooks.on_move_used(&mut ctx),
                        HookPoint::OpponentSpeedDrop => hooks.on_opponent_speed_drop(&mut ctx),
                        HookPoint::FieldChange => hooks.on_field_change(&mut ctx),
                    }
                });
                HookOutput { source, result }
            })
            .collect()
    }
}

/// Runs a hook, turning a panic into a `HookError`.
pub fn guarded<F>(source: &str, hook: F) -> HookResult
where
    F: FnOnce() -> HookResult,
{
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => Err(HookError::Panicked {
            hook: source.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn survive(ctx: &HookContext<'_>) -> Vec<BattleCommand> {
    vec![
        BattleCommand::SurviveWithHp {
            target: ctx.owner_id(),
            hp: 1,
        },
        BattleCommand::EmitEvent(BattleEvent::SurvivedFatalHit {
            target: ctx.owner_id(),
            source: ctx.source.to_string(),
        }),
    ]
}

fn raise(target: String, stat: StatType, delta: i8) -> Vec<BattleCommand> {
    vec![BattleCommand::ChangeStatStage {
        target,
        stat,
        delta,
    }]
}

// --- Abilities ---

struct Sturdy;

impl EffectHooks for Sturdy {
    fn on_fatal_hit(&self, ctx: &mut HookContext<'_>) -> HookResult {
        if ctx.hp_before > 0 && ctx.hp_before == ctx.owner.max_hp() {
            Ok(survive(ctx))
        } else {
            Ok(Vec::new())
        }
    }
}

struct Static;

impl EffectHooks for Static {
    fn on_contact(&self, ctx: &mut HookContext<'_>) -> HookResult {
        let Some(attacker) = ctx.other else {
            return Ok(Vec::new());
        };
        if attacker.status.is_some() || conditions::is_immune(attacker, StatusId::Paralysis) {
            return Ok(Vec::new());
        }
        if !ctx.roll(30, "static") {
            return Ok(Vec::new());
        }
        Ok(vec![BattleCommand::InflictStatus {
            target: attacker.id.clone(),
            status: StatusId::Paralysis,
            duration: DurationRoll::Infinite,
        }])
    }
}

struct RoughSkin;

impl EffectHooks for RoughSkin {
    fn on_contact(&self, ctx: &mut HookContext<'_>) -> HookResult {
        let Some(attacker) = ctx.other else {
            return Ok(Vec::new());
        };
        Ok(vec![BattleCommand::DealDamage {
            target: attacker.id.clone(),
            amount: (attacker.max_hp() / 8).max(1),
        }])
    }
}

struct SpeedBoost;

impl EffectHooks for SpeedBoost {
    fn on_turn_start(&self, ctx: &mut HookContext<'_>) -> HookResult {
        Ok(raise(ctx.owner_id(), StatType::Speed, 1))
    }
}

struct Moxie;

impl EffectHooks for Moxie {
    fn on_defeat(&self, ctx: &mut HookContext<'_>) -> HookResult {
        Ok(raise(ctx.owner_id(), StatType::Attack, 1))
    }
}

/// Speed doubled while the given weather is up.
struct WeatherSpeed(WeatherId);

impl EffectHooks for WeatherSpeed {
    fn on_field_change(&self, ctx: &mut HookContext<'_>) -> HookResult {
        Ok(ctx.sync_passive(ctx.weather_is(self.0), StatType::Speed, 2.0))
    }
}

struct SandVeil;

impl EffectHooks for SandVeil {
    fn on_field_change(&self, ctx: &mut HookContext<'_>) -> HookResult {
        Ok(ctx.sync_passive(
            ctx.weather_is(WeatherId::Sandstorm),
            StatType::Evasion,
            1.25,
        ))
    }
}

struct Competitive;

impl EffectHooks for Competitive {
    fn on_opponent_speed_drop(&self, ctx: &mut HookContext<'_>) -> HookResult {
        Ok(raise(ctx.owner_id(), StatType::SpecialAttack, 1))
    }
}

struct Immunity(&'static [StatusId]);

impl EffectHooks for Immunity {
    fn status_immunities(&self) -> &'static [StatusId] {
        self.0
    }
}

// --- Talents ---

struct IronWill;

impl EffectHooks for IronWill {
    fn on_fatal_hit(&self, ctx: &mut HookContext<'_>) -> HookResult {
        let chance = ctx.grade.scale([10, 20, 30, 50]);
        if ctx.roll(chance, "iron will") {
            Ok(survive(ctx))
        } else {
            Ok(Vec::new())
        }
    }
}

struct ShadowStep;

impl EffectHooks for ShadowStep {
    fn on_turn_start(&self, ctx: &mut HookContext<'_>) -> HookResult {
        Ok(vec![BattleCommand::AddTransient {
            target: ctx.owner_id(),
            modifier: TransientModifier::EvasionBonus(ctx.grade.scale([5, 10, 15, 20])),
        }])
    }
}

struct Snare;

impl EffectHooks for Snare {
    fn on_hit(&self, ctx: &mut HookContext<'_>) -> HookResult {
        let target = ctx.other_id()?;
        if ctx.damage == 0 || !ctx.roll(ctx.grade.scale([20, 30, 40, 50]), "snare") {
            return Ok(Vec::new());
        }
        Ok(vec![BattleCommand::AddVolatile {
            target,
            kind: VolatileKind::Trapped,
            turns: ctx.grade.scale([2, 2, 3, 4]),
        }])
    }
}

struct Bloodlust;

impl EffectHooks for Bloodlust {
    fn on_defeat(&self, ctx: &mut HookContext<'_>) -> HookResult {
        let percent = ctx.grade.scale([10u32, 15, 20, 25]);
        let amount = (ctx.owner.max_hp() as u32 * percent / 100).max(1) as u16;
        Ok(vec![BattleCommand::Heal {
            target: ctx.owner_id(),
            amount,
        }])
    }
}

struct Thorns;

impl EffectHooks for Thorns {
    fn on_contact(&self, ctx: &mut HookContext<'_>) -> HookResult {
        let attacker = ctx.other_id()?;
        if ctx.damage == 0 {
            return Ok(Vec::new());
        }
        let percent = ctx.grade.scale([10u32, 15, 20, 30]);
        let amount = (ctx.damage as u32 * percent / 100).max(1) as u16;
        Ok(vec![BattleCommand::DealDamage {
            target: attacker,
            amount,
        }])
    }
}

struct Momentum;

impl EffectHooks for Momentum {
    fn on_move_used(&self, ctx: &mut HookContext<'_>) -> HookResult {
        if !ctx.move_used.is_some_and(MoveDescriptor::deals_damage) {
            return Ok(Vec::new());
        }
        Ok(vec![BattleCommand::AddTransient {
            target: ctx.owner_id(),
            modifier: TransientModifier::PowerBonus(ctx.grade.scale([0.1, 0.15, 0.2, 0.3])),
        }])
    }
}

struct Countersprint;

impl EffectHooks for Countersprint {
    fn on_opponent_speed_drop(&self, ctx: &mut HookContext<'_>) -> HookResult {
        Ok(raise(
            ctx.owner_id(),
            StatType::Speed,
            ctx.grade.scale([1, 1, 1, 2]),
        ))
    }
}

struct Scholar;

impl EffectHooks for Scholar {
    fn on_level_up(&self, owner: &Combatant, grade: TalentGrade) -> HookResult {
        let amount = grade.scale([1, 2, 3, 4]);
        Ok([StatType::SpecialAttack, StatType::SpecialDefense]
            .into_iter()
            .map(|stat| BattleCommand::GrowStat {
                target: owner.id.clone(),
                stat,
                amount,
            })
            .collect())
    }
}
