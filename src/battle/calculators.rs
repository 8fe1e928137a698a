use schema::{
    effectiveness, ElementType, MoveCategory, MoveDescriptor, StatType, StatusId, TargetScope,
};

use crate::battle::commands::BattleCommand;
use crate::battle::field::DamageContext;
use crate::battle::state::{BattleEvent, BattleState, TurnRng};
use crate::battle::stats::{apply_accuracy_stage_multiplier, effective_attack, effective_defense};
use crate::combatant::Combatant;
use crate::config::BattleConfig;

/// Result of one damaging hit, before any of it is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct AttackOutcome {
    pub commands: Vec<BattleCommand>,
    pub damage: u16,
    pub effectiveness: f64,
    pub critical: bool,
}

/// Accuracy check for `move_used` against `defender`.
///
/// Self-targeted moves and anything that ends up at 100% or better never
/// consume a roll.
pub fn move_hits(
    attacker: &Combatant,
    defender: &Combatant,
    move_used: &MoveDescriptor,
    rng: &mut TurnRng,
) -> bool {
    if move_used.target == TargetScope::User {
        return true;
    }

    let stage =
        attacker.get_stat_stage(StatType::Accuracy) - defender.get_stat_stage(StatType::Evasion);
    let multiplier =
        apply_accuracy_stage_multiplier(stage) / defender.passive_multiplier(StatType::Evasion);
    let chance = (move_used.accuracy as f64 * multiplier) - defender.transient.evasion_bonus as f64;
    let chance = chance.clamp(1.0, 100.0) as u8;

    if chance >= 100 {
        return true;
    }
    rng.next_outcome("accuracy check") <= chance
}

/// Damage pipeline for a damaging move that already passed its accuracy check.
pub fn calculate_attack_outcome(
    state: &BattleState,
    config: &BattleConfig,
    attacker: &Combatant,
    defender: &Combatant,
    move_used: &MoveDescriptor,
    rng: &mut TurnRng,
) -> AttackOutcome {
    let type_factor = effectiveness(move_used.element, &defender.types);
    if type_factor == 0.0 {
        return AttackOutcome {
            commands: vec![BattleCommand::EmitEvent(BattleEvent::Effectiveness {
                multiplier: 0.0,
            })],
            damage: 0,
            effectiveness: 0.0,
            critical: false,
        };
    }

    let critical = rng.next_outcome("critical hit") <= config.crit_threshold;
    let ctx = DamageContext { critical };

    // Base damage from level, power and the attacking/defending stats
    let level = attacker.level as f64;
    let attack = effective_attack(attacker, move_used.category).max(1) as f64;
    let defense = effective_defense(defender, move_used.category).max(1) as f64;
    let base = ((2.0 * level / 5.0 + 2.0) * move_used.power as f64 * attack / defense) / 50.0 + 2.0;

    let typed = move_used.element != ElementType::Unknown;
    let stab = if typed && attacker.has_type(move_used.element) {
        config.stab_multiplier
    } else {
        1.0
    };
    let screen = state
        .side_of(&defender.id)
        .map_or(1.0, |side| state.battlefield.screen_multiplier(side, move_used, &ctx));
    let burn = if move_used.category == MoveCategory::Physical
        && attacker.status.is_some_and(|status| status.id == StatusId::Burn)
    {
        0.5
    } else {
        1.0
    };
    let crit = if critical { 1.5 } else { 1.0 };
    let variance = rng.range_inclusive(85, 100, "damage variance") as f64 / 100.0;

    let modified = base
        * stab
        * type_factor
        * state.battlefield.move_multiplier(move_used)
        * screen
        * burn
        * attacker.transient.power_multiplier()
        * crit
        * variance;
    let damage = (modified.floor() as u16).max(1);

    let mut commands = Vec::new();
    if critical {
        commands.push(BattleCommand::EmitEvent(BattleEvent::CriticalHit {
            target: defender.id.clone(),
        }));
    }
    if type_factor != 1.0 {
        commands.push(BattleCommand::EmitEvent(BattleEvent::Effectiveness {
            multiplier: type_factor,
        }));
    }
    commands.push(BattleCommand::DealDamage {
        target: defender.id.clone(),
        amount: damage,
    });

    AttackOutcome {
        commands,
        damage,
        effectiveness: type_factor,
        critical,
    }
}
