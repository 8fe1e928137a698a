use schema::{MoveCategory, StatType, StatusId};

use crate::combatant::Combatant;

/// Stage-, passive- and status-adjusted value of one stat.
pub fn effective_stat(combatant: &Combatant, stat: StatType) -> u16 {
    let base = combatant.stats.get(stat);
    let staged = apply_stat_stage_multiplier(base, combatant.get_stat_stage(stat));
    let passive = combatant.passive_multiplier(stat);
    ((staged as f64) * passive).round().min(u16::MAX as f64) as u16
}

/// Calculate effective attack stat for a move category
pub fn effective_attack(combatant: &Combatant, category: MoveCategory) -> u16 {
    match category {
        MoveCategory::Physical => effective_stat(combatant, StatType::Attack),
        MoveCategory::Special => effective_stat(combatant, StatType::SpecialAttack),
        MoveCategory::Status => 0, // Status moves don't use attack stats
    }
}

/// Calculate effective defense stat against a move category
pub fn effective_defense(combatant: &Combatant, category: MoveCategory) -> u16 {
    match category {
        MoveCategory::Physical => effective_stat(combatant, StatType::Defense),
        MoveCategory::Special => effective_stat(combatant, StatType::SpecialDefense),
        MoveCategory::Status => 0, // Status moves don't target defense
    }
}

/// Calculate effective speed including stat stages, passives and paralysis
pub fn effective_speed(combatant: &Combatant) -> u16 {
    let mut speed = effective_stat(combatant, StatType::Speed);

    // Apply paralysis (quarter speed)
    if combatant
        .status
        .is_some_and(|status| status.id == StatusId::Paralysis)
    {
        speed /= 4;
    }

    speed
}

/// Apply accuracy/evasion stage multipliers according to the 3/3 formula
/// Uses different multipliers than regular stats
/// Stages range from -6 to +6
pub fn apply_accuracy_stage_multiplier(stage: i8) -> f64 {
    let clamped_stage = stage.clamp(-6, 6);
    if clamped_stage >= 0 {
        (3.0 + clamped_stage as f64) / 3.0
    } else {
        3.0 / (3.0 - clamped_stage as f64)
    }
}

/// Apply stat stage multipliers
/// Stages range from -6 to +6
/// Negative stages: (2 / (2 + |stage|))
/// Positive stages: ((2 + stage) / 2)
pub fn apply_stat_stage_multiplier(base_stat: u16, stage: i8) -> u16 {
    let clamped_stage = stage.clamp(-6, 6);

    if clamped_stage == 0 {
        return base_stat;
    }

    let multiplier = if clamped_stage < 0 {
        2.0 / (2.0 + (-clamped_stage) as f64)
    } else {
        (2.0 + clamped_stage as f64) / 2.0
    };

    ((base_stat as f64) * multiplier).round() as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{PassiveBonus, StatusCondition, Stats};

    fn combatant() -> Combatant {
        Combatant::new(
            "test",
            "Test",
            50,
            Stats {
                hp: 100,
                attack: 80,
                defense: 80,
                sp_attack: 80,
                sp_defense: 80,
                speed: 100,
            },
        )
    }

    #[test]
    fn test_stat_stage_multipliers() {
        assert_eq!(apply_stat_stage_multiplier(100, 0), 100); // No change
        assert_eq!(apply_stat_stage_multiplier(100, 1), 150); // +1 stage: 1.5x
        assert_eq!(apply_stat_stage_multiplier(100, 2), 200); // +2 stage: 2.0x
        assert_eq!(apply_stat_stage_multiplier(100, -1), 67); // -1 stage: 2/3x
        assert_eq!(apply_stat_stage_multiplier(100, -2), 50); // -2 stage: 1/2x
        assert_eq!(apply_stat_stage_multiplier(100, 6), 400); // +6 stage: 4.0x
        assert_eq!(apply_stat_stage_multiplier(100, -6), 25); // -6 stage: 1/4x
    }

    #[test]
    fn test_accuracy_stage_multipliers() {
        assert!((apply_accuracy_stage_multiplier(0) - 1.0).abs() < 0.001);
        assert!((apply_accuracy_stage_multiplier(1) - 4.0 / 3.0).abs() < 0.001);
        assert!((apply_accuracy_stage_multiplier(-1) - 3.0 / 4.0).abs() < 0.001);
        assert!((apply_accuracy_stage_multiplier(6) - 3.0).abs() < 0.001);
        assert!((apply_accuracy_stage_multiplier(-6) - 1.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn test_effective_speed_paralysis() {
        let mut fighter = combatant();
        fighter.status = Some(StatusCondition::infinite(StatusId::Paralysis));
        // Paralysis should quarter speed: 100 / 4 = 25
        assert_eq!(effective_speed(&fighter), 25);

        fighter.status = None;
        assert_eq!(effective_speed(&fighter), 100);
    }

    #[test]
    fn test_passive_and_stage_stack() {
        let mut fighter = combatant();
        fighter.set_stat_stage(StatType::Speed, 1);
        fighter.applied_passives.insert(
            "chlorophyll".into(),
            PassiveBonus {
                stat: StatType::Speed,
                multiplier: 2.0,
            },
        );
        assert_eq!(effective_speed(&fighter), 300);
        assert_eq!(effective_attack(&fighter, MoveCategory::Status), 0);
        assert_eq!(effective_defense(&fighter, MoveCategory::Special), 80);
    }
}
