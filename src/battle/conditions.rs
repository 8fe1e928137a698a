use schema::{ElementType, StatType, StatusId};
use serde::{Deserialize, Serialize};

use crate::battle::commands::{BattleCommand, TransientModifier};
use crate::battle::state::{
    BattleEvent, BattleState, CombatantId, PreventionReason, StatusFailure, TurnRng,
};
use crate::battle::stats::effective_stat;
use crate::combatant::{Combatant, StatusCondition};
use crate::errors::{HookError, HookResult};

/// How long a newly inflicted status lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DurationRoll {
    /// Rolled per status: Sleep 1-3 turns, Confusion 2-5, everything else
    /// until cured.
    #[default]
    Default,
    Fixed(u8),
    Infinite,
}

impl DurationRoll {
    pub fn roll(self, status: StatusId, rng: &mut TurnRng) -> Option<u8> {
        match self {
            DurationRoll::Fixed(turns) => Some(turns),
            DurationRoll::Infinite => None,
            DurationRoll::Default => match status {
                StatusId::Sleep => Some(rng.range_inclusive(1, 3, "sleep duration")),
                StatusId::Confusion => Some(rng.range_inclusive(2, 5, "confusion duration")),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflictOutcome {
    Applied,
    AlreadyAfflicted(StatusId),
    Immune,
}

/// Whether typing or a declared immunity rules out `status` for `combatant`.
pub fn is_immune(combatant: &Combatant, status: StatusId) -> bool {
    if combatant.status_immunities.contains(&status) {
        return true;
    }
    match status {
        StatusId::Burn => combatant.has_type(ElementType::Fire),
        StatusId::Paralysis => combatant.has_type(ElementType::Electric),
        StatusId::Poison => {
            combatant.has_type(ElementType::Poison) || combatant.has_type(ElementType::Steel)
        }
        StatusId::Freeze => combatant.has_type(ElementType::Ice),
        StatusId::Sleep | StatusId::Confusion => false,
    }
}

/// Decides whether `status` lands on `target` and returns the commands that
/// apply it, or the failure record when it does not.
pub fn inflict(
    state: &BattleState,
    target: &str,
    status: StatusId,
    roll: DurationRoll,
    rng: &mut TurnRng,
) -> (InflictOutcome, Vec<BattleCommand>) {
    let Some(combatant) = state.combatant(target) else {
        return (InflictOutcome::Immune, Vec::new());
    };
    let failed = |reason: StatusFailure| {
        BattleCommand::EmitEvent(BattleEvent::StatusFailed {
            target: target.to_string(),
            status,
            reason,
        })
    };

    if !state.is_alive(target) || is_immune(combatant, status) {
        return (InflictOutcome::Immune, vec![failed(StatusFailure::Immune)]);
    }
    if let Some(existing) = combatant.status {
        return (
            InflictOutcome::AlreadyAfflicted(existing.id),
            vec![failed(StatusFailure::AlreadyAfflicted(existing.id))],
        );
    }

    let condition = StatusCondition::new(status, roll.roll(status, rng));
    (
        InflictOutcome::Applied,
        vec![
            BattleCommand::SetStatus {
                target: target.to_string(),
                status: Some(condition),
            },
            BattleCommand::EmitEvent(BattleEvent::StatusInflicted {
                target: target.to_string(),
                status,
            }),
        ],
    )
}

/// Commands clearing whatever status `target` carries. Empty when healthy.
pub fn cure(state: &BattleState, target: &str) -> Vec<BattleCommand> {
    match state.combatant(target).and_then(|combatant| combatant.status) {
        Some(existing) => vec![
            BattleCommand::SetStatus {
                target: target.to_string(),
                status: None,
            },
            BattleCommand::EmitEvent(BattleEvent::StatusCured {
                target: target.to_string(),
                status: existing.id,
            }),
        ],
        None => Vec::new(),
    }
}

/// Per-status behaviour at the three points of a turn where statuses act.
pub trait StatusHooks {
    fn on_turn_start(&self, state: &BattleState, owner: &str) -> HookResult;
    fn on_move_attempt(&self, state: &BattleState, owner: &str, rng: &mut TurnRng) -> HookResult;
    fn on_turn_end(&self, state: &BattleState, owner: &str) -> HookResult;
}

fn owner_of<'a>(
    state: &'a BattleState,
    owner: &str,
    hook: &str,
) -> Result<&'a Combatant, HookError> {
    state
        .combatant(owner)
        .ok_or_else(|| HookError::MissingCombatant {
            hook: hook.to_string(),
            id: owner.to_string(),
        })
}

fn skip(owner: &CombatantId) -> BattleCommand {
    BattleCommand::AddTransient {
        target: owner.clone(),
        modifier: TransientModifier::SkipAction,
    }
}

fn prevented(owner: &CombatantId, reason: PreventionReason) -> BattleCommand {
    BattleCommand::EmitEvent(BattleEvent::ActionPrevented {
        actor: owner.clone(),
        reason,
    })
}

fn counted_down(owner: &CombatantId, status: StatusCondition, turns: u8) -> BattleCommand {
    BattleCommand::SetStatus {
        target: owner.clone(),
        status: Some(StatusCondition::new(status.id, Some(turns))),
    }
}

impl StatusHooks for StatusCondition {
    fn on_turn_start(&self, state: &BattleState, owner: &str) -> HookResult {
        let combatant = owner_of(state, owner, "status:on_turn_start")?;
        let owner = &combatant.id;

        let commands = match (self.id, self.turns_remaining) {
            (StatusId::Sleep, Some(0)) | (StatusId::Confusion, Some(0)) => cure(state, owner),
            (StatusId::Sleep, Some(turns)) => vec![
                counted_down(owner, *self, turns - 1),
                skip(owner),
                BattleCommand::EmitEvent(BattleEvent::StillAsleep {
                    target: owner.clone(),
                }),
            ],
            // Sleep with no duration never wears off on its own
            (StatusId::Sleep, None) => vec![
                skip(owner),
                BattleCommand::EmitEvent(BattleEvent::StillAsleep {
                    target: owner.clone(),
                }),
            ],
            (StatusId::Confusion, Some(turns)) => vec![counted_down(owner, *self, turns - 1)],
            _ => Vec::new(),
        };
        Ok(commands)
    }

    fn on_move_attempt(&self, state: &BattleState, owner: &str, rng: &mut TurnRng) -> HookResult {
        let combatant = owner_of(state, owner, "status:on_move_attempt")?;
        let owner = &combatant.id;

        let commands = match self.id {
            StatusId::Paralysis => {
                if rng.next_outcome("paralysis check") <= 25 {
                    vec![skip(owner), prevented(owner, PreventionReason::Paralyzed)]
                } else {
                    Vec::new()
                }
            }
            StatusId::Confusion => {
                if rng.next_outcome("confusion check") <= 33 {
                    let damage = effective_stat(combatant, StatType::Attack) / 2;
                    vec![
                        skip(owner),
                        BattleCommand::EmitEvent(BattleEvent::ConfusionSelfHit {
                            target: owner.clone(),
                            damage,
                        }),
                        BattleCommand::DealDamage {
                            target: owner.clone(),
                            amount: damage,
                        },
                    ]
                } else {
                    Vec::new()
                }
            }
            StatusId::Freeze => {
                if rng.next_outcome("thaw check") <= 20 {
                    cure(state, owner)
                } else {
                    vec![skip(owner), prevented(owner, PreventionReason::Frozen)]
                }
            }
            StatusId::Sleep => {
                // Only reachable when something put the owner to sleep after turn start
                if combatant.transient.skip_action {
                    Vec::new()
                } else {
                    vec![skip(owner), prevented(owner, PreventionReason::Asleep)]
                }
            }
            StatusId::Poison | StatusId::Burn => Vec::new(),
        };
        Ok(commands)
    }

    fn on_turn_end(&self, state: &BattleState, owner: &str) -> HookResult {
        let combatant = owner_of(state, owner, "status:on_turn_end")?;
        let owner = &combatant.id;

        match self.id {
            StatusId::Poison | StatusId::Burn => {
                let damage = combatant.max_hp() / 16;
                if damage == 0 {
                    return Ok(Vec::new());
                }
                Ok(vec![
                    BattleCommand::EmitEvent(BattleEvent::StatusDamage {
                        target: owner.clone(),
                        status: self.id,
                        damage,
                    }),
                    BattleCommand::DealDamage {
                        target: owner.clone(),
                        amount: damage,
                    },
                ])
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::Stats;
    use pretty_assertions::assert_eq;

    fn state_with(opponent_types: Vec<ElementType>) -> BattleState {
        let stats = Stats {
            hp: 160,
            attack: 60,
            defense: 50,
            sp_attack: 50,
            sp_defense: 50,
            speed: 50,
        };
        let mut opponent = Combatant::new("o1", "Target", 50, stats);
        opponent.types = opponent_types;
        BattleState::new(
            "status",
            vec![Combatant::new("p1", "Source", 50, stats)],
            vec![opponent],
            1,
        )
    }

    #[test]
    fn test_typing_immunities() {
        let state = state_with(vec![ElementType::Steel]);
        let mut rng = TurnRng::new_for_test(vec![50]);
        let (outcome, commands) =
            inflict(&state, "o1", StatusId::Poison, DurationRoll::Default, &mut rng);
        assert_eq!(outcome, InflictOutcome::Immune);
        assert_eq!(commands.len(), 1);

        let state = state_with(vec![ElementType::Fire]);
        let (outcome, _) = inflict(&state, "o1", StatusId::Burn, DurationRoll::Default, &mut rng);
        assert_eq!(outcome, InflictOutcome::Immune);
        let (outcome, _) = inflict(&state, "o1", StatusId::Poison, DurationRoll::Default, &mut rng);
        assert_eq!(outcome, InflictOutcome::Applied);
    }

    #[test]
    fn test_declared_immunity() {
        let mut state = state_with(vec![ElementType::Normal]);
        state
            .combatant_mut("o1")
            .unwrap()
            .status_immunities
            .push(StatusId::Sleep);
        let mut rng = TurnRng::new_for_test(vec![50]);
        let (outcome, _) = inflict(&state, "o1", StatusId::Sleep, DurationRoll::Fixed(2), &mut rng);
        assert_eq!(outcome, InflictOutcome::Immune);
    }

    #[test]
    fn test_default_durations() {
        let mut rng = TurnRng::new_for_test(vec![100, 1]);
        assert_eq!(DurationRoll::Default.roll(StatusId::Sleep, &mut rng), Some(3));
        assert_eq!(DurationRoll::Default.roll(StatusId::Confusion, &mut rng), Some(2));
        assert_eq!(DurationRoll::Default.roll(StatusId::Burn, &mut rng), None);
        assert_eq!(DurationRoll::Fixed(4).roll(StatusId::Burn, &mut rng), Some(4));
    }

    #[test]
    fn test_paralysis_roll_threshold() {
        let mut state = state_with(vec![ElementType::Normal]);
        let paralysis = StatusCondition::infinite(StatusId::Paralysis);
        state.combatant_mut("o1").unwrap().status = Some(paralysis);

        let mut rng = TurnRng::new_for_test(vec![25, 26]);
        assert_eq!(paralysis.on_move_attempt(&state, "o1", &mut rng).unwrap().len(), 2);
        assert!(paralysis.on_move_attempt(&state, "o1", &mut rng).unwrap().is_empty());
    }

    #[test]
    fn test_confusion_self_hit_uses_half_attack() {
        let state = state_with(vec![ElementType::Normal]);
        let confusion = StatusCondition::new(StatusId::Confusion, Some(3));
        let mut rng = TurnRng::new_for_test(vec![10]);
        let commands = confusion.on_move_attempt(&state, "p1", &mut rng).unwrap();
        assert!(commands.contains(&BattleCommand::DealDamage {
            target: "p1".into(),
            amount: 30
        }));
    }

    #[test]
    fn test_residual_rounds_down_to_nothing_on_tiny_hp() {
        let poison = StatusCondition::infinite(StatusId::Poison);
        let state = state_with(vec![]);
        let commands = poison.on_turn_end(&state, "p1").unwrap();
        assert!(commands.contains(&BattleCommand::DealDamage {
            target: "p1".into(),
            amount: 10
        }));

        let tiny = Stats {
            hp: 10,
            attack: 50,
            defense: 50,
            sp_attack: 50,
            sp_defense: 50,
            speed: 50,
        };
        let state = BattleState::new(
            "tiny",
            vec![Combatant::new("p1", "Source", 50, tiny)],
            vec![Combatant::new("o1", "Target", 50, tiny)],
            1,
        );
        assert_eq!(poison.on_turn_end(&state, "p1"), Ok(Vec::new()));
    }

    #[test]
    fn test_missing_owner_is_a_hook_error() {
        let state = state_with(vec![]);
        let burn = StatusCondition::infinite(StatusId::Burn);
        assert!(matches!(
            burn.on_turn_end(&state, "nobody"),
            Err(HookError::MissingCombatant { .. })
        ));
    }
}
