use schema::{HazardId, ScreenId, StatType, StatusId, TerrainId, WeatherId};
use tracing::debug;

use crate::battle::conditions::{self, DurationRoll};
use crate::battle::field::FieldSlot;
use crate::battle::state::{BattleEvent, BattleState, CombatantId, EventBus, SideId, TurnRng};
use crate::combatant::{Combatant, PassiveBonus, StatusCondition, VolatileKind};
use crate::errors::ExecutionError;

/// A per-turn modifier merged into a combatant's transient set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransientModifier {
    EvasionBonus(u8),
    PowerBonus(f64),
    SkipAction,
}

/// Atomic commands representing final state changes
#[derive(Debug, Clone, PartialEq)]
pub enum BattleCommand {
    // Combatant modifications
    DealDamage {
        target: CombatantId,
        amount: u16,
    },
    Heal {
        target: CombatantId,
        amount: u16,
    },
    /// Raw status write, no immunity checks and no log line.
    SetStatus {
        target: CombatantId,
        status: Option<StatusCondition>,
    },
    /// Status infliction going through the immunity and one-status rules.
    InflictStatus {
        target: CombatantId,
        status: StatusId,
        duration: DurationRoll,
    },
    CureStatus {
        target: CombatantId,
    },
    ChangeStatStage {
        target: CombatantId,
        stat: StatType,
        delta: i8,
    },
    AddVolatile {
        target: CombatantId,
        kind: VolatileKind,
        turns: u8,
    },
    AddTransient {
        target: CombatantId,
        modifier: TransientModifier,
    },
    SurviveWithHp {
        target: CombatantId,
        hp: u16,
    },
    ApplyPassive {
        target: CombatantId,
        source: String,
        bonus: PassiveBonus,
    },
    RevertPassive {
        target: CombatantId,
        source: String,
    },
    GrowStat {
        target: CombatantId,
        stat: StatType,
        amount: u16,
    },

    // Battlefield
    SetWeather {
        weather: WeatherId,
        turns: u8,
    },
    SetTerrain {
        terrain: TerrainId,
        turns: u8,
    },
    AddHazard {
        side: SideId,
        hazard: HazardId,
    },
    ClearHazards {
        side: SideId,
    },
    RaiseScreen {
        side: SideId,
        screen: ScreenId,
        turns: u8,
    },

    // Battle flow
    EmitEvent(BattleEvent),
}

/// Side effects of a batch the engine reacts to after it has been applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Combatants whose Speed stage actually fell.
    pub speed_dropped: Vec<CombatantId>,
}

/// Execute a batch of commands in order, stopping at the first failure
pub fn execute_command_batch(
    commands: Vec<BattleCommand>,
    state: &mut BattleState,
    bus: &mut EventBus,
    rng: &mut TurnRng,
) -> Result<BatchOutcome, ExecutionError> {
    let mut outcome = BatchOutcome::default();
    for command in commands {
        execute_command(command, state, bus, rng, &mut outcome)?;
    }
    Ok(outcome)
}

/// Helper function to execute commands that operate on a single combatant
fn execute_combatant_command<F>(
    target: &str,
    state: &mut BattleState,
    operation: F,
) -> Result<(), ExecutionError>
where
    F: FnOnce(&mut Combatant),
{
    match state.combatant_mut(target) {
        Some(combatant) => {
            operation(combatant);
            Ok(())
        }
        None => Err(ExecutionError::NoCombatant(target.to_string())),
    }
}

fn require_combatant(state: &BattleState, target: &str) -> Result<(), ExecutionError> {
    if state.combatant(target).is_some() {
        Ok(())
    } else {
        Err(ExecutionError::NoCombatant(target.to_string()))
    }
}

fn execute_command(
    command: BattleCommand,
    state: &mut BattleState,
    bus: &mut EventBus,
    rng: &mut TurnRng,
    outcome: &mut BatchOutcome,
) -> Result<(), ExecutionError> {
    match command {
        BattleCommand::EmitEvent(event) => {
            bus.push(event);
            Ok(())
        }
        BattleCommand::DealDamage { target, amount } => {
            require_combatant(state, &target)?;
            let dealt = state.apply_damage(&target, amount);
            bus.push(BattleEvent::DamageDealt {
                remaining_hp: state.hp(&target),
                target,
                damage: dealt,
            });
            Ok(())
        }
        BattleCommand::Heal { target, amount } => {
            require_combatant(state, &target)?;
            let healed = state.restore_hp(&target, amount);
            if healed > 0 {
                bus.push(BattleEvent::Healed {
                    new_hp: state.hp(&target),
                    target,
                    amount: healed,
                });
            }
            Ok(())
        }
        BattleCommand::SetStatus { target, status } => {
            execute_combatant_command(&target, state, |combatant| combatant.status = status)
        }
        BattleCommand::InflictStatus {
            target,
            status,
            duration,
        } => {
            require_combatant(state, &target)?;
            let (result, commands) = conditions::inflict(state, &target, status, duration, rng);
            debug!(%target, %status, ?result, "status infliction");
            let nested = execute_command_batch(commands, state, bus, rng)?;
            outcome.speed_dropped.extend(nested.speed_dropped);
            Ok(())
        }
        BattleCommand::CureStatus { target } => {
            require_combatant(state, &target)?;
            let commands = conditions::cure(state, &target);
            execute_command_batch(commands, state, bus, rng)?;
            Ok(())
        }
        BattleCommand::ChangeStatStage {
            target,
            stat,
            delta,
        } => {
            let combatant = state
                .combatant_mut(&target)
                .ok_or_else(|| ExecutionError::NoCombatant(target.clone()))?;
            let old_stage = combatant.get_stat_stage(stat);
            let new_stage = (old_stage + delta).clamp(-6, 6);
            if new_stage == old_stage {
                bus.push(BattleEvent::StatChangeBlocked {
                    target,
                    stat,
                    rising: delta > 0,
                });
                return Ok(());
            }
            combatant.set_stat_stage(stat, new_stage);
            if stat == StatType::Speed && new_stage < old_stage {
                outcome.speed_dropped.push(target.clone());
            }
            bus.push(BattleEvent::StatStageChanged {
                target,
                stat,
                old_stage,
                new_stage,
            });
            Ok(())
        }
        BattleCommand::AddVolatile {
            target,
            kind,
            turns,
        } => {
            execute_combatant_command(&target, state, |combatant| {
                combatant.add_volatile(kind, turns)
            })?;
            bus.push(BattleEvent::VolatileApplied { target, kind });
            Ok(())
        }
        BattleCommand::AddTransient { target, modifier } => {
            execute_combatant_command(&target, state, |combatant| match modifier {
                TransientModifier::EvasionBonus(bonus) => {
                    combatant.transient.evasion_bonus =
                        combatant.transient.evasion_bonus.saturating_add(bonus)
                }
                TransientModifier::PowerBonus(bonus) => combatant.transient.power_bonus += bonus,
                TransientModifier::SkipAction => combatant.transient.skip_action = true,
            })
        }
        BattleCommand::SurviveWithHp { target, hp } => {
            require_combatant(state, &target)?;
            let restored = hp.max(state.hp(&target));
            state.set_hp(&target, restored);
            Ok(())
        }
        BattleCommand::ApplyPassive {
            target,
            source,
            bonus,
        } => {
            let combatant = state
                .combatant_mut(&target)
                .ok_or_else(|| ExecutionError::NoCombatant(target.clone()))?;
            // Applying twice must not stack
            if combatant.applied_passives.contains_key(&source) {
                return Ok(());
            }
            combatant.applied_passives.insert(source.clone(), bonus);
            bus.push(BattleEvent::PassiveApplied {
                target,
                source,
                stat: bonus.stat,
            });
            Ok(())
        }
        BattleCommand::RevertPassive { target, source } => {
            let combatant = state
                .combatant_mut(&target)
                .ok_or_else(|| ExecutionError::NoCombatant(target.clone()))?;
            if let Some(bonus) = combatant.applied_passives.remove(&source) {
                bus.push(BattleEvent::PassiveReverted {
                    target,
                    source,
                    stat: bonus.stat,
                });
            }
            Ok(())
        }
        BattleCommand::GrowStat {
            target,
            stat,
            amount,
        } => execute_combatant_command(&target, state, |combatant| {
            combatant.stats.grow(stat, amount)
        }),
        BattleCommand::SetWeather { weather, turns } => {
            state.battlefield.weather = Some(FieldSlot {
                id: weather,
                turns_remaining: turns,
            });
            bus.push(BattleEvent::WeatherStarted { weather });
            Ok(())
        }
        BattleCommand::SetTerrain { terrain, turns } => {
            state.battlefield.terrain = Some(FieldSlot {
                id: terrain,
                turns_remaining: turns,
            });
            bus.push(BattleEvent::TerrainStarted { terrain });
            Ok(())
        }
        BattleCommand::AddHazard { side, hazard } => {
            if state.battlefield.hazards[side.index()].insert(hazard) {
                bus.push(BattleEvent::HazardSet { side, hazard });
            }
            Ok(())
        }
        BattleCommand::ClearHazards { side } => {
            let hazards = &mut state.battlefield.hazards[side.index()];
            if !hazards.is_empty() {
                hazards.clear();
                bus.push(BattleEvent::HazardsCleared { side });
            }
            Ok(())
        }
        BattleCommand::RaiseScreen { side, screen, turns } => {
            state.battlefield.screens[side.index()].insert(screen, turns);
            bus.push(BattleEvent::ScreenRaised { side, screen });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::Stats;
    use pretty_assertions::assert_eq;

    fn state() -> BattleState {
        let stats = Stats {
            hp: 100,
            attack: 50,
            defense: 50,
            sp_attack: 50,
            sp_defense: 50,
            speed: 50,
        };
        BattleState::new(
            "cmd",
            vec![Combatant::new("p1", "Alpha", 50, stats)],
            vec![Combatant::new("o1", "Beta", 50, stats)],
            1,
        )
    }

    #[test]
    fn test_damage_and_heal_stay_in_bounds() {
        let mut state = state();
        let mut bus = EventBus::new();
        let mut rng = TurnRng::new_for_test(vec![50]);

        execute_command_batch(
            vec![
                BattleCommand::DealDamage {
                    target: "o1".into(),
                    amount: 130,
                },
                BattleCommand::Heal {
                    target: "p1".into(),
                    amount: 40,
                },
            ],
            &mut state,
            &mut bus,
            &mut rng,
        )
        .unwrap();

        assert_eq!(state.hp("o1"), 0);
        assert_eq!(state.hp("p1"), 100);
        // The heal was a no-op and logs nothing
        assert_eq!(
            bus.events(),
            &[BattleEvent::DamageDealt {
                target: "o1".into(),
                damage: 100,
                remaining_hp: 0
            }]
        );
    }

    #[test]
    fn test_passive_applies_exactly_once() {
        let mut state = state();
        let mut bus = EventBus::new();
        let mut rng = TurnRng::new_for_test(vec![50]);
        let apply = BattleCommand::ApplyPassive {
            target: "p1".into(),
            source: "ability:swiftswim".into(),
            bonus: PassiveBonus {
                stat: StatType::Speed,
                multiplier: 2.0,
            },
        };

        execute_command_batch(vec![apply.clone(), apply], &mut state, &mut bus, &mut rng).unwrap();
        assert_eq!(state.combatant("p1").unwrap().passive_multiplier(StatType::Speed), 2.0);
        assert_eq!(bus.len(), 1);

        let revert = BattleCommand::RevertPassive {
            target: "p1".into(),
            source: "ability:swiftswim".into(),
        };
        execute_command_batch(vec![revert.clone(), revert], &mut state, &mut bus, &mut rng)
            .unwrap();
        assert_eq!(state.combatant("p1").unwrap().passive_multiplier(StatType::Speed), 1.0);
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn test_speed_drops_are_reported() {
        let mut state = state();
        let mut bus = EventBus::new();
        let mut rng = TurnRng::new_for_test(vec![50]);

        let outcome = execute_command_batch(
            vec![
                BattleCommand::ChangeStatStage {
                    target: "o1".into(),
                    stat: StatType::Speed,
                    delta: -1,
                },
                BattleCommand::ChangeStatStage {
                    target: "p1".into(),
                    stat: StatType::Speed,
                    delta: 2,
                },
            ],
            &mut state,
            &mut bus,
            &mut rng,
        )
        .unwrap();
        assert_eq!(outcome.speed_dropped, vec!["o1".to_string()]);
    }

    #[test]
    fn test_missing_combatant_aborts_batch() {
        let mut state = state();
        let mut bus = EventBus::new();
        let mut rng = TurnRng::new_for_test(vec![50]);

        let result = execute_command_batch(
            vec![BattleCommand::DealDamage {
                target: "ghost".into(),
                amount: 10,
            }],
            &mut state,
            &mut bus,
            &mut rng,
        );
        assert_eq!(result, Err(ExecutionError::NoCombatant("ghost".into())));
    }
}
