#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use schema::{StatType, TalentGrade, WeatherId};

    use crate::battle::action_stack::CommittedAction;
    use crate::battle::engine::BattleEngine;
    use crate::battle::field::FieldSlot;
    use crate::battle::state::{BattleEvent, PreventionReason, SideId, TurnRng};
    use crate::battle::talents::{EffectHooks, EffectRegistry, HookArgs, HookContext, HookPoint};
    use crate::battle::tests::common::{
        count_events, create_test_battle, flat_stats, has_event, predictable_rng, test_engine,
        TestCombatantBuilder,
    };
    use crate::combatant::Combatant;
    use crate::config::BattleConfig;
    use crate::errors::HookResult;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    struct Explodes;

    impl EffectHooks for Explodes {
        fn on_turn_start(&self, _ctx: &mut HookContext<'_>) -> HookResult {
            panic!("boom")
        }
    }

    #[test]
    fn test_panicking_hook_does_not_stop_the_turn() {
        let mut registry = EffectRegistry::builtin();
        registry.register_ability("explodes", Arc::new(Explodes));
        let moves = test_engine().moves().clone();
        let engine = BattleEngine::new(BattleConfig::default(), moves, registry);
        let state = create_test_battle(
            &engine,
            vec![TestCombatantBuilder::custom("p1", flat_stats(200, 120)).with_ability("explodes")],
            vec![TestCombatantBuilder::custom("o1", flat_stats(200, 80))],
        );
        let actions = vec![
            CommittedAction::use_move("p1", "Tackle"),
            CommittedAction::use_move("o1", "Tackle"),
        ];

        let (state, log) = engine.resolve_turn_with_rng(state, &actions, predictable_rng());

        let failure = log
            .iter()
            .find_map(|r| match &r.event {
                BattleEvent::HookFailed { source, error } => Some((source.clone(), error.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(failure.0, "ability:explodes");
        assert!(failure.1.contains("boom"), "unexpected error: {}", failure.1);
        assert_eq!(
            count_events(&log, |event| matches!(event, BattleEvent::MoveUsed { .. })),
            2
        );
        assert_eq!(state.hp("o1"), 184);
        assert_eq!(state.turn_number, 2);
    }

    #[test]
    fn test_weather_passive_applies_and_reverts_once() {
        let engine = test_engine();
        let mut state = create_test_battle(
            &engine,
            vec![TestCombatantBuilder::custom("p1", flat_stats(200, 50))
                .with_moves(&["Growl"])
                .with_ability("Swift Swim")],
            vec![TestCombatantBuilder::custom("o1", flat_stats(200, 80)).with_moves(&["Growl"])],
        );
        state.battlefield.weather = Some(FieldSlot {
            id: WeatherId::Rain,
            turns_remaining: 1,
        });
        let actions = vec![
            CommittedAction::use_move("p1", "Growl"),
            CommittedAction::use_move("o1", "Growl"),
        ];

        let (state, log) = engine.resolve_turn_with_rng(state, &actions, predictable_rng());

        assert_eq!(
            count_events(&log, |event| matches!(event, BattleEvent::PassiveApplied { .. })),
            1
        );
        assert_eq!(
            count_events(&log, |event| *event
                == BattleEvent::PassiveReverted {
                    target: "p1".into(),
                    source: "ability:swiftswim".into(),
                    stat: StatType::Speed,
                }),
            1
        );
        assert!(has_event(&log, |event| *event
            == BattleEvent::WeatherEnded {
                weather: WeatherId::Rain
            }));
        assert!(state.combatant("p1").unwrap().applied_passives.is_empty());
    }

    #[test]
    fn test_rough_skin_punishes_contact() {
        let engine = test_engine();
        let state = create_test_battle(
            &engine,
            vec![TestCombatantBuilder::custom("p1", flat_stats(200, 120))],
            vec![TestCombatantBuilder::custom("o1", flat_stats(200, 80))
                .with_moves(&["Growl"])
                .with_ability("Rough Skin")],
        );
        let actions = vec![
            CommittedAction::use_move("p1", "Tackle"),
            CommittedAction::use_move("o1", "Growl"),
        ];

        let (state, log) = engine.resolve_turn_with_rng(state, &actions, predictable_rng());

        let recoil = log
            .iter()
            .find(|r| {
                matches!(&r.event, BattleEvent::DamageDealt { target, .. } if target == "p1")
            })
            .unwrap();
        assert!(recoil.synergy_triggered);
        assert_eq!(
            recoil.event,
            BattleEvent::DamageDealt {
                target: "p1".into(),
                damage: 25,
                remaining_hp: 175,
            }
        );
        assert_eq!(state.hp("p1"), 175);
    }

    #[test]
    fn test_moxie_raises_attack_on_knockout() {
        let engine = test_engine();
        let state = create_test_battle(
            &engine,
            vec![TestCombatantBuilder::custom("p1", flat_stats(200, 120)).with_ability("moxie")],
            vec![
                TestCombatantBuilder::custom("o1", flat_stats(200, 80)).with_hp(1),
                TestCombatantBuilder::custom("o2", flat_stats(200, 80)),
            ],
        );
        let actions = vec![
            CommittedAction::use_move("p1", "Tackle"),
            CommittedAction::use_move("o1", "Tackle"),
        ];

        let (state, log) = engine.resolve_turn_with_rng(state, &actions, predictable_rng());

        assert_eq!(state.combatant("p1").unwrap().get_stat_stage(StatType::Attack), 1);
        let raised = log
            .iter()
            .find(|r| matches!(r.event, BattleEvent::StatStageChanged { .. }))
            .unwrap();
        assert!(raised.synergy_triggered);
        assert_eq!(state.hp("p1"), 200);
    }

    #[test]
    fn test_bloodlust_heals_on_knockout() {
        let engine = test_engine();
        let state = create_test_battle(
            &engine,
            vec![TestCombatantBuilder::custom("p1", flat_stats(200, 120))
                .with_hp(100)
                .with_talent("bloodlust", TalentGrade::Rare)],
            vec![
                TestCombatantBuilder::custom("o1", flat_stats(200, 80)).with_hp(1),
                TestCombatantBuilder::custom("o2", flat_stats(200, 80)),
            ],
        );
        let actions = vec![
            CommittedAction::use_move("p1", "Tackle"),
            CommittedAction::use_move("o1", "Tackle"),
        ];

        let (state, log) = engine.resolve_turn_with_rng(state, &actions, predictable_rng());

        // 15% of 200
        assert!(has_event(&log, |event| *event
            == BattleEvent::Healed {
                target: "p1".into(),
                amount: 30,
                new_hp: 130,
            }));
        assert_eq!(state.hp("p1"), 130);
        assert_eq!(state.side(SideId::Opponent).active, vec!["o2"]);
    }

    #[test]
    fn test_thorns_returns_part_of_the_damage() {
        let engine = test_engine();
        let state = create_test_battle(
            &engine,
            vec![TestCombatantBuilder::custom("p1", flat_stats(200, 120))],
            vec![TestCombatantBuilder::custom("o1", flat_stats(200, 80))
                .with_moves(&["Growl"])
                .with_talent("thorns", TalentGrade::Epic)],
        );
        let actions = vec![
            CommittedAction::use_move("p1", "Tackle"),
            CommittedAction::use_move("o1", "Growl"),
        ];

        let (state, _) = engine.resolve_turn_with_rng(state, &actions, predictable_rng());

        // 20% of the 16 dealt
        assert_eq!(state.hp("o1"), 184);
        assert_eq!(state.hp("p1"), 197);
    }

    #[test]
    fn test_shadowstep_evasion_makes_attacks_miss() {
        let engine = test_engine();
        let state = create_test_battle(
            &engine,
            vec![TestCombatantBuilder::custom("p1", flat_stats(200, 120))
                .with_talent("shadowstep", TalentGrade::Diamond)],
            vec![TestCombatantBuilder::custom("o1", flat_stats(200, 80))],
        );
        let actions = vec![
            CommittedAction::use_move("p1", "Tackle"),
            CommittedAction::use_move("o1", "Tackle"),
        ];

        // 100 accuracy minus 20 evasion loses to a roll of 90
        let rng = TurnRng::new_for_test(vec![90]);
        let (state, log) = engine.resolve_turn_with_rng(state, &actions, rng);

        assert!(has_event(&log, |event| *event
            == BattleEvent::MoveMissed {
                user: "o1".into(),
                target: "p1".into(),
            }));
        assert_eq!(state.hp("p1"), 200);
        // Evasion only lasts for the turn
        assert_eq!(state.combatant("p1").unwrap().transient.evasion_bonus, 0);
    }

    #[test]
    fn test_snare_traps_the_target() {
        let engine = test_engine();
        let mut state = create_test_battle(
            &engine,
            vec![TestCombatantBuilder::custom("p1", flat_stats(200, 120))
                .with_talent("snare", TalentGrade::Diamond)],
            vec![
                TestCombatantBuilder::custom("o1", flat_stats(200, 80)).with_moves(&["Growl"]),
                TestCombatantBuilder::custom("o2", flat_stats(200, 80)),
            ],
        );

        let (next, _) = engine.resolve_turn_with_rng(
            state,
            &[
                CommittedAction::use_move("p1", "Tackle"),
                CommittedAction::use_move("o1", "Growl"),
            ],
            predictable_rng(),
        );
        state = next;

        let (state, log) = engine.resolve_turn_with_rng(
            state,
            &[
                CommittedAction::use_move("p1", "Tackle"),
                CommittedAction::switch("o1", "o2"),
            ],
            predictable_rng(),
        );

        assert!(has_event(&log, |event| *event
            == BattleEvent::ActionPrevented {
                actor: "o1".into(),
                reason: PreventionReason::Trapped,
            }));
        assert_eq!(
            state.side(SideId::Opponent).active,
            vec!["o1"]
        );
    }

    #[test]
    fn test_countersprint_answers_a_speed_drop() {
        let engine = test_engine();
        let state = create_test_battle(
            &engine,
            vec![TestCombatantBuilder::custom("p1", flat_stats(200, 120))
                .with_moves(&["Icy Wind"])
                .with_talent("countersprint", TalentGrade::Diamond)],
            vec![TestCombatantBuilder::custom("o1", flat_stats(200, 80)).with_moves(&["Growl"])],
        );
        let actions = vec![
            CommittedAction::use_move("p1", "Icy Wind"),
            CommittedAction::use_move("o1", "Growl"),
        ];

        let (state, log) = engine.resolve_turn_with_rng(state, &actions, predictable_rng());

        assert_eq!(state.combatant("o1").unwrap().get_stat_stage(StatType::Speed), -1);
        assert_eq!(state.combatant("p1").unwrap().get_stat_stage(StatType::Speed), 2);
        let answered = log
            .iter()
            .find(|r| {
                matches!(
                    &r.event,
                    BattleEvent::StatStageChanged { target, stat: StatType::Speed, .. }
                        if target == "p1"
                )
            })
            .unwrap();
        assert!(answered.synergy_triggered);
    }

    #[rstest]
    #[case(TalentGrade::Basic, false)]
    #[case(TalentGrade::Rare, false)]
    #[case(TalentGrade::Epic, true)]
    #[case(TalentGrade::Diamond, true)]
    fn test_iron_will_chance_scales_with_grade(#[case] grade: TalentGrade, #[case] survives: bool) {
        let engine = test_engine();
        let state = create_test_battle(
            &engine,
            vec![TestCombatantBuilder::custom("p1", flat_stats(200, 120))
                .with_hp(0)
                .with_talent("ironwill", grade)],
            vec![TestCombatantBuilder::custom("o1", flat_stats(200, 80))],
        );

        // Roll of 25 against 10/20/30/50
        let mut rng = TurnRng::new_for_test(vec![25]);
        let outputs =
            engine
                .effects()
                .dispatch(HookPoint::FatalHit, &state, "p1", HookArgs::default(), &mut rng);

        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].source, "talent:ironwill");
        let commands = outputs[0].result.clone().unwrap();
        assert_eq!(!commands.is_empty(), survives);
    }

    #[test]
    fn test_level_up_applies_talent_growth() {
        let engine = test_engine();
        let mut combatant: Combatant = TestCombatantBuilder::custom("p1", flat_stats(200, 100))
            .with_talent("scholar", TalentGrade::Epic)
            .build();

        let report = engine.effects().level_up(&mut combatant);

        assert_eq!(report.new_level, 51);
        assert_eq!(combatant.level, 51);
        assert_eq!(
            report.growth,
            vec![
                ("talent:scholar".to_string(), StatType::SpecialAttack, 3),
                ("talent:scholar".to_string(), StatType::SpecialDefense, 3),
            ]
        );
        assert_eq!(combatant.stats.sp_attack, 103);
        assert_eq!(combatant.stats.sp_defense, 103);
        assert_eq!(combatant.stats.attack, 100);
    }

    #[test]
    fn test_unregistered_talent_is_ignored() {
        let engine = test_engine();
        let mut combatant = TestCombatantBuilder::custom("p1", flat_stats(200, 100))
            .with_talent("not a talent", TalentGrade::Diamond)
            .build();

        let report = engine.effects().level_up(&mut combatant);

        assert!(report.growth.is_empty());
        assert_eq!(combatant.stats, flat_stats(200, 100));
    }
}
