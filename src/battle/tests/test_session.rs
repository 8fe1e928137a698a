#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::battle::action_stack::CommittedAction;
    use crate::battle::engine::BattleEngine;
    use crate::battle::session::{BattleRecord, BattleSession, JsonLinesSink, SessionContext};
    use crate::battle::state::{BattleState, Outcome};
    use crate::battle::tests::common::{
        create_test_battle, flat_stats, test_engine, test_engine_with, TestCombatantBuilder,
    };
    use crate::config::BattleConfig;
    use crate::errors::SessionError;
    use pretty_assertions::assert_eq;

    fn one_on_one(engine: &BattleEngine, opponent_hp: u16) -> BattleState {
        create_test_battle(
            engine,
            vec![TestCombatantBuilder::custom("p1", flat_stats(200, 120))],
            vec![TestCombatantBuilder::custom("o1", flat_stats(200, 80)).with_hp(opponent_hp)],
        )
    }

    fn session_with(config: BattleConfig, opponent_hp: u16) -> BattleSession {
        let engine = test_engine_with(config);
        let state = one_on_one(&engine, opponent_hp);
        BattleSession::new(Arc::new(engine), state, SessionContext::default())
    }

    #[tokio::test]
    async fn test_collect_actions_waits_for_both_sides() {
        let session = session_with(BattleConfig::default(), 200);
        let (sender, mut receiver) = mpsc::channel(4);

        tokio::spawn(async move {
            sender
                .send(CommittedAction::use_move("o1", "Tackle"))
                .await
                .unwrap();
            sender
                .send(CommittedAction::use_move("p1", "Tackle"))
                .await
                .unwrap();
        });

        let actions = session.collect_actions(&mut receiver).await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].combatant_id, "o1");
        assert_eq!(actions[1].combatant_id, "p1");
    }

    #[tokio::test]
    async fn test_collect_actions_times_out() {
        let session = session_with(
            BattleConfig {
                action_timeout_ms: 20,
                ..BattleConfig::default()
            },
            200,
        );
        let (sender, mut receiver) = mpsc::channel(4);
        sender
            .send(CommittedAction::use_move("p1", "Tackle"))
            .await
            .unwrap();

        let result = session.collect_actions(&mut receiver).await;

        assert!(matches!(result, Err(SessionError::InputTimeout(20))));
        // Nothing was resolved while waiting
        assert_eq!(session.state().turn_number, 1);
        drop(sender);
    }

    #[tokio::test]
    async fn test_collect_actions_reports_closed_channel() {
        let session = session_with(BattleConfig::default(), 200);
        let (sender, mut receiver) = mpsc::channel(4);
        sender
            .send(CommittedAction::use_move("p1", "Tackle"))
            .await
            .unwrap();
        drop(sender);

        let result = session.collect_actions(&mut receiver).await;
        assert!(matches!(result, Err(SessionError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_victory_is_recorded_and_persisted_once() {
        let mut session = session_with(BattleConfig::default(), 1);
        let (sender, mut receiver) = mpsc::channel(4);
        sender
            .send(CommittedAction::use_move("p1", "Tackle"))
            .await
            .unwrap();
        sender
            .send(CommittedAction::use_move("o1", "Tackle"))
            .await
            .unwrap();

        session.play_turn(&mut receiver).await.unwrap();

        assert!(session.is_over());
        assert_eq!(session.context().wins, 1);
        assert_eq!(session.context().win_streak, 1);
        assert_eq!(session.context().battles_played, 1);

        let mut sink: Vec<BattleRecord> = Vec::new();
        let record = session.finish(&mut sink).unwrap().unwrap();
        assert_eq!(record.outcome, Outcome::Victory);
        assert_eq!(record.battle_id, "test_battle");
        assert_eq!(record.survivors, vec!["p1"]);
        assert_eq!(record.log, session.state().battle_log);

        assert_eq!(session.finish(&mut sink).unwrap(), None);
        assert_eq!(sink.len(), 1);

        let late = session.submit_turn(&[CommittedAction::use_move("p1", "Tackle")]);
        assert!(matches!(late, Err(SessionError::BattleOver(id)) if id == "test_battle"));
        // The win is only counted once
        assert_eq!(session.context().wins, 1);
    }

    #[test]
    fn test_finish_before_the_end_is_an_error() {
        let mut session = session_with(BattleConfig::default(), 200);
        let mut sink: Vec<BattleRecord> = Vec::new();

        let result = session.finish(&mut sink);

        assert!(matches!(result, Err(SessionError::Persist(_))));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_record() {
        let mut session = session_with(BattleConfig::default(), 1);
        session
            .submit_turn(&[
                CommittedAction::use_move("p1", "Tackle"),
                CommittedAction::use_move("o1", "Tackle"),
            ])
            .unwrap();

        let mut sink = JsonLinesSink::new(Vec::new());
        session.finish(&mut sink).unwrap();
        let written = String::from_utf8(sink.into_inner()).unwrap();

        assert_eq!(written.lines().count(), 1);
        let record: BattleRecord = serde_json::from_str(written.trim_end()).unwrap();
        assert_eq!(record.outcome, Outcome::Victory);
    }

    #[test]
    fn test_forfeit_counts_as_a_loss() {
        let engine = test_engine();
        let state = one_on_one(&engine, 200);
        let mut context = SessionContext {
            win_streak: 3,
            best_streak: 3,
            ..SessionContext::default()
        };
        context.record(Outcome::Escaped);
        assert_eq!(context.win_streak, 3);

        let mut session = BattleSession::new(Arc::new(engine), state, context);
        session.submit_turn(&[CommittedAction::forfeit("p1")]).unwrap();

        let context = session.into_context();
        assert_eq!(context.losses, 1);
        assert_eq!(context.win_streak, 0);
        assert_eq!(context.best_streak, 3);
        assert_eq!(context.battles_played, 2);
    }
}
