//! Async boundary around the synchronous engine: waits for both sides to
//! commit, resolves the turn, and persists the outcome once the battle ends.
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info};

use crate::battle::action_stack::{Choice, CommittedAction};
use crate::battle::engine::{is_battle_over, BattleEngine};
use crate::battle::state::{BattleState, CombatantId, Outcome, SideId, TurnLog, TurnRng};
use crate::errors::SessionError;

/// Running totals across the battles of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub battles_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_streak: u32,
    pub best_streak: u32,
}

impl SessionContext {
    pub fn record(&mut self, outcome: Outcome) {
        self.battles_played += 1;
        match outcome {
            Outcome::Victory | Outcome::Forfeit(SideId::Opponent) => {
                self.wins += 1;
                self.win_streak += 1;
                self.best_streak = self.best_streak.max(self.win_streak);
            }
            Outcome::Defeat | Outcome::Forfeit(SideId::Player) => {
                self.losses += 1;
                self.win_streak = 0;
            }
            Outcome::Draw => self.win_streak = 0,
            // Running away neither breaks nor extends a streak
            Outcome::Escaped => {}
        }
    }
}

/// What gets persisted once a battle is over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRecord {
    pub battle_id: String,
    pub outcome: Outcome,
    pub turns: u32,
    /// Player combatants still standing.
    pub survivors: Vec<CombatantId>,
    pub drops: Vec<String>,
    pub log: TurnLog,
}

pub trait OutcomeSink {
    fn persist(&mut self, record: &BattleRecord) -> Result<(), SessionError>;
}

impl OutcomeSink for Vec<BattleRecord> {
    fn persist(&mut self, record: &BattleRecord) -> Result<(), SessionError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Writes one JSON document per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutcomeSink for JsonLinesSink<W> {
    fn persist(&mut self, record: &BattleRecord) -> Result<(), SessionError> {
        serde_json::to_writer(&mut self.writer, record)
            .map_err(|e| SessionError::Persist(e.to_string()))?;
        writeln!(self.writer).map_err(|e| SessionError::Persist(e.to_string()))
    }
}

pub struct BattleSession {
    engine: Arc<BattleEngine>,
    state: BattleState,
    context: SessionContext,
    recorded: bool,
    persisted: bool,
}

impl BattleSession {
    pub fn new(engine: Arc<BattleEngine>, state: BattleState, context: SessionContext) -> Self {
        Self {
            engine,
            state,
            context,
            recorded: false,
            persisted: false,
        }
    }

    pub fn state(&self) -> &BattleState {
        &self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn into_context(self) -> SessionContext {
        self.context
    }

    pub fn is_over(&self) -> bool {
        self.state.is_terminal()
    }

    /// Waits until every living active combatant has a committed action, or
    /// its side has forfeited. The state is not touched, so a timeout leaves
    /// the battle exactly where it was.
    pub async fn collect_actions(
        &self,
        receiver: &mut Receiver<CommittedAction>,
    ) -> Result<Vec<CommittedAction>, SessionError> {
        let timeout_ms = self.engine.config().action_timeout_ms;
        let state = &self.state;

        let gather = async {
            let mut actions = Vec::new();
            while !all_committed(state, &actions) {
                match receiver.recv().await {
                    Some(action) => {
                        debug!(actor = %action.combatant_id, "action committed");
                        actions.push(action);
                    }
                    None => return Err(SessionError::ChannelClosed),
                }
            }
            Ok(actions)
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), gather).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::InputTimeout(timeout_ms)),
        }
    }

    /// Resolves one turn from already collected actions.
    pub fn submit_turn(&mut self, committed: &[CommittedAction]) -> Result<TurnLog, SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::BattleOver(self.state.battle_id.clone()));
        }

        let state = std::mem::take(&mut self.state);
        let (state, log) = self.engine.resolve_turn(state, committed);
        self.state = state;

        if self.state.is_terminal() && !self.recorded {
            if let Some(outcome) = self.state.outcome {
                self.context.record(outcome);
                self.recorded = true;
                info!(battle_id = %self.state.battle_id, %outcome, "battle finished");
            }
        }
        Ok(log)
    }

    pub async fn play_turn(
        &mut self,
        receiver: &mut Receiver<CommittedAction>,
    ) -> Result<TurnLog, SessionError> {
        let actions = self.collect_actions(receiver).await?;
        self.submit_turn(&actions)
    }

    /// Persists the finished battle. Only the first call writes anything;
    /// later calls return `Ok(None)`.
    pub fn finish(
        &mut self,
        sink: &mut dyn OutcomeSink,
    ) -> Result<Option<BattleRecord>, SessionError> {
        let Some(outcome) = is_battle_over(&self.state).filter(|_| self.state.is_terminal()) else {
            return Err(SessionError::Persist(format!(
                "battle {} is still in progress",
                self.state.battle_id
            )));
        };
        if self.persisted {
            return Ok(None);
        }

        let record = BattleRecord {
            battle_id: self.state.battle_id.clone(),
            outcome,
            turns: self.state.turn_number,
            survivors: self
                .state
                .side(SideId::Player)
                .members()
                .filter(|id| self.state.is_alive(id))
                .cloned()
                .collect(),
            drops: self.roll_drops(outcome),
            log: self.state.battle_log.clone(),
        };
        sink.persist(&record)?;
        self.persisted = true;
        Ok(Some(record))
    }

    /// Items dropped by defeated opponents. Rolls are seeded per combatant so
    /// the same battle always drops the same items.
    fn roll_drops(&self, outcome: Outcome) -> Vec<String> {
        if outcome != Outcome::Victory {
            return Vec::new();
        }
        let species = self.engine.moves().species();
        let mut drops = Vec::new();
        for id in &self.state.side(SideId::Opponent).fainted {
            let Some(data) = self
                .state
                .combatant(id)
                .and_then(|combatant| species.get(&combatant.species))
            else {
                continue;
            };
            let mut rng = TurnRng::new_for_seed(&format!("{}:drops:{}", self.state.battle_id, id));
            for entry in &data.drop_table {
                if rng.next_outcome("item drop") <= entry.chance {
                    drops.push(entry.item.clone());
                }
            }
        }
        drops
    }
}

/// True once every side has either forfeited or committed an action for
/// each of its living active combatants.
fn all_committed(state: &BattleState, actions: &[CommittedAction]) -> bool {
    SideId::ALL.into_iter().all(|side| {
        let active = state.living_active(side);
        let forfeited = actions.iter().any(|action| {
            action.choice == Choice::Forfeit && active.contains(&action.combatant_id)
        });
        forfeited
            || active
                .iter()
                .all(|id| actions.iter().any(|action| &action.combatant_id == id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_streak_bookkeeping() {
        let mut context = SessionContext::default();
        context.record(Outcome::Victory);
        context.record(Outcome::Forfeit(SideId::Opponent));
        context.record(Outcome::Escaped);
        assert_eq!(context.win_streak, 2);
        context.record(Outcome::Defeat);
        assert_eq!(
            context,
            SessionContext {
                battles_played: 4,
                wins: 2,
                losses: 1,
                win_streak: 0,
                best_streak: 2,
            }
        );
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_record() {
        let record = BattleRecord {
            battle_id: "b".into(),
            outcome: Outcome::Draw,
            turns: 3,
            survivors: Vec::new(),
            drops: vec!["Potion".into()],
            log: Vec::new(),
        };
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.persist(&record).unwrap();
        sink.persist(&record).unwrap();

        let written = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: BattleRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, record);
    }
}
