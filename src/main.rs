use std::sync::Arc;

use monster_battle_engine::battle::session::JsonLinesSink;
use monster_battle_engine::{
    BattleConfig, BattleEngine, BattleResult, BattleSession, Combatant, CommittedAction,
    SessionContext, SpeciesRegistry, TalentGrade,
};
use tokio::sync::mpsc;
use tracing::info;

const MAX_TURNS: u32 = 50;

fn build_team(
    engine: &BattleEngine,
    prefix: &str,
    roster: &[(&str, u8, Option<&str>)],
) -> BattleResult<Vec<Combatant>> {
    let species: &SpeciesRegistry = engine.moves().species();
    let mut team = Vec::new();
    for (index, (name, level, ability)) in roster.iter().enumerate() {
        let data = species.require(name)?;
        let id = format!("{}{}", prefix, index + 1);
        let mut combatant = Combatant::from_species(id, data, *level, engine.moves());
        if let Some(ability) = ability {
            combatant = combatant.with_ability(*ability);
        }
        if let Some(talent) = data.talent_pool.first() {
            combatant = combatant.with_talent(talent.clone(), TalentGrade::Rare);
        }
        team.push(combatant);
    }
    Ok(team)
}

/// Picks the first move with PP left for every living active combatant.
fn choose_actions(session: &BattleSession) -> Vec<CommittedAction> {
    let state = session.state();
    state
        .all_active()
        .into_iter()
        .filter(|id| state.is_alive(id))
        .filter_map(|id| {
            let combatant = state.combatant(&id)?;
            let slot = combatant
                .moves
                .iter()
                .find(|slot| slot.pp > 0)
                .or_else(|| combatant.moves.first())?;
            Some(CommittedAction::use_move(id.clone(), slot.name.clone()))
        })
        .collect()
}

#[tokio::main]
async fn main() -> BattleResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => BattleConfig::load(path)?,
        None => BattleConfig::default(),
    };
    let engine = Arc::new(BattleEngine::with_builtin_data(config)?);

    let player_team = build_team(
        &engine,
        "p",
        &[("Pikachu", 50, Some("static")), ("Lapras", 50, None), ("Golem", 50, Some("sturdy"))],
    )?;
    let opponent_team = build_team(
        &engine,
        "o",
        &[("Charizard", 50, None), ("Gengar", 50, None), ("Skarmory", 50, None)],
    )?;

    let state = engine.new_battle("demo", player_team, opponent_team, false);
    for record in &state.battle_log {
        if let Some(text) = &record.result {
            println!("{}", text);
        }
    }

    let mut session = BattleSession::new(Arc::clone(&engine), state, SessionContext::default());
    let (sender, mut receiver) = mpsc::channel(8);

    while !session.is_over() && session.state().turn_number <= MAX_TURNS {
        for action in choose_actions(&session) {
            let sender = sender.clone();
            tokio::spawn(async move {
                // A closed channel only means the battle stopped listening
                let _ = sender.send(action).await;
            });
        }

        let log = session.play_turn(&mut receiver).await?;
        for record in log {
            if let Some(text) = record.result {
                println!("{}", text);
            }
        }
    }

    if session.is_over() {
        let mut sink = JsonLinesSink::new(std::io::stdout());
        if let Some(record) = session.finish(&mut sink)? {
            info!(
                outcome = %record.outcome,
                turns = record.turns,
                drops = ?record.drops,
                "battle persisted"
            );
        }
    } else {
        info!(turns = MAX_TURNS, "demo stopped before the battle ended");
    }
    info!(context = ?session.context(), "session summary");
    Ok(())
}
