use schema::{ElementType, TalentGrade};

use crate::battle::engine::BattleEngine;
use crate::battle::state::{BattleEvent, BattleState, TurnLog, TurnRng};
use crate::combatant::{Combatant, MoveSlot, StatusCondition, Stats};
use crate::config::BattleConfig;

/// Engine over the embedded data with default rules.
pub fn test_engine() -> BattleEngine {
    test_engine_with(BattleConfig::default())
}

pub fn test_engine_with(config: BattleConfig) -> BattleEngine {
    match BattleEngine::with_builtin_data(config) {
        Ok(engine) => engine,
        Err(err) => panic!("Failed to load built-in battle data: {}", err),
    }
}

/// 100 in every stat except hp and speed.
pub fn flat_stats(hp: u16, speed: u16) -> Stats {
    Stats {
        hp,
        attack: 100,
        defense: 100,
        sp_attack: 100,
        sp_defense: 100,
        speed,
    }
}

/// A builder for creating test combatants with common defaults.
///
/// # Example
/// ```ignore
/// let pikachu = TestCombatantBuilder::new("p1", "Pikachu", 25)
///     .with_moves(&["Tackle"])
///     .with_status(StatusCondition::infinite(StatusId::Paralysis))
///     .build();
/// ```
pub struct TestCombatantBuilder {
    id: String,
    species: Option<String>,
    level: u8,
    stats: Stats,
    types: Option<Vec<ElementType>>,
    moves: Option<Vec<(String, Option<u8>)>>,
    status: Option<StatusCondition>,
    current_hp: Option<u16>,
    ability: Option<String>,
    talents: Vec<(String, TalentGrade)>,
}

impl TestCombatantBuilder {
    /// Combatant of a registered species at `level`.
    pub fn new(id: &str, species: &str, level: u8) -> Self {
        Self {
            id: id.to_string(),
            species: Some(species.to_string()),
            level,
            stats: flat_stats(100, 100),
            types: None,
            moves: None,
            status: None,
            current_hp: None,
            ability: None,
            talents: Vec::new(),
        }
    }

    /// Untyped level 50 combatant with explicit stats and Tackle.
    pub fn custom(id: &str, stats: Stats) -> Self {
        Self {
            id: id.to_string(),
            species: None,
            level: 50,
            stats,
            types: Some(Vec::new()),
            moves: Some(vec![("Tackle".to_string(), None)]),
            status: None,
            current_hp: None,
            ability: None,
            talents: Vec::new(),
        }
    }

    /// Replaces the known moves, each at full PP.
    pub fn with_moves(mut self, moves: &[&str]) -> Self {
        self.moves = Some(moves.iter().map(|name| (name.to_string(), None)).collect());
        self
    }

    /// Sets the remaining PP of one known move, adding it if missing.
    pub fn with_move_pp(mut self, name: &str, pp: u8) -> Self {
        let moves = self.moves.get_or_insert_with(Vec::new);
        match moves.iter_mut().find(|(known, _)| known == name) {
            Some(entry) => entry.1 = Some(pp),
            None => moves.push((name.to_string(), Some(pp))),
        }
        self
    }

    pub fn with_types(mut self, types: &[ElementType]) -> Self {
        self.types = Some(types.to_vec());
        self
    }

    pub fn with_status(mut self, status: StatusCondition) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the starting hp. If not set, hp will be max.
    pub fn with_hp(mut self, hp: u16) -> Self {
        self.current_hp = Some(hp);
        self
    }

    pub fn with_ability(mut self, ability: &str) -> Self {
        self.ability = Some(ability.to_string());
        self
    }

    pub fn with_talent(mut self, talent: &str, grade: TalentGrade) -> Self {
        self.talents.push((talent.to_string(), grade));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn current_hp(&self) -> Option<u16> {
        self.current_hp
    }

    /// Builds the `Combatant`. Hp overrides are applied by `create_test_battle`.
    pub fn build(self) -> Combatant {
        let engine = test_engine();
        let resolver = engine.moves();

        let mut combatant = match &self.species {
            Some(name) => match resolver.species().get(name) {
                Some(data) => Combatant::from_species(self.id.clone(), data, self.level, resolver),
                None => panic!("Unknown species in test: {}", name),
            },
            None => Combatant::new(self.id.clone(), "Dummy", self.level, self.stats),
        };

        if let Some(types) = self.types {
            combatant.types = types;
        }
        if let Some(moves) = self.moves {
            combatant.moves = moves
                .into_iter()
                .map(|(name, pp)| {
                    let descriptor = resolver.resolve(&name, Some(&combatant));
                    MoveSlot {
                        name: descriptor.name,
                        pp: pp.unwrap_or(descriptor.pp),
                    }
                })
                .collect();
        }
        combatant.status = self.status;
        if let Some(ability) = self.ability {
            combatant = combatant.with_ability(ability);
        }
        for (talent, grade) in self.talents {
            combatant = combatant.with_talent(talent, grade);
        }
        combatant
    }
}

/// Battle between two teams; the first member of each starts on the field.
pub fn create_test_battle(
    engine: &BattleEngine,
    player_team: Vec<TestCombatantBuilder>,
    opponent_team: Vec<TestCombatantBuilder>,
) -> BattleState {
    let hp_overrides: Vec<(String, u16)> = player_team
        .iter()
        .chain(&opponent_team)
        .filter_map(|builder| builder.current_hp().map(|hp| (builder.id().to_string(), hp)))
        .collect();

    let player_team = player_team.into_iter().map(TestCombatantBuilder::build).collect();
    let opponent_team = opponent_team.into_iter().map(TestCombatantBuilder::build).collect();
    let mut state = engine.new_battle("test_battle", player_team, opponent_team, false);
    for (id, hp) in hp_overrides {
        state.set_hp(&id, hp);
    }
    state
}

/// Creates a `TurnRng` instance with a long list of default values (50).
/// With the default rules a 50 never crits, never triggers a secondary
/// effect and rolls 86% damage variance.
pub fn predictable_rng() -> TurnRng {
    TurnRng::new_for_test(vec![50; 100])
}

pub fn events(log: &TurnLog) -> Vec<&BattleEvent> {
    log.iter().map(|record| &record.event).collect()
}

pub fn count_events(log: &TurnLog, predicate: impl Fn(&BattleEvent) -> bool) -> usize {
    log.iter().filter(|record| predicate(&record.event)).count()
}

pub fn has_event(log: &TurnLog, predicate: impl Fn(&BattleEvent) -> bool) -> bool {
    count_events(log, predicate) > 0
}
