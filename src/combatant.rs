use std::collections::BTreeMap;

use schema::{BaseStats, ElementType, SpeciesData, StatType, StatusId, TalentGrade};
use serde::{Deserialize, Serialize};

use crate::battle::state::CombatantId;
use crate::move_data::MoveResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub hp: u16, // max hp
    pub attack: u16,
    pub defense: u16,
    pub sp_attack: u16,
    pub sp_defense: u16,
    pub speed: u16,
}

impl Stats {
    /// Level-scaled stats with no individual variance.
    pub fn from_base(base: &BaseStats, level: u8) -> Self {
        let level = level as u32;
        let scale = |base: u8| ((2 * base as u32 * level) / 100 + 5) as u16;
        Self {
            hp: ((2 * base.hp as u32 * level) / 100 + level + 10) as u16,
            attack: scale(base.attack),
            defense: scale(base.defense),
            sp_attack: scale(base.sp_attack),
            sp_defense: scale(base.sp_defense),
            speed: scale(base.speed),
        }
    }

    pub fn get(&self, stat: StatType) -> u16 {
        match stat {
            StatType::Attack => self.attack,
            StatType::Defense => self.defense,
            StatType::SpecialAttack => self.sp_attack,
            StatType::SpecialDefense => self.sp_defense,
            StatType::Speed => self.speed,
            // Accuracy and evasion have no base value, only stages
            StatType::Accuracy | StatType::Evasion => 100,
        }
    }

    pub fn grow(&mut self, stat: StatType, amount: u16) {
        let slot = match stat {
            StatType::Attack => &mut self.attack,
            StatType::Defense => &mut self.defense,
            StatType::SpecialAttack => &mut self.sp_attack,
            StatType::SpecialDefense => &mut self.sp_defense,
            StatType::Speed => &mut self.speed,
            StatType::Accuracy | StatType::Evasion => return,
        };
        *slot = slot.saturating_add(amount);
    }
}

/// A major status and its remaining duration. `None` never expires on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCondition {
    pub id: StatusId,
    pub turns_remaining: Option<u8>,
}

impl StatusCondition {
    pub fn new(id: StatusId, turns_remaining: Option<u8>) -> Self {
        Self { id, turns_remaining }
    }

    pub fn infinite(id: StatusId) -> Self {
        Self::new(id, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VolatileKind {
    Trapped,
    Flinched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolatileEffect {
    pub kind: VolatileKind,
    pub turns_remaining: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Talent {
    pub id: String,
    pub grade: TalentGrade,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSlot {
    pub name: String,
    pub pp: u8,
}

/// Modifiers gathered from hooks during a turn and dropped at its end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TransientModifiers {
    /// Percentage points subtracted from incoming move accuracy.
    pub evasion_bonus: u8,
    /// Summed power bonuses; 0.25 means +25%.
    pub power_bonus: f64,
    pub skip_action: bool,
}

impl TransientModifiers {
    pub fn power_multiplier(&self) -> f64 {
        1.0 + self.power_bonus
    }
}

/// One entry of a condition-gated passive (e.g. speed doubled in rain).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassiveBonus {
    pub stat: StatType,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    pub species: String,
    pub level: u8,
    pub stats: Stats,
    pub stat_stages: BTreeMap<StatType, i8>,
    pub types: Vec<ElementType>,
    pub status: Option<StatusCondition>,
    pub volatiles: Vec<VolatileEffect>,
    pub ability: Option<String>,
    pub talents: Vec<Talent>,
    pub held_item: Option<String>,
    pub moves: Vec<MoveSlot>,
    pub status_immunities: Vec<StatusId>,
    pub transient: TransientModifiers,
    /// Passive bonuses currently in force, keyed by the hook that applied them.
    pub applied_passives: BTreeMap<String, PassiveBonus>,
}

impl Combatant {
    pub fn new(
        id: impl Into<CombatantId>,
        species: impl Into<String>,
        level: u8,
        stats: Stats,
    ) -> Self {
        Self {
            id: id.into(),
            species: species.into(),
            level,
            stats,
            stat_stages: BTreeMap::new(),
            types: Vec::new(),
            status: None,
            volatiles: Vec::new(),
            ability: None,
            talents: Vec::new(),
            held_item: None,
            moves: Vec::new(),
            status_immunities: Vec::new(),
            transient: TransientModifiers::default(),
            applied_passives: BTreeMap::new(),
        }
    }

    /// Builds a combatant from species data, knowing the latest four moves it
    /// has learned by `level`.
    pub fn from_species(
        id: impl Into<CombatantId>,
        species: &SpeciesData,
        level: u8,
        resolver: &MoveResolver,
    ) -> Self {
        let stats = Stats::from_base(&species.base_stats, level);
        let mut combatant = Self::new(id, species.name.clone(), level, stats);
        combatant.types = species.types.clone();

        let known: Vec<String> = species
            .moves_at_level(level)
            .into_iter()
            .map(|entry| entry.name.clone())
            .collect();
        for name in known {
            let descriptor = resolver.resolve(&name, Some(&combatant));
            combatant.moves.push(MoveSlot {
                name: descriptor.name,
                pp: descriptor.pp,
            });
        }
        combatant
    }

    pub fn with_ability(mut self, ability: impl Into<String>) -> Self {
        self.ability = Some(ability.into());
        self
    }

    pub fn with_talent(mut self, id: impl Into<String>, grade: TalentGrade) -> Self {
        self.talents.push(Talent { id: id.into(), grade });
        self
    }

    pub fn with_held_item(mut self, item: impl Into<String>) -> Self {
        self.held_item = Some(item.into());
        self
    }

    pub fn max_hp(&self) -> u16 {
        self.stats.hp
    }

    pub fn has_type(&self, element: ElementType) -> bool {
        self.types.contains(&element)
    }

    /// Anything without the Flying type touches the ground.
    pub fn is_grounded(&self) -> bool {
        !self.has_type(ElementType::Flying)
    }

    pub fn get_stat_stage(&self, stat: StatType) -> i8 {
        self.stat_stages.get(&stat).copied().unwrap_or(0)
    }

    pub fn set_stat_stage(&mut self, stat: StatType, stage: i8) {
        let stage = stage.clamp(-6, 6);
        if stage == 0 {
            self.stat_stages.remove(&stat);
        } else {
            self.stat_stages.insert(stat, stage);
        }
    }

    pub fn has_volatile(&self, kind: VolatileKind) -> bool {
        self.volatiles.iter().any(|effect| effect.kind == kind)
    }

    /// Adds a volatile effect, or extends an existing one to the longer duration.
    pub fn add_volatile(&mut self, kind: VolatileKind, turns: u8) {
        match self.volatiles.iter_mut().find(|effect| effect.kind == kind) {
            Some(existing) => existing.turns_remaining = existing.turns_remaining.max(turns),
            None => self.volatiles.push(VolatileEffect {
                kind,
                turns_remaining: turns,
            }),
        }
    }

    /// Counts every volatile down one turn and returns the kinds that ran out.
    pub fn tick_volatiles(&mut self) -> Vec<VolatileKind> {
        let mut expired = Vec::new();
        self.volatiles.retain_mut(|effect| {
            effect.turns_remaining = effect.turns_remaining.saturating_sub(1);
            if effect.turns_remaining == 0 {
                expired.push(effect.kind);
                false
            } else {
                true
            }
        });
        expired
    }

    /// Passive multiplier currently applied to `stat`.
    pub fn passive_multiplier(&self, stat: StatType) -> f64 {
        self.applied_passives
            .values()
            .filter(|bonus| bonus.stat == stat)
            .map(|bonus| bonus.multiplier)
            .product()
    }

    pub fn move_slot_mut(&mut self, name: &str) -> Option<&mut MoveSlot> {
        let key = crate::move_data::normalize_id(name);
        self.moves
            .iter_mut()
            .find(|slot| crate::move_data::normalize_id(&slot.name) == key)
    }

    /// Drops everything that only lasts while on the field.
    pub fn clear_battle_modifiers(&mut self) {
        self.stat_stages.clear();
        self.volatiles.clear();
        self.transient = TransientModifiers::default();
        self.applied_passives.clear();
    }
}
