use crate::{ElementType, HazardId, ScreenId, StatType, StatusId, TerrainId, WeatherId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveCategory {
    Physical,
    Special,
    Status,
}

/// Who a move is aimed at when it is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TargetScope {
    #[default]
    SingleOpponent,
    AllOpponents,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectTarget {
    User,
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatChange {
    pub target: EffectTarget,
    pub stat: StatType,
    pub stages: i8,
}

/// The registered effect a move carries beyond its damage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MoveEffect {
    #[default]
    None,
    InflictStatus {
        status: StatusId,
        chance: u8,
    },
    Flinch(u8),        // chance %
    Drain(u8),         // % of damage healed
    Recoil(u8),        // % of damage dealt
    Heal(u8),          // % of max hp
    SetWeather(WeatherId),
    SetTerrain(TerrainId),
    SetHazard(HazardId),
    RaiseScreen(ScreenId),
    ClearHazards,
}

impl MoveEffect {
    /// Effects that resolve once per use instead of once per target hit.
    pub fn applies_once(&self) -> bool {
        matches!(
            self,
            MoveEffect::SetWeather(_)
                | MoveEffect::SetTerrain(_)
                | MoveEffect::SetHazard(_)
                | MoveEffect::RaiseScreen(_)
                | MoveEffect::ClearHazards
                | MoveEffect::Heal(_)
        )
    }
}

/// A fully resolved move, immutable for the rest of the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveDescriptor {
    pub name: String,
    pub element: ElementType,
    pub category: MoveCategory,
    pub power: u16,
    pub accuracy: u8,
    #[serde(default)]
    pub priority: i8,
    pub pp: u8,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub target: TargetScope,
    #[serde(default)]
    pub effect: MoveEffect,
    #[serde(default)]
    pub stat_changes: Vec<StatChange>,
}

impl MoveDescriptor {
    /// Neutral stand-in used when a move is known nowhere.
    pub fn stub(name: &str) -> Self {
        Self {
            name: name.to_string(),
            element: ElementType::Unknown,
            category: MoveCategory::Status,
            power: 0,
            accuracy: 100,
            priority: 0,
            pp: 35,
            tags: Vec::new(),
            target: TargetScope::SingleOpponent,
            effect: MoveEffect::None,
            stat_changes: Vec::new(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn makes_contact(&self) -> bool {
        self.has_tag("contact")
    }

    pub fn deals_damage(&self) -> bool {
        self.category != MoveCategory::Status && self.power > 0
    }
}

/// A species-specific move entry that may override any registry field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PartialMoveDescriptor {
    #[serde(default)]
    pub element: Option<ElementType>,
    #[serde(default)]
    pub category: Option<MoveCategory>,
    #[serde(default)]
    pub power: Option<u16>,
    #[serde(default)]
    pub accuracy: Option<u8>,
    #[serde(default)]
    pub priority: Option<i8>,
    #[serde(default)]
    pub pp: Option<u8>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub target: Option<TargetScope>,
    #[serde(default)]
    pub effect: Option<MoveEffect>,
    #[serde(default)]
    pub stat_changes: Option<Vec<StatChange>>,
}

impl PartialMoveDescriptor {
    /// Fills every unset field from `base`. The result keeps `name`.
    pub fn merge_over(&self, name: &str, base: &MoveDescriptor) -> MoveDescriptor {
        MoveDescriptor {
            name: name.to_string(),
            element: self.element.unwrap_or(base.element),
            category: self.category.unwrap_or(base.category),
            power: self.power.unwrap_or(base.power),
            accuracy: self.accuracy.unwrap_or(base.accuracy),
            priority: self.priority.unwrap_or(base.priority),
            pp: self.pp.unwrap_or(base.pp),
            tags: self.tags.clone().unwrap_or_else(|| base.tags.clone()),
            target: self.target.unwrap_or(base.target),
            effect: self.effect.clone().unwrap_or_else(|| base.effect.clone()),
            stat_changes: self
                .stat_changes
                .clone()
                .unwrap_or_else(|| base.stat_changes.clone()),
        }
    }
}
