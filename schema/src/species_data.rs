use crate::{ElementType, PartialMoveDescriptor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    pub hp: u8,
    pub attack: u8,
    pub defense: u8,
    pub sp_attack: u8,
    pub sp_defense: u8,
    pub speed: u8,
}

/// One learnable move. `custom` replaces registry fields for this species only
/// (signature moves, species-tuned power, etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnsetEntry {
    pub name: String,
    #[serde(default)]
    pub level: u8,
    #[serde(default)]
    pub custom: Option<PartialMoveDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropEntry {
    pub item: String,
    pub chance: u8, // %
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesData {
    pub name: String,
    pub types: Vec<ElementType>,
    pub base_stats: BaseStats,
    #[serde(default)]
    pub learnset: Vec<LearnsetEntry>,
    #[serde(default)]
    pub talent_pool: Vec<String>,
    #[serde(default)]
    pub drop_table: Vec<DropEntry>,
}

impl SpeciesData {
    /// Moves known at `level`, keeping the most recently learned four.
    pub fn moves_at_level(&self, level: u8) -> Vec<&LearnsetEntry> {
        let mut known: Vec<&LearnsetEntry> =
            self.learnset.iter().filter(|entry| entry.level <= level).collect();
        known.sort_by_key(|entry| entry.level);
        let skip = known.len().saturating_sub(4);
        known.into_iter().skip(skip).collect()
    }
}
