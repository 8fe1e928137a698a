use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{EnumIter, EnumString};

/// Major status conditions. A combatant carries at most one of these.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumString,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum StatusId {
    Poison,
    Burn,
    Paralysis,
    Sleep,
    Freeze,
    Confusion,
}

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display_name = match self {
            StatusId::Poison => "poison",
            StatusId::Burn => "burn",
            StatusId::Paralysis => "paralysis",
            StatusId::Sleep => "sleep",
            StatusId::Freeze => "freeze",
            StatusId::Confusion => "confusion",
        };
        write!(f, "{}", display_name)
    }
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum WeatherId {
    Sun,
    Rain,
    Sandstorm,
    Hail,
}

impl fmt::Display for WeatherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display_name = match self {
            WeatherId::Sun => "harsh sunlight",
            WeatherId::Rain => "rain",
            WeatherId::Sandstorm => "sandstorm",
            WeatherId::Hail => "hail",
        };
        write!(f, "{}", display_name)
    }
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum TerrainId {
    Grassy,
    Electric,
    Psychic,
    Misty,
}

impl fmt::Display for TerrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} Terrain", self)
    }
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum HazardId {
    StealthRock,
    Spikes,
    ToxicSpikes,
    StickyWeb,
}

impl fmt::Display for HazardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display_name = match self {
            HazardId::StealthRock => "Stealth Rock",
            HazardId::Spikes => "Spikes",
            HazardId::ToxicSpikes => "Toxic Spikes",
            HazardId::StickyWeb => "Sticky Web",
        };
        write!(f, "{}", display_name)
    }
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum ScreenId {
    Reflect,
    LightScreen,
    AuroraVeil,
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display_name = match self {
            ScreenId::Reflect => "Reflect",
            ScreenId::LightScreen => "Light Screen",
            ScreenId::AuroraVeil => "Aurora Veil",
        };
        write!(f, "{}", display_name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatType {
    Attack,
    Defense,
    SpecialAttack,
    SpecialDefense,
    Speed,
    Accuracy,
    Evasion,
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display_name = match self {
            StatType::Attack => "Attack",
            StatType::Defense => "Defense",
            StatType::SpecialAttack => "Special Attack",
            StatType::SpecialDefense => "Special Defense",
            StatType::Speed => "Speed",
            StatType::Accuracy => "accuracy",
            StatType::Evasion => "evasiveness",
        };
        write!(f, "{}", display_name)
    }
}

/// Talent rarity tiers. Older rosters use the metal names, which parse to
/// the matching tier.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    EnumString,
)]
#[serde(try_from = "String", into = "String")]
#[strum(ascii_case_insensitive)]
pub enum TalentGrade {
    #[default]
    #[strum(serialize = "Basic", serialize = "Bronze")]
    Basic,
    #[strum(serialize = "Rare", serialize = "Silver")]
    Rare,
    #[strum(serialize = "Epic", serialize = "Gold")]
    Epic,
    #[strum(serialize = "Diamond")]
    Diamond,
}

impl TryFrom<String> for TalentGrade {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.trim().parse()
    }
}

impl From<TalentGrade> for String {
    fn from(grade: TalentGrade) -> Self {
        grade.to_string()
    }
}

impl TalentGrade {
    /// Picks the value for this tier out of a `[basic, rare, epic, diamond]` table.
    pub fn scale<T: Copy>(self, table: [T; 4]) -> T {
        match self {
            TalentGrade::Basic => table[0],
            TalentGrade::Rare => table[1],
            TalentGrade::Epic => table[2],
            TalentGrade::Diamond => table[3],
        }
    }
}

impl fmt::Display for TalentGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
