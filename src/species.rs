use std::collections::HashMap;
use std::fmt;

use schema::SpeciesData;
use tracing::debug;

use crate::errors::RegistryError;
use crate::move_data::normalize_id;

const BUILTIN_SPECIES: &str = include_str!("../data/species.ron");

/// Static species table keyed by normalized species name.
#[derive(Debug, Clone, Default)]
pub struct SpeciesRegistry {
    species: HashMap<String, SpeciesData>,
}

impl SpeciesRegistry {
    pub fn from_ron_str(source: &str) -> Result<Self, RegistryError> {
        let entries: Vec<SpeciesData> =
            ron::from_str(source).map_err(|source| RegistryError::Parse {
                kind: "species",
                source,
            })?;

        let mut species = HashMap::with_capacity(entries.len());
        for entry in entries {
            let key = normalize_id(&entry.name);
            if species.contains_key(&key) {
                return Err(RegistryError::Duplicate {
                    kind: "species",
                    name: entry.name,
                });
            }
            species.insert(key, entry);
        }
        debug!(count = species.len(), "loaded species registry");
        Ok(Self { species })
    }

    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_ron_str(BUILTIN_SPECIES)
    }

    pub fn get(&self, name: &str) -> Option<&SpeciesData> {
        self.species.get(&normalize_id(name))
    }

    pub fn require(&self, name: &str) -> Result<&SpeciesData, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::UnknownSpecies(name.to_string()))
    }

    pub fn insert(&mut self, data: SpeciesData) {
        self.species.insert(normalize_id(&data.name), data);
    }
}

/// Multi-line summary of a species: typing and base stats.
pub struct SpeciesSummary<'a>(pub &'a SpeciesData);

impl fmt::Display for SpeciesSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0;
        writeln!(f, "{}", data.name)?;
        writeln!(f, "--------------------")?;

        let type_names: Vec<String> = data.types.iter().map(|t| t.to_string()).collect();
        writeln!(f, "Type(s): {}", type_names.join(" / "))?;
        writeln!(f, "--------------------")?;

        writeln!(f, "Base Stats:")?;
        let base_stats = &data.base_stats;
        const LABEL_WIDTH: usize = 12;

        writeln!(f, "{:<LABEL_WIDTH$} : {}", "HP", base_stats.hp)?;
        writeln!(f, "{:<LABEL_WIDTH$} : {}", "Attack", base_stats.attack)?;
        writeln!(f, "{:<LABEL_WIDTH$} : {}", "Defense", base_stats.defense)?;
        writeln!(f, "{:<LABEL_WIDTH$} : {}", "Sp. Atk", base_stats.sp_attack)?;
        writeln!(f, "{:<LABEL_WIDTH$} : {}", "Sp. Def", base_stats.sp_defense)?;
        write!(f, "{:<LABEL_WIDTH$} : {}", "Speed", base_stats.speed)
    }
}
