use std::collections::HashMap;

use schema::MoveDescriptor;
use tracing::debug;

use crate::combatant::Combatant;
use crate::errors::RegistryError;
use crate::species::SpeciesRegistry;

const BUILTIN_MOVES: &str = include_str!("../data/moves.ron");

/// Canonical registry key: lowercase ASCII alphanumerics only, so
/// "Will-O-Wisp", "will o wisp" and "willowisp" all match.
pub fn normalize_id(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// The global move table, keyed by normalized move name.
#[derive(Debug, Clone, Default)]
pub struct MoveRegistry {
    moves: HashMap<String, MoveDescriptor>,
}

impl MoveRegistry {
    pub fn from_ron_str(source: &str) -> Result<Self, RegistryError> {
        let entries: Vec<MoveDescriptor> =
            ron::from_str(source).map_err(|source| RegistryError::Parse {
                kind: "move",
                source,
            })?;

        let mut moves = HashMap::with_capacity(entries.len());
        for entry in entries {
            let key = normalize_id(&entry.name);
            if moves.contains_key(&key) {
                return Err(RegistryError::Duplicate {
                    kind: "move",
                    name: entry.name,
                });
            }
            moves.insert(key, entry);
        }
        debug!(count = moves.len(), "loaded move registry");
        Ok(Self { moves })
    }

    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_ron_str(BUILTIN_MOVES)
    }

    pub fn get(&self, name: &str) -> Option<&MoveDescriptor> {
        self.moves.get(&normalize_id(name))
    }

    pub fn insert(&mut self, descriptor: MoveDescriptor) {
        self.moves.insert(normalize_id(&descriptor.name), descriptor);
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// Layered move lookup: species learnset override, then the global registry,
/// then a neutral stub. Always hands back an owned descriptor.
#[derive(Debug, Clone, Default)]
pub struct MoveResolver {
    moves: MoveRegistry,
    species: SpeciesRegistry,
}

impl MoveResolver {
    pub fn new(moves: MoveRegistry, species: SpeciesRegistry) -> Self {
        Self { moves, species }
    }

    pub fn moves(&self) -> &MoveRegistry {
        &self.moves
    }

    pub fn species(&self) -> &SpeciesRegistry {
        &self.species
    }

    pub fn resolve(&self, name: &str, actor: Option<&Combatant>) -> MoveDescriptor {
        let global = self.moves.get(name);

        let learnset_entry = actor
            .and_then(|combatant| self.species.get(&combatant.species))
            .and_then(|species| {
                let key = normalize_id(name);
                species
                    .learnset
                    .iter()
                    .find(|entry| normalize_id(&entry.name) == key)
            });

        if let Some(custom) = learnset_entry.and_then(|entry| entry.custom.as_ref()) {
            let display_name = global.map(|m| m.name.as_str()).unwrap_or(name);
            let base = global
                .cloned()
                .unwrap_or_else(|| MoveDescriptor::stub(display_name));
            return custom.merge_over(display_name, &base);
        }

        match global {
            Some(descriptor) => descriptor.clone(),
            None => {
                debug!(%name, "move not registered, using neutral stub");
                MoveDescriptor::stub(name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::Combatant;
    use pretty_assertions::assert_eq;
    use schema::{ElementType, MoveEffect};

    fn resolver() -> MoveResolver {
        MoveResolver::new(
            MoveRegistry::builtin().unwrap(),
            SpeciesRegistry::builtin().unwrap(),
        )
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("Will-O-Wisp"), "willowisp");
        assert_eq!(normalize_id("  Thunder_Wave "), "thunderwave");
    }

    #[test]
    fn test_registry_lookup_is_name_insensitive() {
        let registry = MoveRegistry::builtin().unwrap();
        let ember = registry.get("ember").unwrap();
        assert_eq!(ember.element, ElementType::Fire);
        assert_eq!(registry.get("THUNDER WAVE").unwrap().name, "Thunder Wave");
    }

    #[test]
    fn test_duplicate_moves_rejected() {
        let source = r#"[
            (name: "Tackle", element: Normal, category: Physical, power: 40, accuracy: 100, pp: 35),
            (name: "tackle", element: Normal, category: Physical, power: 50, accuracy: 100, pp: 35),
        ]"#;
        assert!(matches!(
            MoveRegistry::from_ron_str(source),
            Err(RegistryError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_unknown_move_resolves_to_stub() {
        let resolved = resolver().resolve("Totally Made Up", None);
        assert_eq!(resolved, MoveDescriptor::stub("Totally Made Up"));
        assert!(resolved.tags.is_empty());
    }

    #[test]
    fn test_learnset_override_merges_over_registry() {
        let resolver = resolver();
        let species = resolver.species().get("Pikachu").unwrap().clone();
        let pikachu = Combatant::from_species("pika", &species, 50, &resolver);

        let signature = resolver.resolve("volt tackle", Some(&pikachu));
        assert_eq!(signature.power, 130);
        assert!(signature.has_tag("signature"));
        assert_eq!(signature.effect, MoveEffect::Recoil(33));
        assert_eq!(signature.name, "Volt Tackle");

        let generic = resolver.resolve("volt tackle", None);
        assert_eq!(generic.power, 120);
        assert!(!generic.has_tag("signature"));
    }
}
