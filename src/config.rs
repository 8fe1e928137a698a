use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Tunable battle rules. Every field falls back to its default when omitted
/// from the RON source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Active slots per side.
    pub active_slots: usize,
    pub screen_turns: u8,
    pub weather_turns: u8,
    pub terrain_turns: u8,
    /// A d100 roll at or below this value is a critical hit.
    pub crit_threshold: u8,
    pub stab_multiplier: f64,
    pub action_timeout_ms: u64,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            active_slots: 1,
            screen_turns: 5,
            weather_turns: 5,
            terrain_turns: 5,
            crit_threshold: 4,
            stab_multiplier: 1.5,
            action_timeout_ms: 30_000,
        }
    }
}

impl BattleConfig {
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: BattleConfig = ron::from_str(source).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron_str(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.active_slots == 0 {
            return Err(ConfigError::Invalid("active_slots must be at least 1".into()));
        }
        if self.crit_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "crit_threshold {} exceeds 100",
                self.crit_threshold
            )));
        }
        if self.stab_multiplier < 1.0 {
            return Err(ConfigError::Invalid("stab_multiplier below 1.0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = BattleConfig::from_ron_str("(screen_turns: 8, crit_threshold: 0)").unwrap();
        assert_eq!(config.screen_turns, 8);
        assert_eq!(config.crit_threshold, 0);
        assert_eq!(config.active_slots, 1);
        assert_eq!(config.weather_turns, 5);
        assert_eq!(config.stab_multiplier, 1.5);
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(BattleConfig::from_ron_str("()").unwrap(), BattleConfig::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            BattleConfig::from_ron_str("(active_slots: 0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BattleConfig::from_ron_str("(active_slots: \"two\")"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = BattleConfig::load("/definitely/not/here.ron").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.ron"));
    }
}
