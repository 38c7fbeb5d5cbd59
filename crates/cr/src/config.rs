use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "cr.toml";

/// Knobs for one resolution pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrConfig {
    /// How many " (n)" suffixes to try before giving up on a free name
    #[serde(default = "default_max_unique_attempts")]
    pub max_unique_attempts: u32,
    /// Classify chains as files or directories while building them,
    ///  when a block type resolver is available
    #[serde(default = "default_identify_types")]
    pub identify_types: bool,
    /// Search for the paths of nodes created on the branch too
    #[serde(default)]
    pub include_creates: bool,
}

fn default_max_unique_attempts() -> u32 {
    100
}

fn default_identify_types() -> bool {
    true
}

impl Default for CrConfig {
    fn default() -> Self {
        Self {
            max_unique_attempts: default_max_unique_attempts(),
            identify_types: default_identify_types(),
            include_creates: false,
        }
    }
}

impl CrConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = CrConfig::from_toml_str("include_creates = true").unwrap();
        assert_eq!(config.max_unique_attempts, 100);
        assert!(config.identify_types);
        assert!(config.include_creates);

        assert_eq!(CrConfig::from_toml_str("").unwrap(), CrConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = CrConfig {
            max_unique_attempts: 3,
            identify_types: false,
            include_creates: true,
        };
        fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(CrConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            CrConfig::from_toml_str("max_unique_attempts = \"lots\""),
            Err(ConfigError::TomlDe(_))
        ));
        assert!(matches!(
            CrConfig::load("/nonexistent/cr.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
