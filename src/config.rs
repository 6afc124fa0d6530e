use std::error::Error;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::store::{InvalidTableName, Tables};

pub const DEFAULT_SEPARATOR: char = '-';

/// Optional `arbor.toml` settings: relation names and the leaf-path
/// separator. Everything has a default, so a missing file is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub tables: Tables,
    pub separator: char,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tables: Tables::default(),
            separator: DEFAULT_SEPARATOR,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    store: RawStoreSection,
    #[serde(default)]
    paths: RawPathsSection,
}

#[derive(Debug, Default, Deserialize)]
struct RawStoreSection {
    node_table: Option<String>,
    closure_table: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPathsSection {
    separator: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    TableName(InvalidTableName),
    Separator(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "unable to read config: {}", err),
            ConfigError::Toml(err) => write!(f, "invalid config TOML: {}", err),
            ConfigError::TableName(err) => write!(f, "{}", err),
            ConfigError::Separator(raw) => {
                write!(f, "separator must be a single character, got '{}'", raw)
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Toml(err) => Some(err),
            ConfigError::TableName(err) => Some(err),
            ConfigError::Separator(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Toml(value)
    }
}

impl From<InvalidTableName> for ConfigError {
    fn from(value: InvalidTableName) -> Self {
        ConfigError::TableName(value)
    }
}

impl Config {
    /// Loads `path` if it exists, defaults otherwise.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub(crate) fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let file: RawConfig = toml::from_str(raw)?;
        let defaults = Tables::default();
        let node = file
            .store
            .node_table
            .unwrap_or_else(|| defaults.node().to_string());
        let closure = file
            .store
            .closure_table
            .unwrap_or_else(|| defaults.closure().to_string());
        let tables = Tables::validated(&node, &closure)?;

        let separator = match file.paths.separator {
            None => DEFAULT_SEPARATOR,
            Some(raw) => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => c,
                    _ => return Err(ConfigError::Separator(raw)),
                }
            }
        };

        Ok(Self { tables, separator })
    }
}
