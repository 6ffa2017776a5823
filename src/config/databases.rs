use serde::Deserialize;
use std::collections::BTreeMap;

use super::ConfigError;

// -----------------------------------------------------------------------------
// ----- DatabasesConfig -------------------------------------------------------

/// Logical databases clients may connect to, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct DatabasesConfig {
    by_name: BTreeMap<String, DatabaseRecord>,
}

#[derive(Debug, Clone)]
pub struct DatabaseRecord {
    pub name: String,
    pub pool_min: usize,
    pub pool_max: usize,
    pub shards: Vec<ShardRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRecord {
    pub host: String,
    pub port: u16,
    /// Backend database name.
    pub database: String,
}

// -----------------------------------------------------------------------------
// ----- DatabasesConfig: Static -----------------------------------------------

impl DatabasesConfig {
    pub(crate) fn from_entries(entries: Vec<DatabaseFileEntry>) -> Result<Self, ConfigError> {
        let mut by_name = BTreeMap::new();

        for entry in entries {
            if entry.name.trim().is_empty() {
                return Err(ConfigError::InvalidField("databases.name".into()));
            }

            if entry.shards.is_empty() {
                return Err(ConfigError::NoShards { database: entry.name });
            }

            if entry.pool_max == 0 || entry.pool_min > entry.pool_max {
                return Err(ConfigError::InvalidPoolBounds {
                    database: entry.name,
                    min: entry.pool_min,
                    max: entry.pool_max,
                });
            }

            let shards = entry
                .shards
                .into_iter()
                .map(|shard| ShardRecord {
                    host: shard.host,
                    port: shard.port,
                    database: shard.database.unwrap_or_else(|| entry.name.clone()),
                })
                .collect();

            let record = DatabaseRecord {
                name: entry.name.clone(),
                pool_min: entry.pool_min,
                pool_max: entry.pool_max,
                shards,
            };

            if by_name.insert(entry.name.clone(), record).is_some() {
                return Err(ConfigError::DuplicateDatabase { name: entry.name });
            }
        }

        Ok(Self { by_name })
    }
}

// -----------------------------------------------------------------------------
// ----- DatabasesConfig: Public -----------------------------------------------

impl DatabasesConfig {
    pub fn get(&self, name: &str) -> Option<&DatabaseRecord> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &DatabaseRecord> {
        self.by_name.values()
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DatabaseFileEntry {
    name: String,

    #[serde(default)]
    pool_min: usize,

    #[serde(default = "default_pool_max")]
    pool_max: usize,

    #[serde(default)]
    shards: Vec<ShardFileEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ShardFileEntry {
    host: String,
    port: u16,

    #[serde(default)]
    database: Option<String>,
}

fn default_pool_max() -> usize {
    10
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
