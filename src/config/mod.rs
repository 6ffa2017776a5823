pub mod cli;
#[allow(clippy::module_inception)]
pub mod config;
pub mod databases;
pub mod general;
pub mod types;
pub mod users;

use std::path::PathBuf;
use thiserror::Error;

pub use cli::CliConfig;
pub use config::Config;
pub use databases::{DatabaseRecord, DatabasesConfig, ShardRecord};
pub use general::GeneralConfig;
pub use types::LogLevel;
pub use users::{AuthError, UserRecord, UsersConfig};

// -----------------------------------------------------------------------------
// ----- ConfigError -----------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read error for {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },

    #[error("invalid or missing field '{0}'")]
    InvalidField(String),

    #[error("duplicate [[users]] entry for user '{username}'")]
    DuplicateUser { username: String },

    #[error("duplicate [[databases]] entry for database '{name}'")]
    DuplicateDatabase { name: String },

    #[error("database '{database}' has no [[databases.shards]]")]
    NoShards { database: String },

    #[error("database '{database}' has pool_min {min} > pool_max {max} or pool_max 0")]
    InvalidPoolBounds {
        database: String,
        min: usize,
        max: usize,
    },

    #[error("user '{username}' lists unknown database '{database}'")]
    UnknownDatabase { username: String, database: String },

    #[error("admin database '{name}' collides with a configured database")]
    AdminDatabaseCollision { name: String },
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
