use serde::Deserialize;
use std::{net::SocketAddr, path::Path};
use tokio::fs;

use super::{
    ConfigError,
    cli::CliConfig,
    databases::{DatabaseFileEntry, DatabasesConfig},
    general::GeneralConfig,
    types::LogLevel,
    users::{UsersConfig, UsersFileEntry},
};

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

/// Everything the pooler needs, resolved once at startup and shared behind
/// an `Arc`.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: LogLevel,
    pub general: GeneralConfig,
    pub databases: DatabasesConfig,
    pub users: UsersConfig,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    pub async fn load(cli: &CliConfig) -> Result<Config, ConfigError> {
        let raw = read_file(&cli.config_file_location).await?;
        Self::parse(&raw, cli.listen_addr, cli.log_level)
    }

    pub fn parse(raw: &str, listen_addr: SocketAddr, log_level: LogLevel) -> Result<Config, ConfigError> {
        let doc: ConfigFile = toml::from_str(raw).map_err(|e| ConfigError::Toml { source: e })?;

        if doc.general.shutdown_timeout.is_zero() {
            return Err(ConfigError::InvalidField("general.shutdown_timeout".into()));
        }

        if doc.general.prepared_statements_cache_size == 0 {
            return Err(ConfigError::InvalidField(
                "general.prepared_statements_cache_size".into(),
            ));
        }

        let databases = DatabasesConfig::from_entries(doc.databases)?;
        let users = UsersConfig::from_entries(doc.users)?;

        if databases.contains(&doc.general.admin_database) {
            return Err(ConfigError::AdminDatabaseCollision {
                name: doc.general.admin_database,
            });
        }

        for user in users.iter() {
            for name in user.databases.iter().flatten() {
                if !databases.contains(name) {
                    return Err(ConfigError::UnknownDatabase {
                        username: user.client_username.clone(),
                        database: name.clone(),
                    });
                }
            }
        }

        Ok(Config {
            listen_addr,
            log_level,
            general: doc.general,
            databases,
            users,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    general: GeneralConfig,

    #[serde(default)]
    databases: Vec<DatabaseFileEntry>,

    #[serde(default)]
    users: Vec<UsersFileEntry>,
}

async fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).await.map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::users::AuthError;
    use secrecy::ExposeSecret;
    use std::{io::Write, path::PathBuf, time::Duration};
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
        [general]
        shutdown_timeout = "5s"
        pool_timeout = "250ms"
        admin_username = "admin_user"
        admin_password = "admin_pass"

        [[databases]]
        name = "sharded_db"
        pool_min = 1
        pool_max = 4

        [[databases.shards]]
        host = "127.0.0.1"
        port = 5432
        database = "shard0"

        [[databases.shards]]
        host = "127.0.0.1"
        port = 5432
        database = "shard1"

        [[databases]]
        name = "plain"

        [[databases.shards]]
        host = "localhost"
        port = 5433

        [[users]]
        username = "sharding_user"
        password = "sharding_user"
        pool_size = 2
        databases = ["sharded_db"]

        [[users]]
        name = "legacy"
        password = "pw"
        server_user = "backend_legacy"
    "#;

    fn addr() -> SocketAddr {
        "127.0.0.1:6432".parse().unwrap()
    }

    fn write_tmp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn loads_from_disk() {
        let tmp = write_tmp(SAMPLE);
        let cli = CliConfig {
            listen_addr: addr(),
            config_file_location: tmp.path().to_path_buf(),
            log_level: LogLevel::Info,
        };
        let config = Config::load(&cli).await.unwrap();

        assert_eq!(config.general.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.general.pool_timeout, Duration::from_millis(250));
        assert_eq!(config.general.idle_timeout, Duration::from_secs(600));
        assert_eq!(config.general.admin_database, "pgharbor");
        assert_eq!(config.general.admin_password.expose_secret(), "admin_pass");

        let sharded = config.databases.get("sharded_db").unwrap();
        assert_eq!(sharded.pool_min, 1);
        assert_eq!(sharded.pool_max, 4);
        assert_eq!(sharded.shards.len(), 2);
        assert_eq!(sharded.shards[1].database, "shard1");

        let plain = config.databases.get("plain").unwrap();
        assert_eq!(plain.pool_max, 10);
        assert_eq!(plain.shards[0].database, "plain");
    }

    #[test]
    fn users_authenticate_and_respect_allow_list() {
        let config = Config::parse(SAMPLE, addr(), LogLevel::Info).unwrap();

        let user = config.users.authenticate("sharding_user", "sharding_user").unwrap();
        assert_eq!(user.server_username, "sharding_user");
        assert_eq!(user.pool_size, Some(2));
        assert!(user.may_access("sharded_db"));
        assert!(!user.may_access("plain"));

        let legacy = config.users.authenticate("legacy", "pw").unwrap();
        assert_eq!(legacy.server_username, "backend_legacy");
        assert!(legacy.may_access("plain"));

        assert_eq!(
            config.users.authenticate("legacy", "nope").unwrap_err(),
            AuthError::BadPassword
        );
        assert_eq!(
            config.users.authenticate("steeve", "nope").unwrap_err(),
            AuthError::UnknownUser
        );
    }

    #[test]
    fn rejects_zero_shutdown_timeout() {
        let raw = r#"
            [general]
            shutdown_timeout = "0s"
        "#;
        let err = Config::parse(raw, addr(), LogLevel::Info).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField(_)));
    }

    #[test]
    fn rejects_inverted_pool_bounds() {
        let raw = r#"
            [[databases]]
            name = "db"
            pool_min = 5
            pool_max = 2

            [[databases.shards]]
            host = "localhost"
            port = 5432
        "#;
        let err = Config::parse(raw, addr(), LogLevel::Info).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPoolBounds { .. }));
    }

    #[test]
    fn rejects_unknown_database_in_allow_list() {
        let raw = r#"
            [[users]]
            username = "alice"
            password = "pw"
            databases = ["nope"]
        "#;
        let err = Config::parse(raw, addr(), LogLevel::Info).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDatabase { .. }));
    }

    #[test]
    fn rejects_duplicates_and_missing_shards() {
        let raw = r#"
            [[databases]]
            name = "db"
        "#;
        let err = Config::parse(raw, addr(), LogLevel::Info).unwrap_err();
        assert!(matches!(err, ConfigError::NoShards { .. }));

        let raw = r#"
            [[users]]
            username = "alice"
            password = "pw"

            [[users]]
            username = "alice"
            password = "pw2"
        "#;
        let err = Config::parse(raw, addr(), LogLevel::Info).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateUser { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let cli = CliConfig {
            listen_addr: addr(),
            config_file_location: PathBuf::from("/definitely/not/here.toml"),
            log_level: LogLevel::Info,
        };
        let err = Config::load(&cli).await.unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
