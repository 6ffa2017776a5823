use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;

use super::ConfigError;

// -----------------------------------------------------------------------------
// ----- UsersConfig -----------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct UsersConfig {
    by_key: HashMap<UserKey, UserRecord>,
}

// -----------------------------------------------------------------------------
// ----- UsersConfig: Static ---------------------------------------------------

impl UsersConfig {
    pub(crate) fn from_entries(entries: Vec<UsersFileEntry>) -> Result<Self, ConfigError> {
        let mut by_key = HashMap::with_capacity(entries.len());

        for user in entries {
            validate(&user)?;

            let server_username = user
                .server_username
                .clone()
                .unwrap_or_else(|| user.username.clone());
            let server_password = user
                .server_password
                .clone()
                .unwrap_or_else(|| user.password.clone());

            let record = UserRecord {
                client_username: user.username.clone(),

                client_password: SecretString::new(user.password.into_boxed_str()),
                server_username,
                server_password: SecretString::new(server_password.into_boxed_str()),

                pool_size: user.pool_size,
                databases: user.databases,
            };

            let key = UserKey::new(&record.client_username);
            if by_key.insert(key, record).is_some() {
                return Err(ConfigError::DuplicateUser {
                    username: user.username,
                });
            }
        }

        Ok(UsersConfig { by_key })
    }
}

// -----------------------------------------------------------------------------
// ----- UsersConfig: Public ---------------------------------------------------

impl UsersConfig {
    pub fn authenticate(
        &self,
        client_username: &str,
        client_password: &str,
    ) -> Result<&UserRecord, AuthError> {
        let user = self
            .by_key
            .get(&UserKey::new(client_username))
            .ok_or(AuthError::UnknownUser)?;

        if user.client_password.expose_secret() != client_password {
            return Err(AuthError::BadPassword);
        }

        Ok(user)
    }

    pub fn get(&self, client_username: &str) -> Option<&UserRecord> {
        self.by_key.get(&UserKey::new(client_username))
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserRecord> {
        self.by_key.values()
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: key ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct UserKey {
    client_username: String,
}

impl UserKey {
    fn new(client_username: &str) -> Self {
        Self {
            client_username: client_username.to_string(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UsersFileEntry {
    #[serde(alias = "name")]
    username: String,

    password: String,

    #[serde(default)]
    pool_size: Option<usize>,

    #[serde(default, alias = "server_user")]
    server_username: Option<String>,

    #[serde(default)]
    server_password: Option<String>,

    #[serde(default)]
    databases: Option<Vec<String>>,
}

// -----------------------------------------------------------------------------
// ----- UserRecord ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub client_username: String,

    pub client_password: SecretString,
    pub server_username: String,
    pub server_password: SecretString,

    /// Overrides the database's `pool_max` for this user's pools.
    pub pool_size: Option<usize>,
    /// `None` allows every configured database.
    pub databases: Option<Vec<String>>,
}

impl UserRecord {
    pub fn may_access(&self, database: &str) -> bool {
        match &self.databases {
            Some(allowed) => allowed.iter().any(|name| name == database),
            None => true,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn validate(u: &UsersFileEntry) -> Result<(), ConfigError> {
    if u.username.trim().is_empty() {
        return Err(ConfigError::InvalidField("users.username".into()));
    }
    if u.password.is_empty() {
        return Err(ConfigError::InvalidField("users.password".into()));
    }
    if u.pool_size == Some(0) {
        return Err(ConfigError::InvalidField("users.pool_size".into()));
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    UnknownUser,
    BadPassword,
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
