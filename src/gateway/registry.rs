use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{Connector, ServerTarget};
use crate::config::{AuthError, Config, DatabaseRecord, UserRecord};
use crate::shared_types::PoolIdentity;
use secrecy::ExposeSecret;

use super::pool::{Pool, PoolSettings, PoolStats};

// -----------------------------------------------------------------------------
// ----- Types -----------------------------------------------------------------

/// Which path a connection takes, decided from the requested database alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Regular,
    Admin,
}

/// Result of a successful [`PoolRegistry::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Admin,
    Regular {
        /// Identity of shard 0; `SET SHARD` moves the session to another one.
        identity: PoolIdentity,
        shards: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("password authentication failed")]
    Unauthorized,

    #[error("database \"{database}\" does not exist")]
    UnknownDatabase { database: String },
}

// -----------------------------------------------------------------------------
// ----- PoolRegistry ----------------------------------------------------------

/// Every pool the process owns: one per user, allowed database and shard.
/// Built once from configuration; the set of pools never changes afterwards.
#[derive(Debug)]
pub struct PoolRegistry {
    config: Arc<Config>,
    pools: BTreeMap<PoolIdentity, Arc<Pool>>,
}

// -----------------------------------------------------------------------------
// ----- PoolRegistry: Static --------------------------------------------------

impl PoolRegistry {
    pub fn new(config: Arc<Config>, connector: Arc<dyn Connector>) -> Self {
        let mut pools = BTreeMap::new();

        for user in config.users.iter() {
            for database in config.databases.iter() {
                if !user.may_access(&database.name) {
                    continue;
                }

                let settings = pool_settings(&config, user, database);
                for (shard, record) in database.shards.iter().enumerate() {
                    let identity =
                        PoolIdentity::new(&user.client_username, &database.name, shard);
                    let target = ServerTarget {
                        host: record.host.clone(),
                        port: record.port,
                        database: record.database.clone(),
                        user: user.server_username.clone(),
                        password: user.server_password.clone(),
                        connect_timeout: config.general.connect_timeout,
                        statement_cache_size: config.general.prepared_statements_cache_size,
                    };

                    debug!(%identity, addr = %target.addr(), "registering pool");
                    let pool = Pool::new(identity.clone(), target, connector.clone(), settings.clone());
                    pools.insert(identity, pool);
                }
            }
        }

        Self { config, pools }
    }

    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        let config = Config::parse(
            "",
            "127.0.0.1:0".parse().expect("static addr"),
            crate::config::LogLevel::Info,
        )
        .expect("empty config is valid");
        Self {
            config: Arc::new(config),
            pools: BTreeMap::new(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- PoolRegistry: Public --------------------------------------------------

impl PoolRegistry {
    pub fn classify(&self, database: &str) -> Classification {
        if database == self.config.general.admin_database {
            Classification::Admin
        } else {
            Classification::Regular
        }
    }

    /// Check credentials and map the requested database to a pool identity.
    /// A user outside a database's allow-list sees it as nonexistent.
    pub fn resolve(&self, user: &str, password: &str, database: &str) -> Result<Binding, ResolveError> {
        if self.classify(database) == Classification::Admin {
            let general = &self.config.general;
            if user == general.admin_username && password == general.admin_password.expose_secret() {
                return Ok(Binding::Admin);
            }
            return Err(ResolveError::Unauthorized);
        }

        let record = self
            .config
            .users
            .authenticate(user, password)
            .map_err(|e| match e {
                AuthError::UnknownUser | AuthError::BadPassword => ResolveError::Unauthorized,
            })?;

        let unknown = || ResolveError::UnknownDatabase {
            database: database.to_string(),
        };

        let db = self.config.databases.get(database).ok_or_else(unknown)?;
        if !record.may_access(database) {
            return Err(unknown());
        }

        Ok(Binding::Regular {
            identity: PoolIdentity::new(user, database, 0),
            shards: db.shards.len(),
        })
    }

    pub fn get(&self, identity: &PoolIdentity) -> Option<&Arc<Pool>> {
        self.pools.get(identity)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        self.pools.values().map(|pool| pool.stats()).collect()
    }

    pub fn databases(&self) -> impl Iterator<Item = &DatabaseRecord> {
        self.config.databases.iter()
    }

    /// Open `min_size` connections for every pool in the background.
    pub fn warm_all(&self) {
        for pool in self.pools.values() {
            let pool = pool.clone();
            tokio::spawn(async move { pool.warm().await });
        }
    }

    pub async fn reap_idle(&self) -> usize {
        let mut closed = 0;
        for pool in self.pools.values() {
            closed += pool.reap_idle().await;
        }
        closed
    }

    pub async fn teardown(&self) {
        for pool in self.pools.values() {
            pool.teardown().await;
        }
        info!(pools = self.pools.len(), "pools torn down");
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn pool_settings(config: &Config, user: &UserRecord, database: &DatabaseRecord) -> PoolSettings {
    let max_size = user.pool_size.unwrap_or(database.pool_max);
    PoolSettings {
        min_size: database.pool_min.min(max_size),
        max_size,
        acquire_timeout: config.general.pool_timeout,
        idle_timeout: config.general.idle_timeout,
        timeout_alert_threshold: config.general.pool_timeout_alert_threshold,
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
