use std::fmt;

// -----------------------------------------------------------------------------
// ----- PoolIdentity ----------------------------------------------------------

/// Key of a Pool: the client-visible user and database plus the shard index.
/// Each shard of a sharded database is a distinct identity, so connections
/// are never mixed across shards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolIdentity {
    pub user: String,
    pub database: String,
    pub shard: usize,
}

impl PoolIdentity {
    pub fn new(user: impl Into<String>, database: impl Into<String>, shard: usize) -> Self {
        Self {
            user: user.into(),
            database: database.into(),
            shard,
        }
    }

    /// Same user and database, another shard.
    pub fn with_shard(&self, shard: usize) -> Self {
        Self {
            user: self.user.clone(),
            database: self.database.clone(),
            shard,
        }
    }
}

impl fmt::Display for PoolIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.user, self.database, self.shard)
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
