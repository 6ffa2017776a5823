//! The admin channel's command set. Commands are decoded once into
//! [`AdminCommand`] and answered with text-only result sets.

use crate::gateway::Gateway;

// -----------------------------------------------------------------------------
// ----- AdminCommand ----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    ShowPools,
    ShowDatabases,
    ShowClients,
    ShowVersion,
    Shutdown,
}

impl AdminCommand {
    /// Case-insensitive, whitespace-tolerant, one optional trailing `;`.
    pub fn parse(query: &str) -> Option<Self> {
        let query = query.trim();
        let query = query.strip_suffix(';').unwrap_or(query);
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_ascii_uppercase())
            .collect();

        match words.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["SHOW", "POOLS"] => Some(AdminCommand::ShowPools),
            ["SHOW", "DATABASES"] => Some(AdminCommand::ShowDatabases),
            ["SHOW", "CLIENTS"] => Some(AdminCommand::ShowClients),
            ["SHOW", "VERSION"] => Some(AdminCommand::ShowVersion),
            ["SHUTDOWN"] => Some(AdminCommand::Shutdown),
            _ => None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ResultSet -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: &'static [&'static str],
    pub rows: Vec<Vec<String>>,
    pub tag: String,
}

impl ResultSet {
    fn show(columns: &'static [&'static str], rows: Vec<Vec<String>>) -> Self {
        Self {
            columns,
            rows,
            tag: "SHOW".to_string(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- execute ---------------------------------------------------------------

pub fn execute(command: AdminCommand, gateway: &Gateway) -> ResultSet {
    match command {
        AdminCommand::ShowPools => show_pools(gateway),
        AdminCommand::ShowDatabases => show_databases(gateway),
        AdminCommand::ShowClients => show_clients(gateway),
        AdminCommand::ShowVersion => ResultSet::show(
            &["version"],
            vec![vec![format!("pgharbor {}", env!("CARGO_PKG_VERSION"))]],
        ),
        AdminCommand::Shutdown => {
            let accepted = gateway.shutdown.request_shutdown().accepted();
            ResultSet {
                columns: &["shutdown"],
                rows: vec![vec![if accepted { "t" } else { "f" }.to_string()]],
                tag: "SHUTDOWN".to_string(),
            }
        }
    }
}

fn show_pools(gateway: &Gateway) -> ResultSet {
    let rows = gateway
        .pools
        .stats()
        .into_iter()
        .map(|stats| {
            vec![
                stats.identity.user,
                stats.identity.database,
                stats.identity.shard.to_string(),
                stats.size.to_string(),
                stats.idle.to_string(),
                stats.checked_out.to_string(),
                stats.waiting.to_string(),
                stats.min_size.to_string(),
                stats.max_size.to_string(),
                stats.timeouts.to_string(),
            ]
        })
        .collect();

    ResultSet::show(
        &[
            "user",
            "database",
            "shard",
            "size",
            "idle",
            "checked_out",
            "waiting",
            "min_size",
            "max_size",
            "timeouts",
        ],
        rows,
    )
}

fn show_databases(gateway: &Gateway) -> ResultSet {
    let mut rows = Vec::new();
    for database in gateway.pools.databases() {
        for (index, shard) in database.shards.iter().enumerate() {
            rows.push(vec![
                database.name.clone(),
                index.to_string(),
                shard.host.clone(),
                shard.port.to_string(),
                shard.database.clone(),
                database.pool_min.to_string(),
                database.pool_max.to_string(),
            ]);
        }
    }

    ResultSet::show(
        &[
            "name",
            "shard",
            "host",
            "port",
            "backend_database",
            "pool_min",
            "pool_max",
        ],
        rows,
    )
}

fn show_clients(gateway: &Gateway) -> ResultSet {
    let rows = gateway
        .sessions
        .snapshot()
        .into_iter()
        .map(|(id, entry)| {
            vec![
                id.to_string(),
                entry.identity.user,
                entry.identity.database,
                entry.identity.shard.to_string(),
                entry.peer.to_string(),
                entry.state.as_str().to_string(),
            ]
        })
        .collect();

    ResultSet::show(&["id", "user", "database", "shard", "peer", "state"], rows)
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
