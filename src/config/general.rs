use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::types::{de_duration, de_secret};

// -----------------------------------------------------------------------------
// ----- GeneralConfig ---------------------------------------------------------

/// The `[general]` table. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Grace period between Draining and Terminating.
    #[serde(deserialize_with = "de_duration")]
    pub shutdown_timeout: Duration,

    /// How long a session waits for a server connection.
    #[serde(deserialize_with = "de_duration")]
    pub pool_timeout: Duration,

    #[serde(deserialize_with = "de_duration")]
    pub connect_timeout: Duration,

    #[serde(deserialize_with = "de_duration")]
    pub idle_timeout: Duration,

    /// Consecutive pool timeouts after which an alert is logged.
    pub pool_timeout_alert_threshold: u32,

    pub prepared_statements: bool,
    pub prepared_statements_cache_size: usize,

    pub admin_username: String,
    #[serde(deserialize_with = "de_secret")]
    pub admin_password: SecretString,
    pub admin_database: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(60),
            pool_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            pool_timeout_alert_threshold: 10,
            prepared_statements: true,
            prepared_statements_cache_size: 500,
            admin_username: "admin".to_string(),
            admin_password: SecretString::new("admin".into()),
            admin_database: "pgharbor".to_string(),
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
