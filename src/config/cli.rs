use clap::Parser;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use super::types::LogLevel;

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub listen_addr: SocketAddr,
    pub config_file_location: PathBuf,
    pub log_level: LogLevel,
}

impl CliConfig {
    /// Exits the process with usage on invalid arguments.
    pub fn from_args() -> Self {
        Self::from(Args::parse())
    }
}

impl From<Args> for CliConfig {
    fn from(args: Args) -> Self {
        Self {
            listen_addr: SocketAddr::from((args.host, args.port)),
            config_file_location: args.config_file,
            log_level: args.log_level,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "pgharbor", version, about = "Postgres connection pooler")]
pub struct Args {
    // IPv4 or IPv6 literal (e.g., 0.0.0.0, 127.0.0.1, ::, ::1).
    #[arg(long = "host", short = 'H', env = "PGHARBOR_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(long = "port", short = 'p', env = "PGHARBOR_PORT", default_value_t = 6432)]
    port: u16,

    #[arg(long = "log", default_value = "info")]
    log_level: LogLevel,

    // Must exist; no defaults.
    #[arg(long = "config", env = "PGHARBOR_CONFIG_FILE")]
    config_file: PathBuf,
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
