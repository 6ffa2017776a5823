pub mod admin;
pub mod backend;
pub mod config;
pub mod errors;
pub mod frontend;
pub mod gateway;
pub mod parser;
pub mod server;
pub mod shared_types;
pub mod shutdown;
pub mod tls;
pub mod wire;

pub use config::Config;
pub use errors::ErrorResponse;
pub use frontend::FrontendConnection;
pub use gateway::Gateway;
pub use server::Server;
pub use shutdown::{ShutdownCoordinator, ShutdownPhase, ShutdownRequest};

use config::LogLevel;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global fmt subscriber. `RUST_LOG` wins over `level` when set.
/// A second call is a no-op.
pub fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
