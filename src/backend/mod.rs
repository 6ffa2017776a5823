//! Server side of the pooler: physical connections to PostgreSQL backends.

pub mod cancel;
pub mod connector;
pub mod messages;
pub mod server_connection;
mod startup;

use std::io;
use thiserror::Error;

pub use cancel::{CancelTarget, send_cancel};
pub use connector::{Connector, ServerStream, ServerTarget, TcpConnector};
pub use server_connection::{ServerConnection, ServerStatus};

// -----------------------------------------------------------------------------
// ----- ServerError -----------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("backend io: {0}")]
    Io(#[from] io::Error),

    #[error("backend closed the connection")]
    Closed,

    #[error("connecting to {addr} timed out")]
    ConnectTimeout { addr: String },

    #[error("backend rejected startup: {0}")]
    Rejected(String),

    #[error("unsupported backend auth method {0}")]
    UnsupportedAuth(i32),

    #[error("backend requested a password but none is configured")]
    MissingPassword,

    #[error("backend protocol violation: {0}")]
    Protocol(&'static str),
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
