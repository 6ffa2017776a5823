//! Client side of the pooler: handshake, the admin console, and the
//! regular session loop.

pub mod connection;
pub mod sequence_tracker;

pub(crate) mod buffers;
pub(crate) mod context;
pub(crate) mod handlers;
pub(crate) mod proxy_responses;
pub(crate) mod response_plan;
pub(crate) mod session;
pub(crate) mod statements;
pub(crate) mod transport;

pub use connection::FrontendConnection;
