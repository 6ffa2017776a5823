//! Frame-level view of the PostgreSQL v3 protocol: enough to find message
//! boundaries, classify frames, and rewrite the few fields the pooler owns
//! (statement names). Everything else is forwarded as opaque bytes.

pub mod observers;
pub mod types;
pub mod utils;

pub use types::MessageType;
