//! Graceful shutdown: Running, then Draining until every regular session
//! has finished its transaction or the grace period runs out, then
//! Terminating.

mod coordinator;
mod sessions;

pub use coordinator::{ShutdownCoordinator, ShutdownPhase, ShutdownRequest};
pub use sessions::{SessionEntry, SessionId, SessionRegistry, SessionState};
