//! Shared state every connection task works against.

pub mod pool;
pub mod registry;

use std::fmt;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio_rustls::TlsAcceptor;

use crate::backend::Connector;
use crate::config::Config;
use crate::shutdown::{SessionId, SessionRegistry, ShutdownCoordinator};

pub use pool::{ConnHandle, Pool, PoolError, PoolSettings, PoolStats, PooledConnection};
pub use registry::{Binding, Classification, PoolRegistry, ResolveError};

// -----------------------------------------------------------------------------
// ----- Gateway ---------------------------------------------------------------

pub struct Gateway {
    pub config: Arc<Config>,
    pub pools: PoolRegistry,
    pub sessions: Arc<SessionRegistry>,
    pub shutdown: ShutdownCoordinator,
    pub tls: Option<TlsAcceptor>,
    next_session_id: AtomicU64,
}

impl Gateway {
    pub fn new(
        config: Arc<Config>,
        connector: Arc<dyn Connector>,
        tls: Option<TlsAcceptor>,
    ) -> Arc<Self> {
        let sessions = Arc::new(SessionRegistry::new());
        let shutdown = ShutdownCoordinator::new(config.general.shutdown_timeout, sessions.clone());
        let pools = PoolRegistry::new(config.clone(), connector);

        Arc::new(Self {
            config,
            pools,
            sessions,
            shutdown,
            tls,
            next_session_id: AtomicU64::new(1),
        })
    }

    pub fn next_session_id(&self) -> SessionId {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("listen_addr", &self.config.listen_addr)
            .field("pools", &self.pools.len())
            .field("sessions", &self.sessions.len())
            .field("phase", &self.shutdown.phase())
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
