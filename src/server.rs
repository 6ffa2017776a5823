use std::{io, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpSocket},
    select,
    task::JoinSet,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::frontend::FrontendConnection;
use crate::gateway::Gateway;
use crate::shutdown::ShutdownPhase;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const LISTEN_BACKLOG: u32 = 1024;

/// How long connection tasks get to write their final error after
/// Terminating before they are aborted.
const TASK_EXIT_GRACE: Duration = Duration::from_secs(1);

const MIN_REAP_INTERVAL: Duration = Duration::from_millis(100);
const MAX_REAP_INTERVAL: Duration = Duration::from_secs(30);

// -----------------------------------------------------------------------------
// ----- Server ----------------------------------------------------------------

/// Accepts clients until shutdown reaches Terminating.
#[derive(Debug)]
pub struct Server {
    gateway: Arc<Gateway>,
    listener: TcpListener,
}

// -----------------------------------------------------------------------------
// ----- Server: Static --------------------------------------------------------

impl Server {
    pub fn bind(gateway: Arc<Gateway>) -> io::Result<Self> {
        let addr = gateway.config.listen_addr;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;

        Ok(Self { gateway, listener })
    }
}

// -----------------------------------------------------------------------------
// ----- Server: Public --------------------------------------------------------

impl Server {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Serve until the shutdown coordinator reaches Terminating and every
    /// pool has been torn down.
    pub async fn run(self) -> io::Result<()> {
        let Server { gateway, listener } = self;

        gateway.pools.warm_all();
        let reaper = tokio::spawn(reap_idle_servers(gateway.clone()));

        let mut connections = JoinSet::new();
        let coordinator = gateway.shutdown.run(&gateway.pools);
        tokio::pin!(coordinator);

        loop {
            select! {
                _ = &mut coordinator => break,

                accept_res = listener.accept() => {
                    let (stream, peer) = match accept_res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let _ = stream.set_nodelay(true);
                    let conn = FrontendConnection::new(stream, peer, gateway.clone());
                    connections.spawn(async move {
                        if let Err(e) = conn.serve().await {
                            debug!("client {peer} error: {e}");
                        }
                    });
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("connection task panicked: {e}");
                        }
                    }
                }
            }
        }

        drop(listener);
        reaper.abort();

        let remaining = connections.len();
        if remaining > 0 {
            let drained = time::timeout(TASK_EXIT_GRACE, async {
                while connections.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(tasks = connections.len(), "aborting lingering connection tasks");
                connections.abort_all();
            }
        }

        info!("listener stopped");
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Internal --------------------------------------------------------------

async fn reap_idle_servers(gateway: Arc<Gateway>) {
    let period = (gateway.config.general.idle_timeout / 2).clamp(MIN_REAP_INTERVAL, MAX_REAP_INTERVAL);
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut phase = gateway.shutdown.subscribe();

    loop {
        select! {
            _ = ticker.tick() => {
                let reaped = gateway.pools.reap_idle().await;
                if reaped > 0 {
                    debug!(reaped, "closed idle server connections");
                }
            }
            // The watch::Ref must not outlive the branch future.
            _ = async { phase.wait_for(|p| *p == ShutdownPhase::Terminating).await.map(|_| ()) } => return,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
